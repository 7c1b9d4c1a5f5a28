//! Keeps every [`EPKState`] and hands out their stable integer ids.
//!
//! Depender and dependee links are stored as ids, never as references, so
//! cyclic dependencies are just cyclic id sets. States are never removed while
//! the store lives; collaborators are dropped once their continuation fired.

use core::hash::BuildHasherDefault;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::RwLock;
use seahash::SeaHasher;

use crate::eoption::{EPK, Entity};
use crate::error::{Result, StoreError};
use crate::state::{COLLABORATOR_BIT, Collaborator, CollaboratorId, EPKState, StateId, Suspension};

pub type EntityHasher = BuildHasherDefault<SeaHasher>;

pub struct StateArena<E> {
    index: DashMap<EPK<E>, StateId, EntityHasher>,
    states: RwLock<Vec<Arc<EPKState<E>>>>,
    collaborators: DashMap<CollaboratorId, Arc<Collaborator<E>>, EntityHasher>,
    next_collaborator: AtomicU32,
}

impl<E: Entity> StateArena<E> {
    pub fn new() -> Self {
        Self {
            index: DashMap::with_hasher(EntityHasher::default()),
            states: RwLock::new(Vec::new()),
            collaborators: DashMap::with_hasher(EntityHasher::default()),
            next_collaborator: AtomicU32::new(0),
        }
    }

    pub fn get(&self, epk: &EPK<E>) -> Option<Arc<EPKState<E>>> {
        // copy the id out before touching the states, the shard guard must not
        // be held while waiting on another lock
        let id = self.index.get(epk).map(|id| *id)?;
        Some(self.state(id))
    }

    /// Returns the state of `epk`, creating it when absent. The flag is true
    /// for the one caller that created it.
    pub fn get_or_create(&self, epk: &EPK<E>) -> Result<(Arc<EPKState<E>>, bool)> {
        if let Some(state) = self.get(epk) {
            return Ok((state, false));
        }
        match self.index.entry(epk.clone()) {
            Entry::Occupied(e) => {
                let id = *e.get();
                drop(e);
                Ok((self.state(id), false))
            }
            Entry::Vacant(e) => {
                let mut states = self.states.write();
                let id = state_id(states.len())?;
                let state = Arc::new(EPKState::new(id, epk.clone()));
                states.push(Arc::clone(&state));
                e.insert(id);
                Ok((state, true))
            }
        }
    }

    pub fn state(&self, id: StateId) -> Arc<EPKState<E>> {
        Arc::clone(&self.states.read()[id as usize])
    }

    /// Snapshot of all states in id order.
    pub fn all(&self) -> Vec<Arc<EPKState<E>>> {
        self.states.read().clone()
    }

    pub fn len(&self) -> usize {
        self.states.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn add_collaborator(&self, suspension: Suspension<E>) -> Result<Arc<Collaborator<E>>> {
        let id = self.next_collaborator.fetch_add(1, Ordering::Relaxed);
        if id & COLLABORATOR_BIT != 0 {
            return Err(StoreError::Invariant(format!("collaborator id {} out of range", id)));
        }
        let collaborator = Arc::new(Collaborator::new(id, suspension));
        self.collaborators.insert(id, Arc::clone(&collaborator));
        Ok(collaborator)
    }

    pub fn collaborator(&self, id: CollaboratorId) -> Option<Arc<Collaborator<E>>> {
        self.collaborators.get(&id).map(|c| Arc::clone(c.value()))
    }

    pub fn remove_collaborator(&self, id: CollaboratorId) {
        self.collaborators.remove(&id);
    }

    pub fn collaborators(&self) -> Vec<Arc<Collaborator<E>>> {
        self.collaborators.iter().map(|c| Arc::clone(c.value())).collect()
    }
}

/// The id of the state at `index`; ids with the collaborator bit set are
/// never handed out.
pub fn state_id(index: usize) -> Result<StateId> {
    StateId::try_from(index)
        .ok()
        .filter(|id| id & COLLABORATOR_BIT == 0)
        .ok_or_else(|| StoreError::Invariant(format!("more than {} states", COLLABORATOR_BIT)))
}

impl<E: Entity> Default for StateArena<E> {
    fn default() -> Self {
        Self::new()
    }
}
