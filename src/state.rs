//! EPKState cells.
//!
//! Each EPK the store has ever seen owns one [`EPKState`]: its current
//! [`EOptionP`], the suspended computation that will refine it (if any), and
//! the set of dependers to notify when it changes. Every mutation happens
//! under the cell's own small lock and no code path ever holds two cell locks
//! at once, so unrelated cells never contend and the store cannot deadlock.
//!
//! The at-most-once guarantees come from taking things out of a cell:
//! a suspension is taken by exactly one notifier, a depender set is drained by
//! exactly one update, and the trigger flag is flipped by exactly one CAS.

use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam::utils::Backoff;
use parking_lot::Mutex;
use roaring::RoaringBitmap;

use crate::eoption::{EOptionP, EPK, Entity};
use crate::error::{Result, StoreError};
use crate::property::same_value;
use crate::result::OnUpdateContinuation;

pub type StateId = u32;
pub type CollaboratorId = u32;

// ------------- Depender -------------
// collaborator ids carry the high bit so both fit one bitmap
pub const COLLABORATOR_BIT: u32 = 1 << 31;

/// Who is waiting: the computation of an EPK, or a collaborative
/// continuation that refines no EPK of its own.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Depender {
    State(StateId),
    Collaborator(CollaboratorId),
}

impl Depender {
    pub fn encode(self) -> u32 {
        match self {
            Self::State(id) => id,
            Self::Collaborator(id) => id | COLLABORATOR_BIT,
        }
    }
    pub fn decode(encoded: u32) -> Self {
        if encoded & COLLABORATOR_BIT == 0 {
            Self::State(encoded)
        } else {
            Self::Collaborator(encoded & !COLLABORATOR_BIT)
        }
    }
}

// ------------- Suspension -------------
/// A continuation together with the dependee values it was computed from.
pub struct Suspension<E> {
    epoch: u64,
    continuation: OnUpdateContinuation<E>,
    dependees: Vec<(StateId, EOptionP<E>)>,
}

impl<E: Entity> Suspension<E> {
    pub fn new(
        epoch: u64,
        continuation: OnUpdateContinuation<E>,
        dependees: Vec<(StateId, EOptionP<E>)>,
    ) -> Self {
        Self {
            epoch,
            continuation,
            dependees,
        }
    }
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
    pub fn dependees(&self) -> &[(StateId, EOptionP<E>)] {
        &self.dependees
    }
    pub fn waits_on(&self, dependee: StateId) -> bool {
        self.dependees.iter().any(|(id, _)| *id == dependee)
    }
    pub fn into_continuation(self) -> OnUpdateContinuation<E> {
        self.continuation
    }
}

// ------------- Update -------------
/// What an update did to a cell.
pub struct Update<E> {
    pub old: EOptionP<E>,
    pub new: EOptionP<E>,
    pub changed: bool,
    /// Dependers drained from the cell; each must be notified once.
    pub dependers: RoaringBitmap,
    /// The cell's own suspension, dropped because the value became final.
    pub dropped: Option<Suspension<E>>,
}

impl<E: Entity> fmt::Debug for Update<E> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Update")
            .field("old", &self.old)
            .field("new", &self.new)
            .field("changed", &self.changed)
            .field("dependers", &self.dependers)
            .field("dropped", &self.dropped.is_some())
            .finish()
    }
}

impl<E: Entity> Update<E> {
    fn unchanged(current: EOptionP<E>) -> Self {
        Self {
            old: current.clone(),
            new: current,
            changed: false,
            dependers: RoaringBitmap::new(),
            dropped: None,
        }
    }
}

// ------------- EPKState -------------
struct Inner<E> {
    eop: EOptionP<E>,
    suspension: Option<Suspension<E>>,
    dependers: RoaringBitmap,
}

pub struct EPKState<E> {
    id: StateId,
    epk: EPK<E>,
    inner: Mutex<Inner<E>>,
    triggered: AtomicBool,
}

impl<E: Entity> EPKState<E> {
    pub fn new(id: StateId, epk: EPK<E>) -> Self {
        Self {
            id,
            inner: Mutex::new(Inner {
                eop: EOptionP::Epk(epk.clone()),
                suspension: None,
                dependers: RoaringBitmap::new(),
            }),
            epk,
            triggered: AtomicBool::new(false),
        }
    }
    pub fn id(&self) -> StateId {
        self.id
    }
    pub fn epk(&self) -> &EPK<E> {
        &self.epk
    }
    /// Snapshot of the current value; never a half-applied update.
    pub fn eop(&self) -> EOptionP<E> {
        self.inner.lock().eop.clone()
    }
    pub fn is_final(&self) -> bool {
        self.inner.lock().eop.is_final()
    }
    pub fn has_suspension(&self) -> bool {
        self.inner.lock().suspension.is_some()
    }
    /// Dependee ids of the pending suspension, if there is one.
    pub fn suspended_on(&self) -> Option<Vec<StateId>> {
        self.inner
            .lock()
            .suspension
            .as_ref()
            .map(|s| s.dependees().iter().map(|(id, _)| *id).collect())
    }
    pub fn dependers(&self) -> RoaringBitmap {
        self.inner.lock().dependers.clone()
    }
    pub fn has_dependers(&self) -> bool {
        !self.inner.lock().dependers.is_empty()
    }

    /// Installs a more precise value.
    ///
    /// Faults when the cell is already final and, with `validate`, when the
    /// new bounds do not refine the old ones. Equal values change nothing.
    pub fn update(&self, new: EOptionP<E>, validate: bool) -> Result<Update<E>> {
        let mut inner = self.inner.lock();
        Self::install(&mut inner, &self.epk, new, validate)
    }

    /// Applies a partial update function to the current value.
    pub fn update_with(
        &self,
        f: impl FnOnce(&EOptionP<E>) -> Option<EOptionP<E>>,
        validate: bool,
    ) -> Result<Update<E>> {
        let mut inner = self.inner.lock();
        if inner.eop.is_final() {
            return Err(StoreError::FinalValueOverwritten {
                epk: self.epk.to_string(),
            });
        }
        match f(&inner.eop) {
            Some(new) => Self::install(&mut inner, &self.epk, new, validate),
            None => Ok(Update::unchanged(inner.eop.clone())),
        }
    }

    /// Installs `new` only if the cell still holds `expected`; `None` when it
    /// moved on in the meantime.
    pub fn update_if_unchanged(&self, expected: &EOptionP<E>, new: EOptionP<E>) -> Result<Option<Update<E>>> {
        let mut inner = self.inner.lock();
        if !inner.eop.same_state_as(expected) {
            return Ok(None);
        }
        Self::install(&mut inner, &self.epk, new, false).map(Some)
    }

    fn install(inner: &mut Inner<E>, epk: &EPK<E>, new: EOptionP<E>, validate: bool) -> Result<Update<E>> {
        if inner.eop.is_final() {
            return Err(StoreError::FinalValueOverwritten { epk: epk.to_string() });
        }
        if new.epk() != epk || new.is_epk() {
            return Err(StoreError::Invariant(format!("{} cannot be stored in {}", new, epk)));
        }
        if validate {
            check_refinement(&inner.eop, &new)?;
        }
        if !new.is_final() && inner.eop.same_values_as(&new) {
            return Ok(Update::unchanged(inner.eop.clone()));
        }
        let old = mem::replace(&mut inner.eop, new.clone());
        let dependers = mem::take(&mut inner.dependers);
        let dropped = if new.is_final() { inner.suspension.take() } else { None };
        Ok(Update {
            old,
            new,
            changed: true,
            dependers,
            dropped,
        })
    }

    pub fn set_suspension(&self, suspension: Suspension<E>) {
        self.inner.lock().suspension = Some(suspension);
    }

    /// Takes the pending continuation and its dependees if `pred` accepts
    /// them. Concurrent callers race for it; at most one wins.
    pub fn clear_suspension_if(&self, pred: impl FnOnce(&Suspension<E>) -> bool) -> Option<Suspension<E>> {
        let mut inner = self.inner.lock();
        match &inner.suspension {
            Some(s) if pred(s) => inner.suspension.take(),
            _ => None,
        }
    }

    /// Registers `depender` unless the cell moved on since `observed` was
    /// read; `Ok(false)` tells the caller to resume the depender right away.
    pub fn add_depender(&self, depender: Depender, observed: &EOptionP<E>) -> Result<bool> {
        let mut inner = self.inner.lock();
        if !inner.eop.same_state_as(observed) {
            return Ok(false);
        }
        if inner.eop.is_final() {
            return Err(StoreError::DependerOnFinal {
                epk: self.epk.to_string(),
                depender: format!("{:?}", depender),
            });
        }
        inner.dependers.insert(depender.encode());
        Ok(true)
    }

    pub fn remove_depender(&self, depender: Depender) {
        self.inner.lock().dependers.remove(depender.encode());
    }

    /// Drains the depender set.
    pub fn take_dependers(&self) -> RoaringBitmap {
        mem::take(&mut self.inner.lock().dependers)
    }

    /// True for exactly one caller: the first to see this cell with a value.
    pub fn mark_triggered(&self) -> bool {
        let backoff = Backoff::new();
        loop {
            if self.triggered.load(Ordering::Acquire) {
                return false;
            }
            match self
                .triggered
                .compare_exchange_weak(false, true, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return true,
                Err(true) => return false,
                Err(false) => backoff.spin(),
            }
        }
    }
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }
}

// a value whose bounds coincide only moves forward; otherwise lower bounds
// only ever get better and upper bounds only ever get worse
fn check_refinement<E: Entity>(old: &EOptionP<E>, new: &EOptionP<E>) -> Result<()> {
    let (Some(old_lb), Some(old_ub), Some(new_lb), Some(new_ub)) = (old.lb(), old.ub(), new.lb(), new.ub())
    else {
        return Ok(());
    };
    let checked = if same_value(old_lb, old_ub) {
        new_lb
            .dyn_is_valid_successor_of(old_lb.as_ref())
            .and_then(|_| new_ub.dyn_is_valid_successor_of(old_ub.as_ref()))
    } else {
        new_lb
            .dyn_is_valid_successor_of(old_lb.as_ref())
            .and_then(|_| old_ub.dyn_is_valid_successor_of(new_ub.as_ref()))
    };
    checked.map_err(|message| StoreError::NonMonotonicUpdate {
        epk: new.epk().to_string(),
        message,
    })
}

// ------------- Collaborator -------------
/// A continuation from an interim partial result; it refines no EPK itself.
pub struct Collaborator<E> {
    id: CollaboratorId,
    suspension: Mutex<Option<Suspension<E>>>,
}

impl<E: Entity> Collaborator<E> {
    pub fn new(id: CollaboratorId, suspension: Suspension<E>) -> Self {
        Self {
            id,
            suspension: Mutex::new(Some(suspension)),
        }
    }
    pub fn id(&self) -> CollaboratorId {
        self.id
    }
    pub fn suspended_on(&self) -> Option<Vec<StateId>> {
        self.suspension
            .lock()
            .as_ref()
            .map(|s| s.dependees().iter().map(|(id, _)| *id).collect())
    }
    pub fn clear_suspension_if(&self, pred: impl FnOnce(&Suspension<E>) -> bool) -> Option<Suspension<E>> {
        let mut suspension = self.suspension.lock();
        match &*suspension {
            Some(s) if pred(s) => suspension.take(),
            _ => None,
        }
    }
}
