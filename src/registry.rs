//! Registration-time tables keyed by property kind id.
//!
//! The [`KindRegistry`] is the schema: one [`PropertyKindInfo`] per kind with
//! its fallback and cycle resolution, registered once. The
//! [`ComputationRegistry`] holds what the current phase computes; it is
//! replaced whenever a new phase is set up.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::eoption::{EPK, Entity, FinalEP, InterimEP};
use crate::error::{Result, StoreError};
use crate::property::{CycleResolution, FallbackReason, PropertyKind, PropertyMeta, SomeProperty};
use crate::result::PropertyComputation;

pub type Fallback<E> = Arc<dyn Fn(FallbackReason, &E) -> SomeProperty + Send + Sync>;

// ------------- PropertyKindInfo -------------
pub struct PropertyKindInfo<E> {
    kind: PropertyKind,
    fallback: Fallback<E>,
    cycle_resolution: CycleResolution,
}

impl<E: Entity> PropertyKindInfo<E> {
    pub fn new<P: PropertyMeta>(fallback: impl Fn(FallbackReason, &E) -> P + Send + Sync + 'static) -> Self {
        Self {
            kind: P::KIND,
            fallback: Arc::new(move |reason, e| Arc::new(fallback(reason, e)) as SomeProperty),
            cycle_resolution: CycleResolution::default(),
        }
    }
    /// The same fallback value for every entity.
    pub fn with_fallback_value<P: PropertyMeta + Clone>(p: P) -> Self {
        Self::new(move |_, _| p.clone())
    }
    pub fn cycle_resolution(mut self, cycle_resolution: CycleResolution) -> Self {
        self.cycle_resolution = cycle_resolution;
        self
    }
    pub fn kind(&self) -> PropertyKind {
        self.kind
    }
    pub fn fallback(&self, reason: FallbackReason, e: &E) -> FinalEP<E> {
        FinalEP::from_parts(EPK::new(e.clone(), self.kind), (self.fallback)(reason, e))
    }
    pub fn resolve(&self, ep: &InterimEP<E>) -> FinalEP<E> {
        FinalEP::from_parts(ep.epk().clone(), self.cycle_resolution.resolve(ep.lb(), ep.ub()))
    }
}

impl<E> fmt::Debug for PropertyKindInfo<E> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("PropertyKindInfo")
            .field("kind", &self.kind)
            .field("cycle_resolution", &self.cycle_resolution)
            .finish()
    }
}

// ------------- KindRegistry -------------
pub struct KindRegistry<E> {
    kinds: RwLock<Vec<Option<Arc<PropertyKindInfo<E>>>>>,
}

impl<E: Entity> KindRegistry<E> {
    pub fn new() -> Self {
        Self {
            kinds: RwLock::new(Vec::new()),
        }
    }
    pub fn register(&self, info: PropertyKindInfo<E>) -> Result<()> {
        let id = info.kind().id() as usize;
        let mut kinds = self.kinds.write();
        if kinds.len() <= id {
            kinds.resize_with(id + 1, || None);
        }
        if let Some(existing) = &kinds[id] {
            return Err(StoreError::DuplicatePropertyKind {
                id: id as u32,
                existing: existing.kind().name().to_owned(),
            });
        }
        kinds[id] = Some(Arc::new(info));
        Ok(())
    }
    pub fn get(&self, kind: PropertyKind) -> Result<Arc<PropertyKindInfo<E>>> {
        self.kinds
            .read()
            .get(kind.id() as usize)
            .and_then(|info| info.clone())
            .ok_or_else(|| StoreError::UnknownPropertyKind(kind.name().to_owned()))
    }
    pub fn kinds(&self) -> Vec<PropertyKind> {
        self.kinds.read().iter().flatten().map(|info| info.kind()).collect()
    }
    pub fn len(&self) -> usize {
        self.kinds.read().iter().flatten().count()
    }
}

impl<E: Entity> Default for KindRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

// ------------- ComputationRegistry -------------
/// Which kinds the current phase computes, and how.
pub struct ComputationRegistry<E> {
    // None means every registered kind is computed
    computed: Option<HashSet<PropertyKind>>,
    delayed: HashSet<PropertyKind>,
    lazy: Vec<Option<PropertyComputation<E>>>,
    triggered: Vec<Vec<PropertyComputation<E>>>,
    // kinds with a lazy computation
    analysed: HashSet<PropertyKind>,
}

impl<E: Entity> ComputationRegistry<E> {
    pub fn new() -> Self {
        Self {
            computed: None,
            delayed: HashSet::new(),
            lazy: Vec::new(),
            triggered: Vec::new(),
            analysed: HashSet::new(),
        }
    }
    pub fn for_phase(computed: &[PropertyKind], delayed: &[PropertyKind]) -> Self {
        Self {
            computed: Some(computed.iter().copied().collect()),
            delayed: delayed.iter().copied().collect(),
            ..Self::new()
        }
    }
    pub fn is_computed(&self, kind: PropertyKind) -> bool {
        self.computed.as_ref().is_none_or(|computed| computed.contains(&kind))
    }
    pub fn is_delayed(&self, kind: PropertyKind) -> bool {
        self.delayed.contains(&kind)
    }
    /// Why a value of `kind` that nobody derived falls back.
    pub fn fallback_reason(&self, kind: PropertyKind) -> FallbackReason {
        let declared = self.computed.as_ref().is_some_and(|computed| computed.contains(&kind));
        if declared || self.analysed.contains(&kind) {
            FallbackReason::PropertyIsNotDerivedByPreviouslyExecutedAnalysis
        } else {
            FallbackReason::PropertyIsNotComputedByAnyAnalysis
        }
    }
    pub fn register_lazy(&mut self, kind: PropertyKind, pc: PropertyComputation<E>) -> Result<()> {
        let id = kind.id() as usize;
        if self.lazy.len() <= id {
            self.lazy.resize_with(id + 1, || None);
        }
        if self.lazy[id].is_some() {
            return Err(StoreError::LazyComputationAlreadyRegistered {
                kind: kind.name().to_owned(),
            });
        }
        self.lazy[id] = Some(pc);
        self.analysed.insert(kind);
        Ok(())
    }
    pub fn lazy(&self, kind: PropertyKind) -> Option<PropertyComputation<E>> {
        self.lazy.get(kind.id() as usize).and_then(|pc| pc.clone())
    }
    pub fn register_triggered(&mut self, kind: PropertyKind, pc: PropertyComputation<E>) {
        let id = kind.id() as usize;
        if self.triggered.len() <= id {
            self.triggered.resize_with(id + 1, Vec::new);
        }
        self.triggered[id].push(pc);
    }
    pub fn triggered(&self, kind: PropertyKind) -> &[PropertyComputation<E>] {
        self.triggered
            .get(kind.id() as usize)
            .map(|pcs| pcs.as_slice())
            .unwrap_or(&[])
    }
    pub fn has_triggered(&self, kind: PropertyKind) -> bool {
        !self.triggered(kind).is_empty()
    }
}

impl<E: Entity> Default for ComputationRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}
