#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use fpcf::{
    CycleResolution, EOptionP, FallbackReason, InterimEP, PropertyComputationResult, PropertyKind,
    PropertyKindInfo, PropertyMeta, PropertyStore, StoreConfig,
};

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Element {
    Project,
    Method(u32),
    Class(u32),
}

pub type Pcr = PropertyComputationResult<Element>;

// ------------- Purity -------------
/// Refinement moves towards `Pure`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Purity {
    Pure,
    SideEffectFree,
    Impure,
}

impl PropertyMeta for Purity {
    const KIND: PropertyKind = PropertyKind::new(0, "Purity");
    fn is_valid_successor_of(&self, previous: &Self) -> Result<(), String> {
        if self <= previous {
            Ok(())
        } else {
            Err(format!("{:?} is less precise than {:?}", self, previous))
        }
    }
}

// ------------- Sets -------------
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Callers(pub BTreeSet<u32>);

impl PropertyMeta for Callers {
    const KIND: PropertyKind = PropertyKind::new(1, "Callers");
    fn is_valid_successor_of(&self, previous: &Self) -> Result<(), String> {
        if previous.0.is_subset(&self.0) {
            Ok(())
        } else {
            Err("callers were removed".to_owned())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct InstantiatedTypes(pub BTreeSet<u32>);

impl PropertyMeta for InstantiatedTypes {
    const KIND: PropertyKind = PropertyKind::new(2, "InstantiatedTypes");
    fn is_valid_successor_of(&self, previous: &Self) -> Result<(), String> {
        if previous.0.is_subset(&self.0) {
            Ok(())
        } else {
            Err("types were removed".to_owned())
        }
    }
}

/// A plain value without a lattice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Answer(pub u32);

impl PropertyMeta for Answer {
    const KIND: PropertyKind = PropertyKind::new(3, "Answer");
}

// ------------- Setup -------------
pub fn config(threads: usize) -> StoreConfig {
    StoreConfig::default().threads(threads).debug(true)
}

pub fn setup(threads: usize) -> PropertyStore<Element> {
    let store = PropertyStore::new(config(threads));
    register_kinds(&store, CycleResolution::default());
    store
}

/// Fallbacks tell the two fallback reasons apart: `Impure` and `Answer(0)`
/// when nothing derived a value, `SideEffectFree` and `Answer(1)` when
/// nothing computes the kind at all.
pub fn register_kinds(store: &PropertyStore<Element>, purity_resolution: CycleResolution) {
    store
        .register_kind(
            PropertyKindInfo::new(|reason, _: &Element| match reason {
                FallbackReason::PropertyIsNotComputedByAnyAnalysis => Purity::SideEffectFree,
                FallbackReason::PropertyIsNotDerivedByPreviouslyExecutedAnalysis => Purity::Impure,
            })
            .cycle_resolution(purity_resolution),
        )
        .expect("register Purity");
    store
        .register_kind(PropertyKindInfo::with_fallback_value(Callers::default()))
        .expect("register Callers");
    store
        .register_kind(PropertyKindInfo::with_fallback_value(InstantiatedTypes::default()))
        .expect("register InstantiatedTypes");
    store
        .register_kind(PropertyKindInfo::new(|reason, _: &Element| match reason {
            FallbackReason::PropertyIsNotComputedByAnyAnalysis => Answer(1),
            FallbackReason::PropertyIsNotDerivedByPreviouslyExecutedAnalysis => Answer(0),
        }))
        .expect("register Answer");
}

pub fn final_purity(store: &PropertyStore<Element>, m: u32) -> Option<Purity> {
    store
        .apply::<Purity>(&Element::Method(m))
        .expect("query purity")
        .final_of::<Purity>()
        .copied()
}

/// Partial update adding `t` to the instantiated types of the project.
pub fn add_type(t: u32) -> impl FnOnce(&EOptionP<Element>) -> Option<InterimEP<Element>> + Send + 'static {
    move |current: &EOptionP<Element>| {
        let mut types = current.lb_of::<InstantiatedTypes>().cloned().unwrap_or_default();
        types.0.insert(t).then(|| InterimEP::of_value(Element::Project, types))
    }
}

/// Partial update adding `caller` to the callers of `callee`.
pub fn add_caller(callee: u32, caller: u32) -> impl FnOnce(&EOptionP<Element>) -> Option<InterimEP<Element>> + Send + 'static {
    move |current: &EOptionP<Element>| {
        let mut callers = current.lb_of::<Callers>().cloned().unwrap_or_default();
        callers.0.insert(caller).then(|| InterimEP::of_value(Element::Method(callee), callers))
    }
}

// ------------- Call graph purity -------------
/// Methods with their callees and their own effect. A method is as impure
/// as its worst callee; unknown callees make it wait.
#[derive(Debug, Clone, Default)]
pub struct CallGraph {
    methods: HashMap<u32, (Vec<u32>, Purity)>,
}

impl CallGraph {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn method(mut self, m: u32, calls: &[u32], own: Purity) -> Self {
        self.methods.insert(m, (calls.to_vec(), own));
        self
    }
    pub fn analysis(self) -> impl Fn(&PropertyStore<Element>, &Element) -> Pcr + Send + Sync + 'static {
        let graph = Arc::new(self);
        move |store: &PropertyStore<Element>, e: &Element| analyse(&graph, store, e)
    }
}

fn analyse(graph: &Arc<CallGraph>, store: &PropertyStore<Element>, e: &Element) -> Pcr {
    let Element::Method(m) = *e else {
        return Pcr::NoResult;
    };
    let Some((calls, own)) = graph.methods.get(&m) else {
        return Pcr::NoResult;
    };
    let mut worst = *own;
    let mut dependees = Vec::new();
    for &callee in calls {
        let eop = store.apply::<Purity>(&Element::Method(callee)).expect("query callee");
        match eop.final_of::<Purity>() {
            Some(p) => worst = worst.max(*p),
            None => dependees.push(eop),
        }
    }
    if worst == Purity::Impure || dependees.is_empty() {
        return Pcr::final_value(*e, worst);
    }
    let (graph, e) = (Arc::clone(graph), *e);
    Pcr::interim(
        InterimEP::new(e, Purity::Impure, worst),
        dependees,
        move |store: &PropertyStore<Element>, _: EOptionP<Element>| analyse(&graph, store, &e),
    )
}
