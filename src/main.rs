//! Runs a small purity analysis over a hard coded call graph.
//!
//! `fpcf` (or `fpcf.toml`) next to the binary and `FPCF_*` variables
//! configure the store; `RUST_LOG=debug` shows what the store does.

use std::collections::BTreeSet;

use fpcf::{
    CycleResolution, EOptionP, EPK, InterimEP, PropertyComputationResult, PropertyKind, PropertyKindInfo,
    PropertyMeta, PropertyStore, StoreConfig,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
enum Element {
    Project,
    Method(usize),
}

struct Method {
    name: &'static str,
    calls: &'static [usize],
    writes_global: bool,
    allocates: &'static [&'static str],
}

// ------------- Program -------------
// helper_a and helper_b call each other
const PROGRAM: &[Method] = &[
    Method { name: "main", calls: &[1, 2], writes_global: false, allocates: &["Config"] },
    Method { name: "parse", calls: &[3], writes_global: false, allocates: &["Token", "Ast"] },
    Method { name: "report", calls: &[5], writes_global: false, allocates: &["String"] },
    Method { name: "helper_a", calls: &[4], writes_global: false, allocates: &[] },
    Method { name: "helper_b", calls: &[3], writes_global: false, allocates: &["Token"] },
    Method { name: "log", calls: &[], writes_global: true, allocates: &["String"] },
    Method { name: "unused", calls: &[], writes_global: false, allocates: &[] },
];

// ------------- Properties -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Purity {
    Pure,
    Impure,
}

impl PropertyMeta for Purity {
    const KIND: PropertyKind = PropertyKind::new(0, "Purity");
    fn is_valid_successor_of(&self, previous: &Self) -> Result<(), String> {
        if self <= previous {
            Ok(())
        } else {
            Err(format!("{:?} cannot follow {:?}", self, previous))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
struct Callers(BTreeSet<usize>);

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
struct InstantiatedTypes(BTreeSet<&'static str>);

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

// ------------- Analyses -------------
fn purity(store: &PropertyStore<Element>, e: &Element) -> PropertyComputationResult<Element> {
    let Element::Method(m) = *e else {
        return PropertyComputationResult::NoResult;
    };
    if PROGRAM[m].writes_global {
        return PropertyComputationResult::final_value(*e, Purity::Impure);
    }
    let mut dependees = Vec::new();
    for &callee in PROGRAM[m].calls {
        let eop = match store.apply::<Purity>(&Element::Method(callee)) {
            Ok(eop) => eop,
            Err(_) => return PropertyComputationResult::NoResult,
        };
        match eop.final_of::<Purity>() {
            Some(Purity::Impure) => return PropertyComputationResult::final_value(*e, Purity::Impure),
            Some(Purity::Pure) => {}
            None => {
                // an interim callee may still turn out impure
                if eop.ub_of::<Purity>() == Some(&Purity::Impure) {
                    return PropertyComputationResult::final_value(*e, Purity::Impure);
                }
                dependees.push(eop);
            }
        }
    }
    if dependees.is_empty() {
        return PropertyComputationResult::final_value(*e, Purity::Pure);
    }
    let e = *e;
    PropertyComputationResult::interim(
        InterimEP::new(e, Purity::Impure, Purity::Pure),
        dependees,
        move |store, _| purity(store, &e),
    )
}

fn record_calls(_: &PropertyStore<Element>, e: &Element) -> PropertyComputationResult<Element> {
    let Element::Method(m) = *e else {
        return PropertyComputationResult::NoResult;
    };
    let mut results: Vec<PropertyComputationResult<Element>> = PROGRAM[m]
        .calls
        .iter()
        .map(|&callee| {
            PropertyComputationResult::partial::<Callers>(Element::Method(callee), move |current: &EOptionP<Element>| {
                let mut callers = current.lb_of::<Callers>().cloned().unwrap_or_default();
                callers.0.insert(m).then(|| InterimEP::of_value(Element::Method(callee), callers))
            })
        })
        .collect();
    if !PROGRAM[m].allocates.is_empty() {
        results.push(PropertyComputationResult::partial::<InstantiatedTypes>(
            Element::Project,
            move |current: &EOptionP<Element>| {
                let mut types = current.lb_of::<InstantiatedTypes>().cloned().unwrap_or_default();
                let before = types.0.len();
                types.0.extend(PROGRAM[m].allocates.iter().copied());
                (types.0.len() > before).then(|| InterimEP::of_value(Element::Project, types))
            },
        ));
    }
    PropertyComputationResult::Results(results)
}

fn main() -> fpcf::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let config = StoreConfig::load(Some("fpcf"))?;
    let store: PropertyStore<Element> = PropertyStore::new(config);

    // a cycle without side effects is pure
    store.register_kind(
        PropertyKindInfo::with_fallback_value(Purity::Impure).cycle_resolution(CycleResolution::UpperBound),
    )?;
    store.register_kind(PropertyKindInfo::with_fallback_value(Callers::default()))?;
    store.register_kind(PropertyKindInfo::with_fallback_value(InstantiatedTypes::default()))?;

    store.register_lazy_property_computation(Purity::KIND, purity)?;
    // every method that is called gets analysed
    store.register_triggered_computation(Callers::KIND, |store, e| {
        if let Err(error) = store.force(&EPK::of::<Purity>(*e)) {
            tracing::warn!(%error, "Could not force purity");
        }
        PropertyComputationResult::NoResult
    })?;
    let methods = (0..PROGRAM.len()).map(Element::Method);
    store.schedule_eager_computations_for_entities(methods, record_calls)?;
    store.force(&EPK::of::<Purity>(Element::Method(0)))?;
    store.wait_on_phase_completion()?;

    for (m, method) in PROGRAM.iter().enumerate() {
        let e = Element::Method(m);
        let purity = store.apply::<Purity>(&e)?;
        let callers = store.apply::<Callers>(&e)?;
        info!(
            method = method.name,
            purity = ?purity.final_of::<Purity>(),
            callers = ?callers.final_of::<Callers>().map(|c| &c.0),
            "Analysed"
        );
    }
    let types = store.apply::<InstantiatedTypes>(&Element::Project)?;
    info!(types = ?types.final_of::<InstantiatedTypes>().map(|t| &t.0), "Instantiated");
    info!(pure = ?store.entities_with(&Purity::Pure), "Pure methods");
    let stats = serde_json::to_string(&store.statistics()).unwrap_or_default();
    info!(%stats, "Statistics");
    store.shutdown();
    Ok(())
}
