use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::DashMap;

use fpcf::{EPK, FinalEP, PropertyMeta, PropertyStore};

mod common;
use common::{Answer, Callers, Element, Pcr, add_caller, setup};

fn counting(counts: &Arc<DashMap<Element, usize>>) -> impl Fn(&PropertyStore<Element>, &Element) -> Pcr + Send + Sync + 'static {
    let counts = Arc::clone(counts);
    move |_: &PropertyStore<Element>, e: &Element| {
        *counts.entry(*e).or_insert(0) += 1;
        Pcr::NoResult
    }
}

// caller m calls callee 100 + m % 3
fn schedule_calls(store: &PropertyStore<Element>) {
    store
        .schedule_eager_computations_for_entities((1..=30).map(Element::Method), |_, e| {
            let Element::Method(caller) = *e else {
                return Pcr::NoResult;
            };
            let callee = 100 + caller % 3;
            Pcr::partial::<Callers>(Element::Method(callee), add_caller(callee, caller))
        })
        .expect("schedule calls");
}

#[test]
fn triggered_once_per_entity() {
    let store = setup(8);
    let counts = Arc::new(DashMap::new());
    store
        .register_triggered_computation(Callers::KIND, counting(&counts))
        .expect("register triggered");
    schedule_calls(&store);
    store.wait_on_phase_completion().expect("phase completes");

    assert_eq!(counts.len(), 3);
    for callee in 100..103 {
        assert_eq!(counts.get(&Element::Method(callee)).map(|c| *c), Some(1), "method {callee}");
        let expected: BTreeSet<u32> = (1..=30).filter(|m| 100 + m % 3 == callee).collect();
        let callers = store.apply::<Callers>(&Element::Method(callee)).expect("callers");
        assert_eq!(callers.final_of::<Callers>(), Some(&Callers(expected)));
    }
    // methods nobody calls have no callers value, so nothing was triggered
    assert!(counts.get(&Element::Method(1)).is_none());
}

#[test]
fn triggered_computations_contribute_results() {
    let store = setup(4);
    store
        .register_triggered_computation(Callers::KIND, |_, e| Pcr::final_value(*e, Answer(42)))
        .expect("register triggered");
    schedule_calls(&store);
    store.wait_on_phase_completion().expect("phase completes");

    let answers = store.final_entities(Answer::KIND);
    assert_eq!(answers.len(), 3);
    assert_eq!(store.entities_with(&Answer(42)).len(), 3);
}

#[test]
fn late_registration_sees_existing_values() {
    let store = setup(2);
    store
        .set(FinalEP::new(Element::Method(1), Callers(BTreeSet::from([2]))))
        .expect("set callers");
    let counts = Arc::new(DashMap::new());
    store
        .register_triggered_computation(Callers::KIND, counting(&counts))
        .expect("register triggered");
    store.wait_on_phase_completion().expect("phase completes");
    assert_eq!(counts.get(&Element::Method(1)).map(|c| *c), Some(1));

    // a later value of another entity still triggers, once
    store
        .schedule_eager_computation_for_entity(Element::Method(7), |_, _| {
            Pcr::partial::<Callers>(Element::Method(8), add_caller(8, 7))
        })
        .expect("schedule");
    store.wait_on_phase_completion().expect("phase completes");
    assert_eq!(counts.get(&Element::Method(1)).map(|c| *c), Some(1));
    assert_eq!(counts.get(&Element::Method(8)).map(|c| *c), Some(1));
}

#[test]
fn fallback_values_trigger_too() {
    let store = setup(2);
    let counts = Arc::new(DashMap::new());
    store
        .register_triggered_computation(Callers::KIND, counting(&counts))
        .expect("register triggered");
    store.force(&EPK::of::<Callers>(Element::Method(5))).expect("force");
    store.wait_on_phase_completion().expect("phase completes");

    let callers = store.apply::<Callers>(&Element::Method(5)).expect("callers");
    assert_eq!(callers.final_of::<Callers>(), Some(&Callers::default()));
    assert_eq!(counts.get(&Element::Method(5)).map(|c| *c), Some(1));
}
