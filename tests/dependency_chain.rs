use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use fpcf::{EOptionP, EPK, InterimEP, PropertyMeta, PropertyStore};

mod common;
use common::{CallGraph, Element, Pcr, Purity, final_purity, setup};

#[test]
fn caller_of_a_pure_method_is_pure() {
    // one worker, so m2 cannot be computed before m1 declared its dependency
    let store = setup(1);
    let resumed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&resumed);
    store
        .register_lazy_property_computation(Purity::KIND, move |store, e| match *e {
            Element::Method(2) => Pcr::final_value(*e, Purity::Pure),
            Element::Method(1) => {
                let callee = store.apply::<Purity>(&Element::Method(2)).expect("query m2");
                assert!(callee.is_epk(), "m2 cannot be known yet");
                let counter = Arc::clone(&counter);
                Pcr::interim(
                    InterimEP::new(*e, Purity::Impure, Purity::Pure),
                    vec![callee],
                    move |_: &PropertyStore<Element>, update: EOptionP<Element>| {
                        counter.fetch_add(1, Ordering::SeqCst);
                        let p = *update.final_of::<Purity>().expect("m2 is final");
                        Pcr::final_value(Element::Method(1), p)
                    },
                )
            }
            _ => Pcr::NoResult,
        })
        .expect("register purity");
    store.force(&EPK::of::<Purity>(Element::Method(1))).expect("force m1");
    store.wait_on_phase_completion().expect("phase completes");

    assert_eq!(resumed.load(Ordering::SeqCst), 1);
    assert_eq!(final_purity(&store, 1), Some(Purity::Pure));
    assert_eq!(final_purity(&store, 2), Some(Purity::Pure));
}

#[test]
fn long_chain_settles() {
    let store = setup(4);
    // m0 -> m1 -> ... -> m49, m10 has a side effect
    let mut graph = CallGraph::new();
    for m in 0..50 {
        let calls: &[u32] = if m < 49 { &[m + 1] } else { &[] };
        let own = if m == 10 { Purity::SideEffectFree } else { Purity::Pure };
        graph = graph.method(m, calls, own);
    }
    store
        .register_lazy_property_computation(Purity::KIND, graph.analysis())
        .expect("register purity");
    store.force(&EPK::of::<Purity>(Element::Method(0))).expect("force m0");
    store.wait_on_phase_completion().expect("phase completes");

    for m in 0..50 {
        let expected = if m <= 10 { Purity::SideEffectFree } else { Purity::Pure };
        assert_eq!(final_purity(&store, m), Some(expected), "method {m}");
    }
    let stats = store.statistics();
    assert_eq!(stats.resolved_cycles, 0);
    assert_eq!(stats.fallbacks, 0);
}

#[test]
fn impure_callee_decides_early() {
    let store = setup(4);
    let graph = CallGraph::new()
        .method(1, &[2, 3], Purity::Pure)
        .method(2, &[], Purity::Impure)
        .method(3, &[4], Purity::Pure)
        .method(4, &[], Purity::Pure);
    store
        .register_lazy_property_computation(Purity::KIND, graph.analysis())
        .expect("register purity");
    store.force(&EPK::of::<Purity>(Element::Method(1))).expect("force m1");
    store.wait_on_phase_completion().expect("phase completes");

    assert_eq!(final_purity(&store, 1), Some(Purity::Impure));
    assert_eq!(final_purity(&store, 3), Some(Purity::Pure));
    assert_eq!(store.entities_with(&Purity::Pure).len(), 2);
}

#[test]
fn fan_in_on_a_popular_method() {
    let store = setup(8);
    // 200 methods all call m0, which calls m1
    let mut graph = CallGraph::new()
        .method(0, &[1], Purity::Pure)
        .method(1, &[], Purity::SideEffectFree);
    for m in 2..202 {
        graph = graph.method(m, &[0], Purity::Pure);
    }
    store
        .register_lazy_property_computation(Purity::KIND, graph.analysis())
        .expect("register purity");
    for m in 2..202 {
        store.force(&EPK::of::<Purity>(Element::Method(m))).expect("force");
    }
    store.wait_on_phase_completion().expect("phase completes");
    for m in 0..202 {
        assert_eq!(final_purity(&store, m), Some(Purity::SideEffectFree), "method {m}");
    }
}
