use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use fpcf::{EOptionP, EPK, InterimEP, PropertyMeta, PropertyStore};

mod common;
use common::{Callers, Element, Pcr, Purity, add_caller, final_purity, setup};

const TARGET: Element = Element::Method(0);

type Counters = Arc<Mutex<Vec<Arc<AtomicUsize>>>>;

// waits on m1..m8 until all of them are final; every continuation handed to
// the store gets its own counter
fn target(store: &PropertyStore<Element>, counters: Counters) -> Pcr {
    let pending: Vec<EOptionP<Element>> = (1..=8)
        .map(|m| store.apply::<Purity>(&Element::Method(m)).expect("query dependee"))
        .filter(|eop| !eop.is_final())
        .collect();
    if pending.is_empty() {
        return Pcr::final_value(TARGET, Purity::Pure);
    }
    let waiting_on: Vec<EPK<Element>> = pending.iter().map(|eop| eop.epk().clone()).collect();
    let count = Arc::new(AtomicUsize::new(0));
    counters.lock().push(Arc::clone(&count));
    Pcr::interim(
        InterimEP::new(TARGET, Purity::Impure, Purity::Pure),
        pending,
        move |store: &PropertyStore<Element>, update: EOptionP<Element>| {
            count.fetch_add(1, Ordering::SeqCst);
            assert!(waiting_on.contains(update.epk()), "woken by {update}");
            target(store, counters)
        },
    )
}

fn run_once(threads: usize) -> Vec<usize> {
    let store = setup(threads);
    let counters: Counters = Arc::new(Mutex::new(Vec::new()));
    let registered = Arc::clone(&counters);
    store
        .register_lazy_property_computation(Purity::KIND, move |store, e| match *e {
            TARGET => target(store, Arc::clone(&registered)),
            Element::Method(m) => {
                // some busy work so the dependees finish at different times
                let spins = (m as usize * 7919) % 5000;
                let mut acc = 0usize;
                for i in 0..spins {
                    acc = acc.wrapping_add(i);
                }
                std::hint::black_box(acc);
                Pcr::final_value(*e, Purity::Pure)
            }
            _ => Pcr::NoResult,
        })
        .expect("register purity");
    store.force(&EPK::of::<Purity>(TARGET)).expect("force target");
    store.wait_on_phase_completion().expect("phase completes");

    assert_eq!(final_purity(&store, 0), Some(Purity::Pure));
    let counts = counters.lock().iter().map(|c| c.load(Ordering::SeqCst)).collect();
    counts
}

#[test]
fn every_continuation_runs_exactly_once() {
    for _ in 0..20 {
        let counts = run_once(8);
        assert!(!counts.is_empty());
        assert!(counts.iter().all(|&c| c == 1), "{counts:?}");
    }
}

#[test]
fn a_single_worker_resumes_in_order() {
    let counts = run_once(1);
    assert!(counts.iter().all(|&c| c == 1), "{counts:?}");
}

#[test]
fn continuations_see_the_value_at_execution_time() {
    // one worker: m1 suspends on the callers of m9, then two callers are
    // added before the resumed continuation gets to run
    let store = setup(1);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&seen);
    store
        .register_lazy_property_computation(Purity::KIND, move |store, e| {
            let callers = store.apply::<Callers>(&Element::Method(9)).expect("query callers");
            assert!(callers.is_epk());
            let recorded = Arc::clone(&recorded);
            Pcr::interim(
                InterimEP::new(*e, Purity::Impure, Purity::Pure),
                vec![callers],
                move |_: &PropertyStore<Element>, update: EOptionP<Element>| {
                    recorded.lock().push(update.lb_of::<Callers>().map(|c| c.0.len()));
                    Pcr::final_value(Element::Method(1), Purity::Pure)
                },
            )
        })
        .expect("register purity");
    store.force(&EPK::of::<Purity>(Element::Method(1))).expect("force m1");
    store
        .schedule_eager_computations_for_entities([1, 2].map(Element::Method), |_, e| {
            let Element::Method(caller) = *e else {
                return Pcr::NoResult;
            };
            Pcr::partial::<Callers>(Element::Method(9), add_caller(9, caller))
        })
        .expect("schedule callers");
    store.wait_on_phase_completion().expect("phase completes");

    assert_eq!(final_purity(&store, 1), Some(Purity::Pure));
    // woken by the first caller, but both were known by then
    assert_eq!(*seen.lock(), vec![Some(2)]);
}
