use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use fpcf::{EPK, EventLog, PropertyMeta, PropertyStore, PropertyStoreTracer, TraceEventKind};

mod common;
use common::{CallGraph, Element, Purity, config, final_purity, register_kinds};

// a cycle m1 <-> m2 and m3 calling the unknown m9
fn run(store: &PropertyStore<Element>) {
    let graph = CallGraph::new()
        .method(1, &[2], Purity::Pure)
        .method(2, &[1], Purity::Pure)
        .method(3, &[9], Purity::Pure);
    store
        .register_lazy_property_computation(Purity::KIND, graph.analysis())
        .expect("register purity");
    store.force(&EPK::of::<Purity>(Element::Method(1))).expect("force m1");
    store.force(&EPK::of::<Purity>(Element::Method(3))).expect("force m3");
    store.wait_on_phase_completion().expect("phase completes");
}

fn traced() -> (PropertyStore<Element>, Arc<EventLog>) {
    let log = Arc::new(EventLog::new());
    let tracer: Arc<dyn PropertyStoreTracer<Element>> = log.clone();
    let store = PropertyStore::with_tracer(config(4), tracer);
    register_kinds(&store, Default::default());
    (store, log)
}

#[test]
fn every_kind_of_event_is_recorded() {
    let (store, log) = traced();
    run(&store);
    let events = log.events();

    let count = |f: fn(&TraceEventKind) -> bool| events.iter().filter(|event| f(&event.kind)).count();
    assert_eq!(count(|k| matches!(k, TraceEventKind::Force { .. })), 2);
    assert!(count(|k| matches!(k, TraceEventKind::Schedule { origin: "lazy", .. })) >= 4);
    assert!(count(|k| matches!(k, TraceEventKind::Update { .. })) >= 5);
    assert!(count(|k| matches!(k, TraceEventKind::Notification { .. })) >= 1);
    assert_eq!(count(|k| matches!(k, TraceEventKind::Fallback { .. })), 1);
    assert_eq!(count(|k| matches!(k, TraceEventKind::CycleResolution { cycle_size: 2, .. })), 2);
    assert!(count(|k| matches!(k, TraceEventKind::Quiescence { .. })) >= 2);
    assert_eq!(count(|k| matches!(k, TraceEventKind::ComputationFault { .. })), 0);

    assert!(events.windows(2).all(|pair| pair[0].seq < pair[1].seq));
}

#[test]
fn the_log_can_be_read_dumped_and_drained() {
    let (store, log) = traced();
    run(&store);

    let first = log.events();
    assert_eq!(log.events().len(), first.len());
    assert_eq!(log.len(), first.len());

    let json = log.to_json().expect("serialize events");
    let parsed: serde_json::Value = serde_json::from_str(&json).expect("valid json");
    let entries = parsed.as_array().expect("array of events");
    assert_eq!(entries.len(), first.len());
    assert!(entries.iter().all(|entry| entry["event"].is_string() && entry["seq"].is_u64()));
    assert_eq!(entries[0]["event"], "force");

    let mut replayed = Vec::new();
    EventLog::replay(&first, |kind| replayed.push(kind.clone()));
    assert_eq!(replayed, first.iter().map(|event| event.kind.clone()).collect::<Vec<_>>());

    let drained = log.drain();
    assert_eq!(drained.len(), first.len());
    assert!(log.is_empty());
}

#[test]
fn tracing_does_not_change_the_outcome() {
    let (traced_store, _log) = traced();
    run(&traced_store);
    let plain = common::setup(4);
    run(&plain);
    let logged = PropertyStore::new(config(4).trace(true));
    register_kinds(&logged, Default::default());
    assert!(logged.tracer().is_some());
    run(&logged);

    for m in [1, 2, 3, 9] {
        let expected = final_purity(&plain, m);
        assert!(expected.is_some());
        assert_eq!(final_purity(&traced_store, m), expected, "method {m}");
        assert_eq!(final_purity(&logged, m), expected, "method {m}");
    }
}

#[test]
fn readers_never_take_events_away() {
    let (store, log) = traced();
    let done = AtomicBool::new(false);
    thread::scope(|scope| {
        let readers: Vec<_> = (0..3)
            .map(|_| {
                scope.spawn(|| {
                    let mut seen = 0;
                    while !done.load(Ordering::Acquire) {
                        let events = log.events();
                        assert!(events.len() >= seen);
                        assert!(events.windows(2).all(|pair| pair[0].seq < pair[1].seq));
                        seen = events.len();
                    }
                })
            })
            .collect();
        run(&store);
        done.store(true, Ordering::Release);
        for reader in readers {
            reader.join().expect("reader");
        }
    });
    let events = log.events();
    assert_eq!(events.len(), log.len());
    assert!(events.iter().enumerate().all(|(i, event)| event.seq == i as u64));
    assert_eq!(count_forces(&events), 2);

    // sequence numbers keep counting after a drain
    let drained = log.drain();
    run_again(&store);
    let later = log.events();
    assert!(!later.is_empty());
    assert!(later.iter().all(|event| event.seq >= drained.len() as u64));
}

fn count_forces(events: &[fpcf::TraceEvent]) -> usize {
    events
        .iter()
        .filter(|event| matches!(event.kind, TraceEventKind::Force { .. }))
        .count()
}

fn run_again(store: &PropertyStore<Element>) {
    store.force(&EPK::of::<Purity>(Element::Method(4))).expect("force m4");
    store.wait_on_phase_completion().expect("phase completes");
}
