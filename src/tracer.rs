//! Passive observers of store events.
//!
//! A tracer sees every scheduling decision, update, notification and
//! quiescence round, but it cannot influence any of them. [`EventLog`] keeps
//! the events in a lock-free queue so they can be dumped and replayed
//! afterwards; [`LogTracer`] forwards them to `tracing`.

use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use crossbeam::queue::SegQueue;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::trace;

use crate::eoption::{EOptionP, EPK, Entity, FinalEP};
use crate::error::StoreError;
use crate::property::FallbackReason;

pub trait PropertyStoreTracer<E: Entity>: Send + Sync {
    fn force(&self, _epk: &EPK<E>) {}
    fn schedule(&self, _e: &E, _origin: &'static str) {}
    fn update(&self, _old: &EOptionP<E>, _new: &EOptionP<E>) {}
    /// `depender` is `None` for a collaborative continuation.
    fn notification(&self, _dependee: &EPK<E>, _depender: Option<&EPK<E>>) {}
    fn fallback(&self, _ep: &FinalEP<E>, _reason: FallbackReason) {}
    fn cycle_resolution(&self, _ep: &FinalEP<E>, _cycle_size: usize) {}
    fn computation_fault(&self, _error: &StoreError) {}
    fn quiescence(&self, _round: u64) {}
}

// ------------- Events -------------
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TraceEventKind {
    Force { epk: String },
    Schedule { entity: String, origin: &'static str },
    Update { old: String, new: String },
    Notification { dependee: String, depender: Option<String> },
    Fallback { ep: String, reason: FallbackReason },
    CycleResolution { ep: String, cycle_size: usize },
    ComputationFault { error: String },
    Quiescence { round: u64 },
}

#[derive(Debug, Clone, Serialize)]
pub struct TraceEvent {
    pub seq: u64,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: TraceEventKind,
}

// ------------- EventLog -------------
/// Append-only, thread-safe event log.
///
/// Recording is lock-free. Readers move what was recorded so far into an
/// archive, so reading never takes events away from other readers.
#[derive(Debug, Default)]
pub struct EventLog {
    queue: SegQueue<TraceEvent>,
    archive: Mutex<Vec<TraceEvent>>,
    seq: AtomicU64,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }
    fn record(&self, kind: TraceEventKind) {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        self.queue.push(TraceEvent {
            seq,
            at: Utc::now(),
            kind,
        });
    }
    pub fn len(&self) -> usize {
        self.archive.lock().len() + self.queue.len()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn archive_queued(&self, archive: &mut Vec<TraceEvent>) {
        let before = archive.len();
        while let Some(event) = self.queue.pop() {
            archive.push(event);
        }
        if archive.len() > before {
            archive.sort_by_key(|event| event.seq);
        }
    }
    /// Takes every recorded event, in the order the events happened.
    pub fn drain(&self) -> Vec<TraceEvent> {
        let mut archive = self.archive.lock();
        self.archive_queued(&mut archive);
        mem::take(&mut *archive)
    }
    /// Snapshot in sequence order; the log keeps its events.
    pub fn events(&self) -> Vec<TraceEvent> {
        let mut archive = self.archive.lock();
        self.archive_queued(&mut archive);
        archive.clone()
    }
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.events())
    }
    /// Feeds recorded events to `f` in order, e.g. to rebuild a timeline.
    pub fn replay(events: &[TraceEvent], mut f: impl FnMut(&TraceEventKind)) {
        let mut ordered: Vec<&TraceEvent> = events.iter().collect();
        ordered.sort_by_key(|event| event.seq);
        for event in ordered {
            f(&event.kind);
        }
    }
}

impl<E: Entity> PropertyStoreTracer<E> for EventLog {
    fn force(&self, epk: &EPK<E>) {
        self.record(TraceEventKind::Force { epk: epk.to_string() });
    }
    fn schedule(&self, e: &E, origin: &'static str) {
        self.record(TraceEventKind::Schedule {
            entity: format!("{:?}", e),
            origin,
        });
    }
    fn update(&self, old: &EOptionP<E>, new: &EOptionP<E>) {
        self.record(TraceEventKind::Update {
            old: old.to_string(),
            new: new.to_string(),
        });
    }
    fn notification(&self, dependee: &EPK<E>, depender: Option<&EPK<E>>) {
        self.record(TraceEventKind::Notification {
            dependee: dependee.to_string(),
            depender: depender.map(|epk| epk.to_string()),
        });
    }
    fn fallback(&self, ep: &FinalEP<E>, reason: FallbackReason) {
        self.record(TraceEventKind::Fallback {
            ep: EOptionP::Final(ep.clone()).to_string(),
            reason,
        });
    }
    fn cycle_resolution(&self, ep: &FinalEP<E>, cycle_size: usize) {
        self.record(TraceEventKind::CycleResolution {
            ep: EOptionP::Final(ep.clone()).to_string(),
            cycle_size,
        });
    }
    fn computation_fault(&self, error: &StoreError) {
        self.record(TraceEventKind::ComputationFault {
            error: error.to_string(),
        });
    }
    fn quiescence(&self, round: u64) {
        self.record(TraceEventKind::Quiescence { round });
    }
}

// ------------- LogTracer -------------
/// Emits every event as a `tracing` event at trace level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTracer;

impl<E: Entity> PropertyStoreTracer<E> for LogTracer {
    fn force(&self, epk: &EPK<E>) {
        trace!(%epk, "force");
    }
    fn schedule(&self, e: &E, origin: &'static str) {
        trace!(entity = ?e, origin, "schedule");
    }
    fn update(&self, old: &EOptionP<E>, new: &EOptionP<E>) {
        trace!(%old, %new, "update");
    }
    fn notification(&self, dependee: &EPK<E>, depender: Option<&EPK<E>>) {
        trace!(%dependee, depender = ?depender.map(|epk| epk.to_string()), "notification");
    }
    fn fallback(&self, ep: &FinalEP<E>, reason: FallbackReason) {
        trace!(epk = %ep.epk(), value = ?ep.p(), ?reason, "fallback");
    }
    fn cycle_resolution(&self, ep: &FinalEP<E>, cycle_size: usize) {
        trace!(epk = %ep.epk(), value = ?ep.p(), cycle_size, "cycle resolved");
    }
    fn computation_fault(&self, error: &StoreError) {
        trace!(%error, "computation fault");
    }
    fn quiescence(&self, round: u64) {
        trace!(round, "quiescence");
    }
}
