use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters updated by the store while it runs; relaxed, approximate while
/// workers are active and exact once the phase is complete.
#[derive(Debug, Default)]
pub struct StoreStatistics {
    scheduled_tasks: AtomicU64,
    executed_tasks: AtomicU64,
    updates: AtomicU64,
    notifications: AtomicU64,
    fallbacks: AtomicU64,
    resolved_cycles: AtomicU64,
    resolved_interims: AtomicU64,
    quiescence_rounds: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Statistics {
    pub scheduled_tasks: u64,
    pub executed_tasks: u64,
    pub updates: u64,
    pub notifications: u64,
    pub fallbacks: u64,
    pub resolved_cycles: u64,
    pub resolved_interims: u64,
    pub quiescence_rounds: u64,
}

impl StoreStatistics {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn scheduled(&self) {
        self.scheduled_tasks.fetch_add(1, Ordering::Relaxed);
    }
    pub fn executed(&self) {
        self.executed_tasks.fetch_add(1, Ordering::Relaxed);
    }
    pub fn updated(&self) {
        self.updates.fetch_add(1, Ordering::Relaxed);
    }
    pub fn notified(&self) {
        self.notifications.fetch_add(1, Ordering::Relaxed);
    }
    pub fn fell_back(&self) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
    }
    pub fn resolved_cycle(&self) {
        self.resolved_cycles.fetch_add(1, Ordering::Relaxed);
    }
    pub fn resolved_interim(&self) {
        self.resolved_interims.fetch_add(1, Ordering::Relaxed);
    }
    pub fn quiescence_round(&self) -> u64 {
        self.quiescence_rounds.fetch_add(1, Ordering::Relaxed) + 1
    }
    pub fn snapshot(&self) -> Statistics {
        Statistics {
            scheduled_tasks: self.scheduled_tasks.load(Ordering::Relaxed),
            executed_tasks: self.executed_tasks.load(Ordering::Relaxed),
            updates: self.updates.load(Ordering::Relaxed),
            notifications: self.notifications.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            resolved_cycles: self.resolved_cycles.load(Ordering::Relaxed),
            resolved_interims: self.resolved_interims.load(Ordering::Relaxed),
            quiescence_rounds: self.quiescence_rounds.load(Ordering::Relaxed),
        }
    }
}
