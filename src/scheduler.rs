//! Task queue and worker pool.
//!
//! Tasks wait in a global [`Injector`]; every worker keeps a FIFO deque it
//! refills in batches and that idle workers steal from. A task counts as
//! pending from the moment it is pushed until it has been executed, so the
//! phase is quiescent exactly when the counter drops to zero: no task is
//! queued or running, and none can appear unless the store itself pushes one
//! while resolving the quiescent state.

use std::iter;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam::deque::{Injector, Stealer, Worker};
use crossbeam::utils::Backoff;
use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::eoption::Entity;
use crate::result::{OnUpdateContinuation, PropertyComputation};
use crate::state::{Depender, StateId};

pub enum Task<E> {
    /// Runs a computation for one entity.
    Compute {
        computation: PropertyComputation<E>,
        e: E,
    },
    /// Resumes a suspended computation; the dependee is read when the task
    /// runs, not when it was queued.
    Resume {
        depender: Depender,
        dependee: StateId,
        continuation: OnUpdateContinuation<E>,
    },
}

pub struct TaskQueue<E> {
    injector: Injector<Task<E>>,
    pending: AtomicUsize,
    sleep: Mutex<()>,
    work_available: Condvar,
    quiescent: Condvar,
    // drop tasks instead of running them
    halted: AtomicBool,
    // drop tasks, and refuse new ones
    shutdown: AtomicBool,
    idle_wait: Duration,
}

impl<E: Entity> TaskQueue<E> {
    pub fn new(idle_wait: Duration) -> Self {
        Self {
            injector: Injector::new(),
            pending: AtomicUsize::new(0),
            sleep: Mutex::new(()),
            work_available: Condvar::new(),
            quiescent: Condvar::new(),
            halted: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            idle_wait,
        }
    }

    /// Queues a task; false if the queue has been shut down.
    pub fn push(&self, task: Task<E>) -> bool {
        if self.shutdown.load(Ordering::Acquire) {
            return false;
        }
        self.pending.fetch_add(1, Ordering::AcqRel);
        self.injector.push(task);
        let _guard = self.sleep.lock();
        self.work_available.notify_one();
        true
    }

    fn finish_one(&self) {
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            let _guard = self.sleep.lock();
            self.quiescent.notify_all();
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    pub fn wait_until_quiescent(&self) {
        let mut guard = self.sleep.lock();
        while self.pending.load(Ordering::Acquire) != 0 {
            self.quiescent.wait_for(&mut guard, self.idle_wait);
        }
    }

    /// Stops executing tasks; whatever is still queued gets dropped.
    pub fn halt(&self) {
        self.halted.store(true, Ordering::Release);
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.halt();
        // nobody may be running the pool, drop the queued tasks here
        while let Some(task) = iter::repeat_with(|| self.injector.steal())
            .find(|s| !s.is_retry())
            .and_then(|s| s.success())
        {
            drop(task);
            self.finish_one();
        }
        let _guard = self.sleep.lock();
        self.work_available.notify_all();
        self.quiescent.notify_all();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Runs `threads` workers until the phase is done.
    ///
    /// Whenever the queue runs dry `on_quiescence` is called on the current
    /// thread; it may push more work and returns whether it changed anything.
    /// The pool stops after a quiescent state that changed nothing, or once
    /// the queue has been halted.
    pub fn run(
        &self,
        threads: usize,
        execute: impl Fn(Task<E>) + Sync,
        mut on_quiescence: impl FnMut() -> bool,
    ) {
        let done = AtomicBool::new(false);
        let (workers, stealers): (Vec<_>, Vec<_>) = (0..threads.max(1))
            .map(|_| {
                let worker = Worker::new_fifo();
                let stealer = worker.stealer();
                (worker, stealer)
            })
            .unzip();
        debug!(threads = workers.len(), pending = self.pending(), "Starting workers");
        thread::scope(|scope| {
            for local in workers {
                let (stealers, done, execute) = (&stealers, &done, &execute);
                scope.spawn(move || self.work(local, stealers, done, execute));
            }
            loop {
                self.wait_until_quiescent();
                if self.is_halted() || !on_quiescence() {
                    break;
                }
            }
            done.store(true, Ordering::Release);
            let _guard = self.sleep.lock();
            self.work_available.notify_all();
        });
        debug!("Workers stopped");
    }

    fn work(
        &self,
        local: Worker<Task<E>>,
        stealers: &[Stealer<Task<E>>],
        done: &AtomicBool,
        execute: &(impl Fn(Task<E>) + Sync),
    ) {
        let backoff = Backoff::new();
        loop {
            if let Some(task) = find_task(&local, &self.injector, stealers) {
                backoff.reset();
                if !self.is_halted() {
                    execute(task);
                }
                self.finish_one();
                continue;
            }
            if done.load(Ordering::Acquire) {
                break;
            }
            if backoff.is_completed() {
                let mut guard = self.sleep.lock();
                if self.injector.is_empty() && !done.load(Ordering::Acquire) {
                    // other workers' deques are not watched, hence the timeout
                    self.work_available.wait_for(&mut guard, self.idle_wait);
                }
            } else {
                backoff.snooze();
            }
        }
    }
}

fn find_task<T>(local: &Worker<T>, global: &Injector<T>, stealers: &[Stealer<T>]) -> Option<T> {
    local.pop().or_else(|| {
        iter::repeat_with(|| {
            global
                .steal_batch_and_pop(local)
                .or_else(|| stealers.iter().map(|s| s.steal()).collect())
        })
        .find(|s| !s.is_retry())
        .and_then(|s| s.success())
    })
}
