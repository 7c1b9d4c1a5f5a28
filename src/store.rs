//! The property store.
//!
//! Analyses register how to compute property kinds, query values and hand
//! back [`PropertyComputationResult`]s; the store keeps one [`EPKState`] per
//! queried EPK, wakes suspended computations when their dependees change and
//! drives the whole system to a fixpoint. When no task is left it resolves
//! what cannot change any more: unqueried values fall back, closed cycles are
//! resolved and collaboratively computed values are finalized.

use std::any::Any;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::arena::StateArena;
use crate::config::StoreConfig;
use crate::cycles::{SuspendedNode, closed_components};
use crate::eoption::{EOptionP, EPK, Entity, FinalEP};
use crate::error::{Result, StoreError};
use crate::property::{PropertyKind, PropertyMeta};
use crate::registry::{ComputationRegistry, KindRegistry, PropertyKindInfo};
use crate::result::{
    InterimPartialResult, InterimResult, PartialResult, PropertyComputation,
    PropertyComputationResult,
};
use crate::scheduler::{Task, TaskQueue};
use crate::state::{Depender, EPKState, StateId, Suspension, Update};
use crate::stats::{Statistics, StoreStatistics};
use crate::tracer::{LogTracer, PropertyStoreTracer};

pub struct PropertyStore<E> {
    config: StoreConfig,
    kinds: KindRegistry<E>,
    computations: RwLock<ComputationRegistry<E>>,
    arena: StateArena<E>,
    queue: TaskQueue<E>,
    tracer: Option<Arc<dyn PropertyStoreTracer<E>>>,
    stats: StoreStatistics,
    first_error: Mutex<Option<StoreError>>,
    epoch: AtomicU64,
    // one phase at a time
    phase: Mutex<()>,
}

impl<E: Entity> PropertyStore<E> {
    pub fn new(config: StoreConfig) -> Self {
        let tracer: Option<Arc<dyn PropertyStoreTracer<E>>> = if config.trace {
            Some(Arc::new(LogTracer))
        } else {
            None
        };
        Self::build(config, tracer)
    }

    pub fn with_tracer(config: StoreConfig, tracer: Arc<dyn PropertyStoreTracer<E>>) -> Self {
        Self::build(config, Some(tracer))
    }

    fn build(config: StoreConfig, tracer: Option<Arc<dyn PropertyStoreTracer<E>>>) -> Self {
        info!(
            threads = config.worker_threads(),
            debug = config.debug,
            traced = tracer.is_some(),
            "Creating property store"
        );
        Self {
            queue: TaskQueue::new(config.idle_wait()),
            config,
            kinds: KindRegistry::new(),
            computations: RwLock::new(ComputationRegistry::new()),
            arena: StateArena::new(),
            tracer,
            stats: StoreStatistics::new(),
            first_error: Mutex::new(None),
            epoch: AtomicU64::new(0),
            phase: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }
    pub fn tracer(&self) -> Option<&Arc<dyn PropertyStoreTracer<E>>> {
        self.tracer.as_ref()
    }
    pub fn statistics(&self) -> Statistics {
        self.stats.snapshot()
    }

    fn trace(&self, f: impl FnOnce(&dyn PropertyStoreTracer<E>)) {
        if let Some(tracer) = &self.tracer {
            f(tracer.as_ref());
        }
    }

    fn check_running(&self) -> Result<()> {
        if self.queue.is_shutdown() {
            Err(StoreError::Shutdown)
        } else {
            Ok(())
        }
    }

    // ------------- Registration -------------
    pub fn register_kind(&self, info: PropertyKindInfo<E>) -> Result<()> {
        self.check_running()?;
        debug!(kind = %info.kind(), "Registering property kind");
        self.kinds.register(info)
    }

    /// Starts a new phase that computes `computed` and leaves `delayed` to a
    /// later one. Computations registered for the previous phase are dropped.
    pub fn setup_phase(&self, computed: &[PropertyKind], delayed: &[PropertyKind]) -> Result<()> {
        self.check_running()?;
        for kind in computed.iter().chain(delayed) {
            self.kinds.get(*kind)?;
        }
        info!(?computed, ?delayed, "Setting up phase");
        *self.computations.write() = ComputationRegistry::for_phase(computed, delayed);
        Ok(())
    }

    /// Registers the computation run the first time a value of `kind` is
    /// queried for an entity. Entities queried before, whose value is still
    /// unknown, are scheduled right away.
    pub fn register_lazy_property_computation(
        &self,
        kind: PropertyKind,
        computation: impl Fn(&PropertyStore<E>, &E) -> PropertyComputationResult<E> + Send + Sync + 'static,
    ) -> Result<()> {
        self.check_running()?;
        self.kinds.get(kind)?;
        let pc: PropertyComputation<E> = Arc::new(computation);
        let mut computations = self.computations.write();
        computations.register_lazy(kind, Arc::clone(&pc))?;
        debug!(%kind, "Registered lazy computation");
        for state in self.arena.all() {
            if state.epk().kind() == kind && state.eop().is_epk() {
                self.schedule(Arc::clone(&pc), state.epk().e().clone(), "lazy");
            }
        }
        Ok(())
    }

    /// Registers a computation that runs once per entity, as soon as a value
    /// of `kind` first becomes known for it.
    pub fn register_triggered_computation(
        &self,
        kind: PropertyKind,
        computation: impl Fn(&PropertyStore<E>, &E) -> PropertyComputationResult<E> + Send + Sync + 'static,
    ) -> Result<()> {
        self.check_running()?;
        self.kinds.get(kind)?;
        let pc: PropertyComputation<E> = Arc::new(computation);
        let mut computations = self.computations.write();
        computations.register_triggered(kind, Arc::clone(&pc));
        debug!(%kind, "Registered triggered computation");
        // cells that got their first value before now are not triggered again
        for state in self.arena.all() {
            if state.epk().kind() == kind && state.is_triggered() {
                self.schedule(Arc::clone(&pc), state.epk().e().clone(), "triggered");
            }
        }
        Ok(())
    }

    pub fn schedule_eager_computations_for_entities(
        &self,
        entities: impl IntoIterator<Item = E>,
        computation: impl Fn(&PropertyStore<E>, &E) -> PropertyComputationResult<E> + Send + Sync + 'static,
    ) -> Result<()> {
        self.check_running()?;
        let pc: PropertyComputation<E> = Arc::new(computation);
        for e in entities {
            self.schedule(Arc::clone(&pc), e, "eager");
        }
        Ok(())
    }

    pub fn schedule_eager_computation_for_entity(
        &self,
        e: E,
        computation: impl Fn(&PropertyStore<E>, &E) -> PropertyComputationResult<E> + Send + Sync + 'static,
    ) -> Result<()> {
        self.schedule_eager_computations_for_entities([e], computation)
    }

    fn schedule(&self, computation: PropertyComputation<E>, e: E, origin: &'static str) {
        self.stats.scheduled();
        self.trace(|t| t.schedule(&e, origin));
        self.queue.push(Task::Compute { computation, e });
    }

    /// Pre-seeds a final value, e.g. one computed by an earlier run.
    pub fn set(&self, ep: FinalEP<E>) -> Result<()> {
        self.check_running()?;
        self.install_final(ep)
    }

    // ------------- Queries -------------
    /// The current value of `epk`.
    ///
    /// The first query of an EPK schedules the lazy computation of its kind;
    /// a kind that nobody computes, now or later, answers its fallback.
    pub fn get(&self, epk: &EPK<E>) -> Result<EOptionP<E>> {
        self.check_running()?;
        if let Some(state) = self.arena.get(epk) {
            return Ok(state.eop());
        }
        let kind = epk.kind();
        let info = self.kinds.get(kind)?;
        let computations = self.computations.read();
        if !computations.is_computed(kind) && !computations.is_delayed(kind) {
            let reason = computations.fallback_reason(kind);
            drop(computations);
            let (state, created) = self.arena.get_or_create(epk)?;
            if created {
                let ep = info.fallback(reason, epk.e());
                self.stats.fell_back();
                self.trace(|t| t.fallback(&ep, reason));
                let update = state.update(ep.into(), false)?;
                self.after_update(&state, update);
            }
            return Ok(state.eop());
        }
        let (state, created) = self.arena.get_or_create(epk)?;
        if created {
            if let Some(pc) = computations.lazy(kind) {
                self.schedule(pc, epk.e().clone(), "lazy");
            }
        }
        Ok(state.eop())
    }

    /// The current value of property `P` of `e`.
    pub fn apply<P: PropertyMeta>(&self, e: &E) -> Result<EOptionP<E>> {
        self.get(&EPK::of::<P>(e.clone()))
    }

    /// Makes sure `epk` gets computed, without reading it.
    pub fn force(&self, epk: &EPK<E>) -> Result<()> {
        self.trace(|t| t.force(epk));
        self.get(epk).map(|_| ())
    }

    pub fn has_property(&self, epk: &EPK<E>) -> bool {
        self.arena.get(epk).is_some_and(|state| state.eop().has_value())
    }

    pub fn is_known(&self, epk: &EPK<E>) -> bool {
        self.arena.get(epk).is_some()
    }

    /// Every value of `kind` the store holds.
    pub fn entities(&self, kind: PropertyKind) -> Vec<EOptionP<E>> {
        self.arena
            .all()
            .into_iter()
            .filter(|state| state.epk().kind() == kind)
            .map(|state| state.eop())
            .collect()
    }

    /// Entities whose final value equals `p`.
    pub fn entities_with<P: PropertyMeta>(&self, p: &P) -> Vec<E> {
        self.entities(P::KIND)
            .into_iter()
            .filter(|eop| eop.final_of::<P>() == Some(p))
            .map(|eop| eop.e().clone())
            .collect()
    }

    pub fn final_entities(&self, kind: PropertyKind) -> Vec<FinalEP<E>> {
        self.entities(kind)
            .into_iter()
            .filter_map(|eop| match eop {
                EOptionP::Final(ep) => Some(ep),
                _ => None,
            })
            .collect()
    }

    /// Every known value of any kind for `e`.
    pub fn properties(&self, e: &E) -> Vec<EOptionP<E>> {
        self.arena
            .all()
            .into_iter()
            .filter(|state| state.epk().e() == e)
            .map(|state| state.eop())
            .filter(|eop| eop.has_value())
            .collect()
    }

    // ------------- Phases -------------
    /// Runs every scheduled computation to a fixpoint, using fallbacks and
    /// resolving cycles.
    pub fn wait_on_phase_completion(&self) -> Result<()> {
        self.wait_on_property_computation_completion(true, true)
    }

    /// Runs every scheduled computation to a fixpoint. Without
    /// `resolve_cycles` or `use_fallbacks` the phase may end with values
    /// that are still interim or unknown.
    pub fn wait_on_property_computation_completion(&self, resolve_cycles: bool, use_fallbacks: bool) -> Result<()> {
        self.check_running()?;
        let _phase = self.phase.lock();
        info!(
            states = self.arena.len(),
            pending = self.queue.pending(),
            resolve_cycles,
            use_fallbacks,
            "Waiting on phase completion"
        );
        self.queue.run(
            self.config.worker_threads(),
            |task| self.execute(task),
            || self.on_quiescence(resolve_cycles, use_fallbacks),
        );
        if let Some(error) = self.first_error.lock().clone() {
            warn!(%error, "Phase failed");
            return Err(error);
        }
        self.check_running()?;
        let stats = self.statistics();
        info!(
            states = self.arena.len(),
            executed = stats.executed_tasks,
            updates = stats.updates,
            rounds = stats.quiescence_rounds,
            "Phase complete"
        );
        Ok(())
    }

    pub fn shutdown(&self) {
        info!("Shutting down property store");
        self.queue.shutdown();
    }

    pub fn is_shutdown(&self) -> bool {
        self.queue.is_shutdown()
    }

    // ------------- Execution -------------
    fn execute(&self, task: Task<E>) {
        self.stats.executed();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| match task {
            Task::Compute { computation, e } => computation(self, &e),
            Task::Resume {
                dependee,
                continuation,
                ..
            } => continuation(self, self.arena.state(dependee).eop()),
        }));
        let handled = match outcome {
            Ok(result) => {
                debug!(result = result.id(), "Handling result");
                self.handle_result(result)
            }
            Err(panic) => Err(StoreError::ComputationFailed(panic_message(panic))),
        };
        if let Err(error) = handled {
            self.fail(error);
        }
    }

    // keeps the first error and stops the phase
    fn fail(&self, error: StoreError) {
        warn!(%error, "Computation fault");
        self.trace(|t| t.computation_fault(&error));
        let mut first = self.first_error.lock();
        if first.is_none() {
            *first = Some(error);
        }
        drop(first);
        self.queue.halt();
    }

    fn handle_result(&self, result: PropertyComputationResult<E>) -> Result<()> {
        match result {
            PropertyComputationResult::NoResult => Ok(()),
            PropertyComputationResult::Result(ep) => self.install_final(ep),
            PropertyComputationResult::MultiResult(eps) => {
                eps.into_iter().try_for_each(|ep| self.install_final(ep))
            }
            PropertyComputationResult::InterimResult(r) => self.handle_interim(r),
            PropertyComputationResult::PartialResult(r) => self.handle_partial(r),
            PropertyComputationResult::InterimPartialResult(r) => self.handle_interim_partial(r),
            PropertyComputationResult::IncrementalResult(r) => {
                self.handle_result(*r.result)?;
                for (pc, e) in r.next {
                    self.schedule(pc, e, "incremental");
                }
                Ok(())
            }
            PropertyComputationResult::Results(results) => {
                results.into_iter().try_for_each(|r| self.handle_result(r))
            }
        }
    }

    fn state_of(&self, epk: &EPK<E>) -> Result<Arc<EPKState<E>>> {
        self.kinds.get(epk.kind())?;
        Ok(self.arena.get_or_create(epk)?.0)
    }

    fn install_final(&self, ep: FinalEP<E>) -> Result<()> {
        let state = self.state_of(ep.epk())?;
        let update = state.update(ep.into(), self.config.debug)?;
        self.after_update(&state, update);
        Ok(())
    }

    fn handle_interim(&self, r: InterimResult<E>) -> Result<()> {
        let InterimResult {
            ep,
            dependees,
            continuation,
        } = r;
        let epk = ep.epk().clone();
        if dependees.is_empty() {
            return Err(StoreError::InterimResultWithoutDependees { epk: epk.to_string() });
        }
        if self.config.debug {
            self.check_dependees(&epk.to_string(), Some(&epk), &dependees)?;
        }
        let observed = self.observe(dependees)?;
        let state = self.state_of(&epk)?;
        let update = state.update(ep.into(), self.config.debug)?;
        let epoch = self.epoch.fetch_add(1, Ordering::Relaxed);
        state.set_suspension(Suspension::new(epoch, continuation, observed.clone()));
        self.after_update(&state, update);
        self.register_dependers(Depender::State(state.id()), epoch, &observed)
    }

    fn handle_partial(&self, r: PartialResult<E>) -> Result<()> {
        let PartialResult { epk, update } = r;
        if self.computations.read().lazy(epk.kind()).is_some() {
            return Err(StoreError::PartialResultOnLazyKind {
                epk: epk.to_string(),
                kind: epk.kind().to_string(),
            });
        }
        let state = self.state_of(&epk)?;
        let update = state.update_with(|current| update(current).map(EOptionP::Interim), self.config.debug)?;
        self.after_update(&state, update);
        Ok(())
    }

    fn handle_interim_partial(&self, r: InterimPartialResult<E>) -> Result<()> {
        let InterimPartialResult {
            partials,
            dependees,
            continuation,
        } = r;
        for partial in partials {
            self.handle_partial(partial)?;
        }
        if dependees.is_empty() {
            return Err(StoreError::InterimResultWithoutDependees {
                epk: "collaborative continuation".to_owned(),
            });
        }
        if self.config.debug {
            self.check_dependees("collaborative continuation", None, &dependees)?;
        }
        let observed = self.observe(dependees)?;
        let epoch = self.epoch.fetch_add(1, Ordering::Relaxed);
        let collaborator = self
            .arena
            .add_collaborator(Suspension::new(epoch, continuation, observed.clone()))?;
        self.register_dependers(Depender::Collaborator(collaborator.id()), epoch, &observed)
    }

    fn check_dependees(&self, depender: &str, own: Option<&EPK<E>>, dependees: &[EOptionP<E>]) -> Result<()> {
        for dependee in dependees {
            if own == Some(dependee.epk()) {
                return Err(StoreError::SelfDependency {
                    epk: depender.to_owned(),
                });
            }
            if dependee.is_final() {
                return Err(StoreError::FinalDependee {
                    epk: depender.to_owned(),
                    dependee: dependee.to_string(),
                });
            }
        }
        Ok(())
    }

    fn observe(&self, dependees: Vec<EOptionP<E>>) -> Result<Vec<(StateId, EOptionP<E>)>> {
        dependees
            .into_iter()
            .map(|eop| Ok((self.state_of(eop.epk())?.id(), eop)))
            .collect()
    }

    /// Registers `depender` with each dependee; a dependee that changed
    /// since the computation read it resumes the depender immediately.
    fn register_dependers(&self, depender: Depender, epoch: u64, dependees: &[(StateId, EOptionP<E>)]) -> Result<()> {
        for (id, observed) in dependees {
            let dependee = self.arena.state(*id);
            if !dependee.add_depender(depender, observed)? {
                if let Some(suspension) = self.take_suspension(depender, |s| s.epoch() == epoch) {
                    self.resume(depender, &dependee, suspension);
                }
                break;
            }
        }
        Ok(())
    }

    fn take_suspension(
        &self,
        depender: Depender,
        pred: impl FnOnce(&Suspension<E>) -> bool,
    ) -> Option<Suspension<E>> {
        match depender {
            Depender::State(id) => self.arena.state(id).clear_suspension_if(pred),
            Depender::Collaborator(id) => self.arena.collaborator(id)?.clear_suspension_if(pred),
        }
    }

    fn unlink(&self, depender: Depender, suspension: &Suspension<E>) {
        for (id, _) in suspension.dependees() {
            self.arena.state(*id).remove_depender(depender);
        }
        if let Depender::Collaborator(id) = depender {
            self.arena.remove_collaborator(id);
        }
    }

    fn resume(&self, depender: Depender, dependee: &EPKState<E>, suspension: Suspension<E>) {
        self.stats.notified();
        self.trace(|t| {
            let depender = match depender {
                Depender::State(id) => Some(self.arena.state(id).epk().clone()),
                Depender::Collaborator(_) => None,
            };
            t.notification(dependee.epk(), depender.as_ref());
        });
        self.unlink(depender, &suspension);
        let queued = self.queue.push(Task::Resume {
            depender,
            dependee: dependee.id(),
            continuation: suspension.into_continuation(),
        });
        if !queued {
            debug!(?depender, dependee = %dependee.epk(), "Store is shut down, continuation dropped");
        }
    }

    fn after_update(&self, state: &EPKState<E>, update: Update<E>) {
        if !update.changed {
            return;
        }
        self.stats.updated();
        debug!(epk = %state.epk(), new = %update.new, dependers = update.dependers.len(), "Updated");
        self.trace(|t| t.update(&update.old, &update.new));
        if let Some(dropped) = &update.dropped {
            self.unlink(Depender::State(state.id()), dropped);
        }
        for encoded in update.dependers.iter() {
            let depender = Depender::decode(encoded);
            // a depender that moved on to other dependees is not woken
            if let Some(suspension) = self.take_suspension(depender, |s| s.waits_on(state.id())) {
                self.resume(depender, state, suspension);
            }
        }
        if update.old.is_epk() {
            self.trigger(state);
        }
    }

    fn trigger(&self, state: &EPKState<E>) {
        let computations = self.computations.read();
        if state.mark_triggered() {
            for pc in computations.triggered(state.epk().kind()) {
                self.schedule(Arc::clone(pc), state.epk().e().clone(), "triggered");
            }
        }
    }

    // ------------- Quiescence -------------
    fn on_quiescence(&self, resolve_cycles: bool, use_fallbacks: bool) -> bool {
        let round = self.stats.quiescence_round();
        self.trace(|t| t.quiescence(round));
        match self.resolve_quiescent_state(resolve_cycles, use_fallbacks) {
            Ok(changed) => {
                info!(round, changed, "Quiescent");
                changed
            }
            Err(error) => {
                self.fail(error);
                false
            }
        }
    }

    // Each step returns as soon as it changed something, so the tasks it woke
    // run before anything else is settled. Cells some computation waits on
    // are settled first; the rest only once nothing else is left to do.
    fn resolve_quiescent_state(&self, resolve_cycles: bool, use_fallbacks: bool) -> Result<bool> {
        if use_fallbacks && self.apply_fallbacks(true)? {
            return Ok(true);
        }
        if resolve_cycles && (self.resolve_closed_cycles()? || self.finalize_interims(true)?) {
            return Ok(true);
        }
        if use_fallbacks && self.apply_fallbacks(false)? {
            return Ok(true);
        }
        Ok(resolve_cycles && self.finalize_interims(false)?)
    }

    // a task queued or running may still write any cell
    fn in_flight(&self) -> bool {
        self.queue.pending() > 0
    }

    fn apply_fallbacks(&self, waited_on: bool) -> Result<bool> {
        let unknown: Vec<_> = {
            let computations = self.computations.read();
            self.arena
                .all()
                .into_iter()
                .filter(|state| !computations.is_delayed(state.epk().kind()) && state.has_dependers() == waited_on)
                .filter_map(|state| {
                    let eop = state.eop();
                    let reason = computations.fallback_reason(state.epk().kind());
                    eop.is_epk().then_some((state, eop, reason))
                })
                .collect()
        };
        let mut changed = false;
        for (state, observed, reason) in unknown {
            let ep = self.kinds.get(state.epk().kind())?.fallback(reason, state.epk().e());
            let Some(update) = state.update_if_unchanged(&observed, ep.clone().into())? else {
                continue;
            };
            debug!(epk = %state.epk(), value = ?ep.p(), ?reason, "Fallback");
            self.stats.fell_back();
            self.trace(|t| t.fallback(&ep, reason));
            self.after_update(&state, update);
            changed = true;
            if self.in_flight() {
                break;
            }
        }
        Ok(changed)
    }

    fn resolve_closed_cycles(&self) -> Result<bool> {
        let mut nodes = Vec::new();
        for state in self.arena.all() {
            if let Some(dependees) = state.suspended_on() {
                nodes.push(SuspendedNode {
                    depender: Depender::State(state.id()),
                    dependees,
                });
            }
        }
        for collaborator in self.arena.collaborators() {
            if let Some(dependees) = collaborator.suspended_on() {
                nodes.push(SuspendedNode {
                    depender: Depender::Collaborator(collaborator.id()),
                    dependees,
                });
            }
        }
        // cells of later phases, and cycles through them, stay as they are
        let delayed: HashSet<Depender> = {
            let computations = self.computations.read();
            nodes
                .iter()
                .map(|node| node.depender)
                .filter(|depender| match depender {
                    Depender::State(id) => computations.is_delayed(self.arena.state(*id).epk().kind()),
                    Depender::Collaborator(_) => false,
                })
                .collect()
        };
        let mut changed = false;
        for component in closed_components(&nodes) {
            if component.iter().any(|depender| delayed.contains(depender)) {
                continue;
            }
            for &depender in &component {
                if let Some(suspension) = self.take_suspension(depender, |_| true) {
                    self.unlink(depender, &suspension);
                }
            }
            // every member is final before any outside depender is woken
            let mut resolved = Vec::with_capacity(component.len());
            for &depender in &component {
                let Depender::State(id) = depender else {
                    continue;
                };
                let state = self.arena.state(id);
                let observed = state.eop();
                let EOptionP::Interim(ep) = &observed else {
                    continue;
                };
                let ep = self.kinds.get(ep.epk().kind())?.resolve(ep);
                if let Some(update) = state.update_if_unchanged(&observed, ep.clone().into())? {
                    resolved.push((state, ep, update));
                }
            }
            for (state, ep, update) in resolved {
                debug!(epk = %ep.epk(), value = ?ep.p(), size = component.len(), "Resolved cycle");
                self.stats.resolved_cycle();
                self.trace(|t| t.cycle_resolution(&ep, component.len()));
                self.after_update(&state, update);
            }
            changed = true;
            if self.in_flight() {
                break;
            }
        }
        Ok(changed)
    }

    // interim values nobody refines any more, i.e. collaboratively computed ones
    fn finalize_interims(&self, waited_on: bool) -> Result<bool> {
        let settled: Vec<_> = {
            let computations = self.computations.read();
            self.arena
                .all()
                .into_iter()
                .filter(|state| {
                    !computations.is_delayed(state.epk().kind())
                        && !state.has_suspension()
                        && state.has_dependers() == waited_on
                })
                .filter_map(|state| match state.eop() {
                    EOptionP::Interim(ep) => Some((state, ep)),
                    _ => None,
                })
                .collect()
        };
        let mut changed = false;
        for (state, ep) in settled {
            let resolved = self.kinds.get(ep.epk().kind())?.resolve(&ep);
            let observed = EOptionP::Interim(ep);
            let Some(update) = state.update_if_unchanged(&observed, resolved.clone().into())? else {
                continue;
            };
            debug!(epk = %resolved.epk(), value = ?resolved.p(), "Finalized interim value");
            self.stats.resolved_interim();
            self.after_update(&state, update);
            changed = true;
            if self.in_flight() {
                break;
            }
        }
        Ok(changed)
    }
}

impl<E: Entity> Default for PropertyStore<E> {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "computation panicked".to_owned()
    }
}
