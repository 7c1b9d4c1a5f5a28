//! What a computation hands back to the store.
//!
//! Computations never block on each other. A computation that needs a value
//! which is not final yet returns an [`InterimResult`] naming what it waits
//! for plus a continuation; the store resumes the continuation when one of
//! those dependees changes.

use std::fmt;
use std::sync::Arc;

use crate::eoption::{EOptionP, EPK, Entity, FinalEP, InterimEP};
use crate::property::{PropertyKind, PropertyMeta};
use crate::store::PropertyStore;

/// Runs a property computation for one entity.
pub type PropertyComputation<E> =
    Arc<dyn Fn(&PropertyStore<E>, &E) -> PropertyComputationResult<E> + Send + Sync>;

/// Resumes a suspended computation with the updated value of one dependee.
pub type OnUpdateContinuation<E> =
    Box<dyn FnOnce(&PropertyStore<E>, EOptionP<E>) -> PropertyComputationResult<E> + Send>;

/// Pure update of a collaboratively computed value; `None` means no change.
pub type PartialUpdate<E> = Box<dyn FnOnce(&EOptionP<E>) -> Option<InterimEP<E>> + Send>;

/// Wraps a closure as a [`PropertyComputation`].
pub fn computation<E, F>(f: F) -> PropertyComputation<E>
where
    E: Entity,
    F: Fn(&PropertyStore<E>, &E) -> PropertyComputationResult<E> + Send + Sync + 'static,
{
    Arc::new(f)
}

// ------------- InterimResult -------------
pub struct InterimResult<E> {
    pub ep: InterimEP<E>,
    pub dependees: Vec<EOptionP<E>>,
    pub continuation: OnUpdateContinuation<E>,
}

impl<E: Entity> InterimResult<E> {
    pub fn new(
        ep: InterimEP<E>,
        dependees: Vec<EOptionP<E>>,
        continuation: impl FnOnce(&PropertyStore<E>, EOptionP<E>) -> PropertyComputationResult<E>
        + Send
        + 'static,
    ) -> Self {
        Self {
            ep,
            dependees,
            continuation: Box::new(continuation),
        }
    }
}

// ------------- PartialResult -------------
pub struct PartialResult<E> {
    pub epk: EPK<E>,
    pub update: PartialUpdate<E>,
}

impl<E: Entity> PartialResult<E> {
    pub fn new(
        e: E,
        kind: PropertyKind,
        update: impl FnOnce(&EOptionP<E>) -> Option<InterimEP<E>> + Send + 'static,
    ) -> Self {
        Self {
            epk: EPK::new(e, kind),
            update: Box::new(update),
        }
    }
    pub fn of<P: PropertyMeta>(
        e: E,
        update: impl FnOnce(&EOptionP<E>) -> Option<InterimEP<E>> + Send + 'static,
    ) -> Self {
        Self::new(e, P::KIND, update)
    }
}

// ------------- InterimPartialResult -------------
/// Contributions to shared values plus a continuation owned by no EPK.
pub struct InterimPartialResult<E> {
    pub partials: Vec<PartialResult<E>>,
    pub dependees: Vec<EOptionP<E>>,
    pub continuation: OnUpdateContinuation<E>,
}

impl<E: Entity> InterimPartialResult<E> {
    pub fn new(
        partials: Vec<PartialResult<E>>,
        dependees: Vec<EOptionP<E>>,
        continuation: impl FnOnce(&PropertyStore<E>, EOptionP<E>) -> PropertyComputationResult<E>
        + Send
        + 'static,
    ) -> Self {
        Self {
            partials,
            dependees,
            continuation: Box::new(continuation),
        }
    }
}

// ------------- IncrementalResult -------------
/// A result plus follow-up computations, e.g. for walking a class hierarchy.
pub struct IncrementalResult<E> {
    pub result: Box<PropertyComputationResult<E>>,
    pub next: Vec<(PropertyComputation<E>, E)>,
}

impl<E: Entity> IncrementalResult<E> {
    pub fn new(result: PropertyComputationResult<E>, next: Vec<(PropertyComputation<E>, E)>) -> Self {
        Self {
            result: Box::new(result),
            next,
        }
    }
}

// ------------- PropertyComputationResult -------------
pub enum PropertyComputationResult<E> {
    NoResult,
    Result(FinalEP<E>),
    MultiResult(Vec<FinalEP<E>>),
    InterimResult(InterimResult<E>),
    PartialResult(PartialResult<E>),
    InterimPartialResult(InterimPartialResult<E>),
    IncrementalResult(IncrementalResult<E>),
    Results(Vec<PropertyComputationResult<E>>),
}

impl<E: Entity> PropertyComputationResult<E> {
    pub fn final_value<P: PropertyMeta>(e: E, p: P) -> Self {
        Self::Result(FinalEP::new(e, p))
    }
    pub fn interim(
        ep: InterimEP<E>,
        dependees: Vec<EOptionP<E>>,
        continuation: impl FnOnce(&PropertyStore<E>, EOptionP<E>) -> PropertyComputationResult<E>
        + Send
        + 'static,
    ) -> Self {
        Self::InterimResult(InterimResult::new(ep, dependees, continuation))
    }
    pub fn partial<P: PropertyMeta>(
        e: E,
        update: impl FnOnce(&EOptionP<E>) -> Option<InterimEP<E>> + Send + 'static,
    ) -> Self {
        Self::PartialResult(PartialResult::of::<P>(e, update))
    }
    pub fn id(&self) -> &'static str {
        match self {
            Self::NoResult => "NoResult",
            Self::Result(_) => "Result",
            Self::MultiResult(_) => "MultiResult",
            Self::InterimResult(_) => "InterimResult",
            Self::PartialResult(_) => "PartialResult",
            Self::InterimPartialResult(_) => "InterimPartialResult",
            Self::IncrementalResult(_) => "IncrementalResult",
            Self::Results(_) => "Results",
        }
    }
}

impl<E: Entity> fmt::Debug for PropertyComputationResult<E> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::NoResult => write!(f, "NoResult"),
            Self::Result(ep) => write!(f, "Result({})", EOptionP::Final(ep.clone())),
            Self::MultiResult(eps) => write!(f, "MultiResult({} values)", eps.len()),
            Self::InterimResult(r) => write!(
                f,
                "InterimResult({}, {} dependees)",
                EOptionP::Interim(r.ep.clone()),
                r.dependees.len()
            ),
            Self::PartialResult(r) => write!(f, "PartialResult({})", r.epk),
            Self::InterimPartialResult(r) => write!(
                f,
                "InterimPartialResult({} partials, {} dependees)",
                r.partials.len(),
                r.dependees.len()
            ),
            Self::IncrementalResult(r) => {
                write!(f, "IncrementalResult({:?}, {} next)", r.result, r.next.len())
            }
            Self::Results(rs) => write!(f, "Results({:?})", rs),
        }
    }
}
