//! Properties and their kinds.
//!
//! A property is an immutable value of exactly one [`PropertyKind`]. Values of
//! one kind are ordered by a domain specific lattice; the store only needs to
//! ask whether a new value is an acceptable successor of the previous one and
//! whether two values are equal.
//!
//! Client code implements [`PropertyMeta`] for its value types; the object
//! safe [`Property`] trait is derived from it so values of different kinds can
//! share one store as `Arc<dyn Property>`.

use std::fmt;
use std::sync::Arc;

use downcast_rs::{DowncastSync, impl_downcast};
use serde::Serialize;

// ------------- PropertyKind -------------
#[derive(Clone, Copy, Debug, Serialize)]
pub struct PropertyKind {
    id: u32,
    name: &'static str,
}

impl PropertyKind {
    pub const fn new(id: u32, name: &'static str) -> Self {
        Self { id, name }
    }
    pub fn id(&self) -> u32 {
        self.id
    }
    pub fn name(&self) -> &'static str {
        self.name
    }
}
// the id alone identifies a kind, names are for humans
impl PartialEq for PropertyKind {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for PropertyKind {}
impl std::hash::Hash for PropertyKind {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

// ------------- Property -------------
/// Static side of a property type, implemented downstream.
///
/// ```
/// use fpcf::property::{PropertyKind, PropertyMeta};
///
/// #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
/// enum Purity { Pure, SideEffectFree, Impure }
///
/// impl PropertyMeta for Purity {
///     const KIND: PropertyKind = PropertyKind::new(1, "Purity");
///     // refinement only ever moves towards Pure
///     fn is_valid_successor_of(&self, previous: &Self) -> Result<(), String> {
///         if self <= previous { Ok(()) } else { Err(format!("{self:?} after {previous:?}")) }
///     }
/// }
/// ```
pub trait PropertyMeta: fmt::Debug + PartialEq + Send + Sync + 'static {
    const KIND: PropertyKind;
    fn is_valid_successor_of(&self, _previous: &Self) -> Result<(), String> {
        Ok(())
    }
}

/// Dynamic side of a property, blanket implemented for every [`PropertyMeta`].
pub trait Property: DowncastSync + fmt::Debug {
    fn kind(&self) -> PropertyKind;
    fn dyn_eq(&self, other: &dyn Property) -> bool;
    fn dyn_is_valid_successor_of(&self, previous: &dyn Property) -> Result<(), String>;
}
impl_downcast!(sync Property);

impl<P: PropertyMeta> Property for P {
    fn kind(&self) -> PropertyKind {
        P::KIND
    }
    fn dyn_eq(&self, other: &dyn Property) -> bool {
        other.downcast_ref::<P>().is_some_and(|other| self == other)
    }
    fn dyn_is_valid_successor_of(&self, previous: &dyn Property) -> Result<(), String> {
        match previous.downcast_ref::<P>() {
            Some(previous) => self.is_valid_successor_of(previous),
            None => Err(format!(
                "{:?} cannot succeed a value of kind {}",
                self,
                previous.kind()
            )),
        }
    }
}

pub type SomeProperty = Arc<dyn Property>;

/// Compares two shared values, cheaply when they are the same allocation.
pub fn same_value(a: &SomeProperty, b: &SomeProperty) -> bool {
    Arc::ptr_eq(a, b) || a.dyn_eq(b.as_ref())
}

// ------------- Fallback -------------
/// Why a property had to be answered by the fallback of its kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum FallbackReason {
    /// No analysis computes the kind in the current phase.
    PropertyIsNotComputedByAnyAnalysis,
    /// The kind is computed, but no computation derived a value for the entity.
    PropertyIsNotDerivedByPreviouslyExecutedAnalysis,
}

// ------------- Cycle resolution -------------
/// How an interim value that can no longer change is turned into a final one.
///
/// Used for closed cycles of mutually waiting computations and for
/// collaboratively computed values once the phase is quiescent.
#[derive(Clone, Default)]
pub enum CycleResolution {
    #[default]
    LowerBound,
    UpperBound,
    Custom(Arc<dyn Fn(&SomeProperty, &SomeProperty) -> SomeProperty + Send + Sync>),
}

impl CycleResolution {
    /// Builds a custom strategy working on the typed bounds of one kind.
    pub fn custom<P: PropertyMeta>(resolve: impl Fn(&P, &P) -> P + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(move |lb, ub| {
            match (lb.downcast_ref::<P>(), ub.downcast_ref::<P>()) {
                (Some(lb), Some(ub)) => Arc::new(resolve(lb, ub)) as SomeProperty,
                // not of this kind, keep the sound bound
                _ => Arc::clone(lb),
            }
        }))
    }
    pub fn resolve(&self, lb: &SomeProperty, ub: &SomeProperty) -> SomeProperty {
        match self {
            Self::LowerBound => Arc::clone(lb),
            Self::UpperBound => Arc::clone(ub),
            Self::Custom(resolve) => resolve(lb, ub),
        }
    }
}

impl fmt::Debug for CycleResolution {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::LowerBound => write!(f, "LowerBound"),
            Self::UpperBound => write!(f, "UpperBound"),
            Self::Custom(_) => write!(f, "Custom"),
        }
    }
}
