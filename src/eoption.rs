//! Entity/property-kind pairs and what is currently known about them.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use crate::property::{PropertyKind, PropertyMeta, SomeProperty, same_value};

/// Anything properties can be attached to: methods, fields, classes,
/// allocation sites or the whole project. The store never looks inside.
pub trait Entity: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static {}
impl<T: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static> Entity for T {}

// ------------- EPK -------------
/// "The purity of method m": an entity together with a property kind.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct EPK<E> {
    e: E,
    kind: PropertyKind,
}

impl<E: Entity> EPK<E> {
    pub fn new(e: E, kind: PropertyKind) -> Self {
        Self { e, kind }
    }
    pub fn of<P: PropertyMeta>(e: E) -> Self {
        Self::new(e, P::KIND)
    }
    pub fn e(&self) -> &E {
        &self.e
    }
    pub fn kind(&self) -> PropertyKind {
        self.kind
    }
}
impl<E: fmt::Debug> fmt::Display for EPK<E> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "EPK({:?}, {})", self.e, self.kind)
    }
}

// ------------- InterimEP -------------
/// A refinable value, bounded from below and above.
#[derive(Clone, Debug)]
pub struct InterimEP<E> {
    epk: EPK<E>,
    lb: SomeProperty,
    ub: SomeProperty,
}

impl<E: Entity> InterimEP<E> {
    pub fn new<P: PropertyMeta>(e: E, lb: P, ub: P) -> Self {
        Self::from_parts(EPK::of::<P>(e), Arc::new(lb), Arc::new(ub))
    }
    /// Lower and upper bound are the same value.
    pub fn of_value<P: PropertyMeta + Clone>(e: E, p: P) -> Self {
        let p: SomeProperty = Arc::new(p);
        Self::from_parts(EPK::of::<P>(e), Arc::clone(&p), p)
    }
    pub fn from_parts(epk: EPK<E>, lb: SomeProperty, ub: SomeProperty) -> Self {
        Self { epk, lb, ub }
    }
    pub fn epk(&self) -> &EPK<E> {
        &self.epk
    }
    pub fn lb(&self) -> &SomeProperty {
        &self.lb
    }
    pub fn ub(&self) -> &SomeProperty {
        &self.ub
    }
}

// ------------- FinalEP -------------
/// A value that will never change again.
#[derive(Clone, Debug)]
pub struct FinalEP<E> {
    epk: EPK<E>,
    p: SomeProperty,
}

impl<E: Entity> FinalEP<E> {
    pub fn new<P: PropertyMeta>(e: E, p: P) -> Self {
        Self::from_parts(EPK::of::<P>(e), Arc::new(p))
    }
    pub fn from_parts(epk: EPK<E>, p: SomeProperty) -> Self {
        Self { epk, p }
    }
    pub fn epk(&self) -> &EPK<E> {
        &self.epk
    }
    pub fn p(&self) -> &SomeProperty {
        &self.p
    }
}

// ------------- EOptionP -------------
/// The observable state of an EPK: nothing yet, interim bounds, or final.
#[derive(Clone, Debug)]
pub enum EOptionP<E> {
    Epk(EPK<E>),
    Interim(InterimEP<E>),
    Final(FinalEP<E>),
}

impl<E: Entity> EOptionP<E> {
    pub fn epk(&self) -> &EPK<E> {
        match self {
            Self::Epk(epk) => epk,
            Self::Interim(ep) => ep.epk(),
            Self::Final(ep) => ep.epk(),
        }
    }
    pub fn e(&self) -> &E {
        self.epk().e()
    }
    pub fn kind(&self) -> PropertyKind {
        self.epk().kind()
    }
    pub fn is_epk(&self) -> bool {
        matches!(self, Self::Epk(_))
    }
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Final(_))
    }
    pub fn is_refinable(&self) -> bool {
        !self.is_final()
    }
    pub fn has_value(&self) -> bool {
        !self.is_epk()
    }
    // a final value is its own lower and upper bound
    pub fn lb(&self) -> Option<&SomeProperty> {
        match self {
            Self::Epk(_) => None,
            Self::Interim(ep) => Some(ep.lb()),
            Self::Final(ep) => Some(ep.p()),
        }
    }
    pub fn ub(&self) -> Option<&SomeProperty> {
        match self {
            Self::Epk(_) => None,
            Self::Interim(ep) => Some(ep.ub()),
            Self::Final(ep) => Some(ep.p()),
        }
    }
    pub fn lb_of<P: PropertyMeta>(&self) -> Option<&P> {
        self.lb().and_then(|p| p.downcast_ref::<P>())
    }
    pub fn ub_of<P: PropertyMeta>(&self) -> Option<&P> {
        self.ub().and_then(|p| p.downcast_ref::<P>())
    }
    pub fn final_of<P: PropertyMeta>(&self) -> Option<&P> {
        match self {
            Self::Final(ep) => ep.p().downcast_ref::<P>(),
            _ => None,
        }
    }
    /// True when `other` is exactly the state this one was read from. Values
    /// are compared by allocation, since an unchanged cell keeps its values.
    pub fn same_state_as(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Epk(_), Self::Epk(_)) => true,
            (Self::Interim(a), Self::Interim(b)) => {
                Arc::ptr_eq(a.lb(), b.lb()) && Arc::ptr_eq(a.ub(), b.ub())
            }
            (Self::Final(a), Self::Final(b)) => Arc::ptr_eq(a.p(), b.p()),
            _ => false,
        }
    }
    /// Value equality, used to suppress updates that change nothing.
    pub fn same_values_as(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Epk(_), Self::Epk(_)) => true,
            (Self::Interim(a), Self::Interim(b)) => {
                same_value(a.lb(), b.lb()) && same_value(a.ub(), b.ub())
            }
            (Self::Final(a), Self::Final(b)) => same_value(a.p(), b.p()),
            _ => false,
        }
    }
}

impl<E: Entity> From<InterimEP<E>> for EOptionP<E> {
    fn from(ep: InterimEP<E>) -> Self {
        Self::Interim(ep)
    }
}
impl<E: Entity> From<FinalEP<E>> for EOptionP<E> {
    fn from(ep: FinalEP<E>) -> Self {
        Self::Final(ep)
    }
}
impl<E: Entity> From<EPK<E>> for EOptionP<E> {
    fn from(epk: EPK<E>) -> Self {
        Self::Epk(epk)
    }
}

impl<E: Entity> fmt::Display for EOptionP<E> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Epk(epk) => write!(f, "{}", epk),
            Self::Interim(ep) => write!(
                f,
                "InterimEP({:?}, lb={:?}, ub={:?})",
                ep.epk().e(),
                ep.lb(),
                ep.ub()
            ),
            Self::Final(ep) => write!(f, "FinalEP({:?}, {:?})", ep.epk().e(), ep.p()),
        }
    }
}
