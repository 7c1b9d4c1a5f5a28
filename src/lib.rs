//! fpcf – a concurrent fixpoint solver for mutually dependent analysis properties.
//!
//! Static analyses (purity, immutability, escape information, call graphs)
//! describe their results as *properties* of *entities*: "method `m` is
//! pure", "the project instantiates `{A, B}`". Properties of one kind form a
//! lattice, and computing one property usually needs others that are not
//! known yet. The [`store::PropertyStore`] schedules those computations on a
//! worker pool, records who waits on whom, resumes waiting computations when
//! their dependees become more precise and, once nothing runs any more,
//! settles whatever is left through fallbacks and cycle resolution.
//!
//! * An [`eoption::EPK`] pairs an entity with a [`property::PropertyKind`].
//! * An [`eoption::EOptionP`] is what is currently known about an EPK:
//!   nothing, interim bounds, or a final value.
//! * A computation returns a [`result::PropertyComputationResult`]; a
//!   computation that has to wait returns an interim result plus a
//!   continuation instead of blocking.
//!
//! ## Modules
//! * [`property`] – The [`property::PropertyMeta`] trait implemented by property value types.
//! * [`eoption`] – EPKs and their interim or final values.
//! * [`result`] – Everything a computation can hand back.
//! * [`registry`] – Fallback and cycle resolution per kind, computations per phase.
//! * [`state`] – The per-EPK cells with their dependers and suspended continuations.
//! * [`arena`] – Stable integer ids for cells and collaborative continuations.
//! * [`cycles`] – Detection of closed cycles among suspended computations.
//! * [`scheduler`] – Work stealing task queue and quiescence detection.
//! * [`store`] – The [`store::PropertyStore`] itself.
//! * [`tracer`] – Observers of store events, e.g. the replayable [`tracer::EventLog`].
//! * [`config`] – [`config::StoreConfig`], read from a file and `FPCF_*` variables.
//!
//! ## Quick Start
//! ```
//! use fpcf::{PropertyComputationResult, PropertyKind, PropertyKindInfo, PropertyMeta, PropertyStore, StoreConfig};
//!
//! #[derive(Debug, Clone, Copy, PartialEq)]
//! struct Length(usize);
//! impl PropertyMeta for Length {
//!     const KIND: PropertyKind = PropertyKind::new(0, "Length");
//! }
//!
//! let store: PropertyStore<&'static str> = PropertyStore::new(StoreConfig::default().threads(2));
//! store.register_kind(PropertyKindInfo::with_fallback_value(Length(0))).unwrap();
//! store
//!     .register_lazy_property_computation(Length::KIND, |_, e| {
//!         PropertyComputationResult::final_value(*e, Length(e.len()))
//!     })
//!     .unwrap();
//! store.apply::<Length>(&"posit").unwrap();
//! store.wait_on_phase_completion().unwrap();
//! let eop = store.apply::<Length>(&"posit").unwrap();
//! assert_eq!(eop.final_of::<Length>(), Some(&Length(5)));
//! ```

pub mod arena;
pub mod config;
pub mod cycles;
pub mod eoption;
pub mod error;
pub mod property;
pub mod registry;
pub mod result;
pub mod scheduler;
pub mod state;
pub mod stats;
pub mod store;
pub mod tracer;

pub use crate::config::StoreConfig;
pub use crate::eoption::{EOptionP, EPK, Entity, FinalEP, InterimEP};
pub use crate::error::{Result, StoreError};
pub use crate::property::{CycleResolution, FallbackReason, Property, PropertyKind, PropertyMeta, SomeProperty};
pub use crate::registry::PropertyKindInfo;
pub use crate::result::{
    IncrementalResult, InterimPartialResult, InterimResult, OnUpdateContinuation, PartialResult,
    PropertyComputation, PropertyComputationResult, computation,
};
pub use crate::stats::Statistics;
pub use crate::store::PropertyStore;
pub use crate::tracer::{EventLog, LogTracer, PropertyStoreTracer, TraceEvent, TraceEventKind};
