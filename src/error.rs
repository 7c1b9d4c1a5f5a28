use thiserror::Error;

/// Everything that can go wrong inside a [`crate::store::PropertyStore`].
///
/// Usage faults (an analysis violating the store's contract) and computation
/// faults (an analysis panicking) are both fatal for the running phase; the
/// first one is kept and handed to whoever waits on phase completion.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Final value of {epk} cannot be overwritten")]
    FinalValueOverwritten { epk: String },
    #[error("Non monotonic update of {epk}: {message}")]
    NonMonotonicUpdate { epk: String, message: String },
    #[error("Cannot add depender {depender} to final {epk}")]
    DependerOnFinal { epk: String, depender: String },
    #[error("Interim result for {epk} has no dependees (use a partial result instead)")]
    InterimResultWithoutDependees { epk: String },
    #[error("{epk} depends on itself")]
    SelfDependency { epk: String },
    #[error("{epk} declares the final value {dependee} as a dependee")]
    FinalDependee { epk: String, dependee: String },
    #[error("A lazy computation is already registered for {kind}")]
    LazyComputationAlreadyRegistered { kind: String },
    #[error("Partial result for {epk}, but {kind} is computed lazily")]
    PartialResultOnLazyKind { epk: String, kind: String },
    #[error("Unknown property kind: {0}")]
    UnknownPropertyKind(String),
    #[error("Property kind id {id} is already registered as {existing}")]
    DuplicatePropertyKind { id: u32, existing: String },
    #[error("Computation failed: {0}")]
    ComputationFailed(String),
    #[error("Property store has been shut down")]
    Shutdown,
    #[error("Internal invariant violated: {0}")]
    Invariant(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

// Helper conversions
impl From<config::ConfigError> for StoreError {
    fn from(e: config::ConfigError) -> Self { Self::Config(e.to_string()) }
}
