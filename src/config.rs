//! Store configuration.
//!
//! Settings come from an optional file (any format the `config` crate knows,
//! usually `fpcf.toml`) and are then overridden by `FPCF_*` environment
//! variables, e.g. `FPCF_THREADS=4` or `FPCF_DEBUG=true`.

use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Worker threads; 0 uses one per available core.
    pub threads: usize,
    /// Validate refinements and reject self and final dependencies.
    pub debug: bool,
    /// Log every store event through `tracing`.
    pub trace: bool,
    /// How long an idle worker sleeps before looking for work again.
    pub idle_wait_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            debug: cfg!(debug_assertions),
            trace: false,
            idle_wait_ms: 10,
        }
    }
}

impl StoreConfig {
    /// Reads `path` (when given and present) and the environment.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path).required(false));
        }
        let settings = builder
            .add_source(Environment::with_prefix("FPCF"))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
    pub fn trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }
    pub fn worker_threads(&self) -> usize {
        if self.threads == 0 {
            num_cpus::get().max(1)
        } else {
            self.threads
        }
    }
    pub fn idle_wait(&self) -> Duration {
        Duration::from_millis(self.idle_wait_ms.max(1))
    }
}
