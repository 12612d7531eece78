//! Run configuration

use anyhow::{Result, ensure};

use crate::error::MissingPolicy;

/// Number of keys when none is configured
pub const DEFAULT_COUNT: u64 = 291_601;

/// Runtime configuration for one harvest run
#[derive(Clone, Debug)]
pub struct RunConfig {
    /// Keys `1..=count` are fetched
    pub count: u64,
    /// Worker pool size; 0 = available parallelism
    pub workers: usize,
    /// Handling of pages without the expected element
    pub on_missing: MissingPolicy,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            count: DEFAULT_COUNT,
            workers: 0,
            on_missing: MissingPolicy::Skip,
        }
    }
}

impl RunConfig {
    /// Reject configurations that cannot start a run
    pub fn validate(&self) -> Result<()> {
        ensure!(self.count > 0, "count must be positive (got {})", self.count);
        Ok(())
    }

    /// Pool size with 0 resolved to the number of CPUs
    pub fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
    }
}
