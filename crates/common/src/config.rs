use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Node-level tracker configuration shared by every job that does not
/// override the matching per-job option.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// How long finished job metadata survives in the replicated store
    /// before eviction, in milliseconds. Per-job
    /// `fmr.finished_job_info_ttl_ms` takes precedence.
    #[serde(default = "default_finished_job_info_ttl_ms")]
    pub finished_job_info_ttl_ms: u64,
    /// Default for running tasks in a separate worker process rather than
    /// in-tracker. Per-job `fmr.external_execution` takes precedence.
    #[serde(default)]
    pub external_execution: bool,
}

fn default_finished_job_info_ttl_ms() -> u64 {
    30_000
}

impl TrackerConfig {
    /// Finished-metadata TTL as a [`Duration`].
    pub fn finished_job_info_ttl(&self) -> Duration {
        Duration::from_millis(self.finished_job_info_ttl_ms)
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            finished_job_info_ttl_ms: default_finished_job_info_ttl_ms(),
            external_execution: false,
        }
    }
}
