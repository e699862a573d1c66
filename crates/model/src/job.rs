//! Job descriptor, lifecycle phases, and failure causes.

use fmr_common::{FmrError, JobId, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::plan::InputSplit;

/// Per-job option: run tasks in a separate worker process.
pub const OPT_EXTERNAL_EXECUTION: &str = "fmr.external_execution";
/// Per-job option: TTL for finished metadata, in milliseconds.
pub const OPT_FINISHED_JOB_INFO_TTL_MS: &str = "fmr.finished_job_info_ttl_ms";

/// User-provided job descriptor. Immutable after submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInfo {
    /// Input paths the job reads from.
    pub input_paths: Vec<String>,
    /// Output path the job commits results to.
    pub output_path: String,
    /// Number of reduce partitions.
    pub reducers: usize,
    /// Free-form configuration bag; recognised keys are the `fmr.*` option
    /// constants in this module.
    pub config: BTreeMap<String, String>,
}

impl JobInfo {
    /// Descriptor with the given paths and reducer count and no options.
    pub fn new(
        input_paths: Vec<String>,
        output_path: impl Into<String>,
        reducers: usize,
    ) -> Self {
        Self {
            input_paths,
            output_path: output_path.into(),
            reducers,
            config: BTreeMap::new(),
        }
    }

    /// Set a configuration option, builder style.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// Whether tasks of this job run in an external worker process.
    ///
    /// `default` is the node-level setting used when the job does not set
    /// [`OPT_EXTERNAL_EXECUTION`].
    pub fn external_execution(&self, default: bool) -> bool {
        self.bool_option(OPT_EXTERNAL_EXECUTION).unwrap_or(default)
    }

    /// Per-job override for how long finished metadata survives in the store.
    pub fn finished_job_info_ttl(&self) -> Option<Duration> {
        self.config
            .get(OPT_FINISHED_JOB_INFO_TTL_MS)
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_millis)
    }

    fn bool_option(&self, key: &str) -> Option<bool> {
        self.config.get(key).and_then(|v| v.parse::<bool>().ok())
    }
}

/// Coarse-grained job lifecycle state.
///
/// Legal transitions: `Setup → Map → Reduce → Complete`, any of
/// `Setup`/`Map`/`Reduce` → `Cancelling`, and `Cancelling → Complete`.
/// `Complete` is terminal. Combine has no phase of its own: it runs
/// per-node inside `Map`, between a node's last mapper and its
/// mapper-removal transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    /// Job accepted, metadata not yet schedulable.
    Setup,
    /// Mapper attempts are outstanding.
    Map,
    /// All splits mapped; reducer attempts are outstanding.
    Reduce,
    /// Failure or cancellation observed; pending sets are being drained.
    Cancelling,
    /// Terminal state; `fail_cause` distinguishes success from failure.
    Complete,
}

impl JobPhase {
    /// Whether the phase is terminal.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobPhase::Complete)
    }
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobPhase::Setup => "setup",
            JobPhase::Map => "map",
            JobPhase::Reduce => "reduce",
            JobPhase::Cancelling => "cancelling",
            JobPhase::Complete => "complete",
        };
        f.write_str(s)
    }
}

/// Why a job failed. Stored in replicated metadata, so kept as plain data
/// rather than an error type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailCause {
    /// Failure classification.
    pub kind: FailKind,
    /// Human-readable description.
    pub message: String,
}

/// Failure classification carried in [`FailCause`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailKind {
    /// A task attempt failed or crashed.
    Task,
    /// A node hosting part of the plan left the cluster.
    NodeLoss,
    /// Shuffle flush failed.
    Shuffle,
}

impl FailCause {
    /// Task failure cause.
    pub fn task(message: impl Into<String>) -> Self {
        Self {
            kind: FailKind::Task,
            message: message.into(),
        }
    }

    /// Node-loss cause.
    pub fn node_loss(message: impl Into<String>) -> Self {
        Self {
            kind: FailKind::NodeLoss,
            message: message.into(),
        }
    }

    /// Shuffle-flush cause.
    pub fn shuffle(message: impl Into<String>) -> Self {
        Self {
            kind: FailKind::Shuffle,
            message: message.into(),
        }
    }
}

impl fmt::Display for FailCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<FailCause> for FmrError {
    fn from(cause: FailCause) -> Self {
        match cause.kind {
            FailKind::Task => FmrError::TaskFailed(cause.message),
            FailKind::NodeLoss => FmrError::NodeLoss(cause.message),
            FailKind::Shuffle => FmrError::Shuffle(cause.message),
        }
    }
}

/// Runnable job handle materialised from a [`JobInfo`].
///
/// The tracker never invokes user map/reduce code itself; it only needs the
/// job's input splits and whether a combiner participates.
pub trait MapReduceJob: Send + Sync {
    /// Job id this handle was created for.
    fn id(&self) -> &JobId;

    /// Input splits to be mapped.
    fn input(&self) -> Result<Vec<InputSplit>>;

    /// Whether a per-node combine stage runs after the node's last mapper.
    fn has_combiner(&self) -> bool;
}

/// Materialises runnable [`MapReduceJob`] handles from job descriptors.
pub trait JobFactory: Send + Sync {
    /// Create a job handle for the given id and descriptor.
    fn create(&self, job_id: &JobId, info: &JobInfo) -> Result<Arc<dyn MapReduceJob>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_execution_option_overrides_default() {
        let info = JobInfo::new(vec!["in/a".into()], "out", 1)
            .with_option(OPT_EXTERNAL_EXECUTION, "true");
        assert!(info.external_execution(false));

        let plain = JobInfo::new(vec!["in/a".into()], "out", 1);
        assert!(!plain.external_execution(false));
        assert!(plain.external_execution(true));
    }

    #[test]
    fn ttl_option_parses_milliseconds() {
        let info = JobInfo::new(vec![], "out", 0).with_option(OPT_FINISHED_JOB_INFO_TTL_MS, "1500");
        assert_eq!(
            info.finished_job_info_ttl(),
            Some(std::time::Duration::from_millis(1500))
        );
        assert_eq!(JobInfo::new(vec![], "out", 0).finished_job_info_ttl(), None);
    }

    #[test]
    fn fail_cause_maps_to_error_kind() {
        let err: FmrError = FailCause::node_loss("node gone").into();
        assert_eq!(err, FmrError::NodeLoss("node gone".to_string()));
    }
}
