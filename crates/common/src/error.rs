use thiserror::Error;

/// Canonical fmr error taxonomy used across crates.
///
/// Classification guidance:
/// - [`FmrError::Stopping`]: tracker is shutting down; no new work is admitted
/// - [`FmrError::Planning`]: planner/job-factory failures before metadata enters the store
/// - [`FmrError::TaskFailed`]: a map/combine/reduce attempt reported failure or crash
/// - [`FmrError::NodeLoss`]: a node hosting part of the plan left the topology
/// - [`FmrError::Shuffle`]: shuffle flush failure surfaced through the completion path
/// - [`FmrError::Store`]: replicated-store read/write failures
///
/// Every variant carries a `String` payload so errors stay `Clone`:
/// completion handles fan one terminal result out to many waiters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FmrError {
    /// Tracker shutdown is in progress or finished.
    ///
    /// Returned synchronously by public entry points and used to complete
    /// outstanding job futures when the tracker stops.
    #[error("tracker is stopping: {0}")]
    Stopping(String),

    /// Planner or job-factory failure during submission.
    ///
    /// The job never reaches the replicated store.
    ///
    /// Examples:
    /// - no live nodes to place splits on
    /// - job factory cannot materialise a runnable job from the descriptor
    /// - input enumeration produced no readable splits
    #[error("planning error: {0}")]
    Planning(String),

    /// Invalid or inconsistent configuration/option values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A task attempt failed or crashed; carried into the job's fail cause.
    ///
    /// Examples:
    /// - user map/reduce code raised an error
    /// - a task attempt process crashed mid-split
    /// - an in-flight attempt was cancelled and reported as failed
    #[error("task failed: {0}")]
    TaskFailed(String),

    /// One or more nodes hosting parts of the plan left the cluster.
    ///
    /// Examples:
    /// - a mapper node departed with splits still pending
    /// - a reducer node was declared failed before its partitions ran
    #[error("node failure: {0}")]
    NodeLoss(String),

    /// Shuffle flush failed while draining a node's map output.
    ///
    /// Examples:
    /// - local shuffle spill directory out of space
    /// - a flush consumer went away before acknowledging the output
    #[error("shuffle flush failed: {0}")]
    Shuffle(String),

    /// Replicated-store operation failed.
    #[error("store error: {0}")]
    Store(String),

    /// No metadata exists for the requested job.
    #[error("job not found: {0}")]
    NotFound(String),

    /// A completion future is already registered for this job id.
    #[error("job already submitted: {0}")]
    AlreadySubmitted(String),
}

/// Standard fmr result alias.
pub type Result<T> = std::result::Result<T, FmrError>;
