//! Replicated job-metadata store contract and in-process implementation.
//!
//! Architecture role:
//! - [`JobMetaStore`] is the tracker's only view of the replicated
//!   `JobId → JobMetadata` map: atomic read-modify-write through
//!   [`MetaTransform`](fmr_model::MetaTransform) values, continuous change
//!   notification, and TTL-based retirement of finished metadata
//! - [`StoreCluster`]/[`ReplicatedJobStore`] provide the in-process
//!   replicated implementation used by embedded deployments and tests
//!
//! Key modules:
//! - [`replicated`]

pub mod replicated;

use async_trait::async_trait;

use fmr_common::{JobId, Result};
use fmr_model::{JobMetadata, MetaTransform};
use std::time::Duration;

pub use replicated::{ReplicatedJobStore, StoreCluster};

/// One committed-change batch delivered to subscribers.
pub type ChangeBatch = Vec<(JobId, JobMetadata)>;

/// Change-notification callback.
///
/// Invoked for every committed change. Must not block and must not call
/// back into the store synchronously; hand the batch to a dispatcher.
pub type ChangeCallback = Box<dyn Fn(ChangeBatch) + Send + Sync>;

/// Replicated `JobId → JobMetadata` store contract.
///
/// The store guarantees serial transform application per key and delivers
/// every committed change to every subscriber on every node.
#[async_trait]
pub trait JobMetaStore: Send + Sync {
    /// Read the current metadata snapshot for a job.
    async fn get(&self, job_id: &JobId) -> Result<Option<JobMetadata>>;

    /// Create or replace a job's metadata.
    async fn put(&self, job_id: &JobId, meta: JobMetadata) -> Result<()>;

    /// Apply a transform and wait for it to commit.
    async fn transform(&self, job_id: &JobId, transform: MetaTransform) -> Result<()>;

    /// Apply a transform without waiting; failures are logged by the store.
    fn transform_async(&self, job_id: &JobId, transform: MetaTransform);

    /// Snapshot of every replica visible to this node. The metadata map is
    /// replicated, so this enumerates every live job.
    async fn values(&self) -> Vec<JobMetadata>;

    /// Retire the entry `ttl` after it reaches its terminal phase.
    async fn set_ttl(&self, job_id: &JobId, ttl: Duration) -> Result<()>;

    /// Register a committed-change subscriber.
    fn subscribe(&self, callback: ChangeCallback);
}
