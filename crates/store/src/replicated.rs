//! In-process replicated store.
//!
//! Contract:
//! - one [`StoreCluster`] models the replicated cache: every
//!   [`ReplicatedJobStore`] handle attached to it sees every entry and every
//!   committed change;
//! - transforms apply serially per key under the commit lock;
//! - subscribers are notified in commit order; callbacks must enqueue and
//!   return (they run under the commit lock and must not call back into the
//!   store);
//! - `set_ttl` arms eviction that fires once the entry is terminal.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use fmr_common::metrics::global_metrics;
use fmr_common::{FmrError, JobId, NodeId, Result};
use fmr_model::{JobMetadata, MetaTransform};
use tracing::debug;

use crate::{ChangeCallback, JobMetaStore};

#[derive(Debug)]
struct StoredEntry {
    meta: JobMetadata,
    ttl: Option<Duration>,
    eviction_armed: bool,
}

#[derive(Default)]
struct StoreState {
    entries: BTreeMap<JobId, StoredEntry>,
    subscribers: Vec<ChangeCallback>,
}

/// The shared replicated cache behind every node's store handle.
#[derive(Clone, Default)]
pub struct StoreCluster {
    state: Arc<Mutex<StoreState>>,
}

impl StoreCluster {
    /// Create an empty cluster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a node handle to the cluster.
    pub fn node_store(&self, node: NodeId) -> ReplicatedJobStore {
        ReplicatedJobStore {
            node,
            state: Arc::clone(&self.state),
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.state.lock().expect("store lock").entries.len()
    }

    /// Whether the cluster holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One node's handle onto the replicated metadata map.
#[derive(Clone)]
pub struct ReplicatedJobStore {
    node: NodeId,
    state: Arc<Mutex<StoreState>>,
}

impl ReplicatedJobStore {
    // Commits a new snapshot: updates the entry, arms eviction for terminal
    // entries with a TTL, and fans the change out to every subscriber. Runs
    // under the commit lock so subscribers observe changes in commit order.
    fn commit(&self, state: &mut StoreState, job_id: &JobId, meta: JobMetadata) {
        let entry = state.entries.entry(job_id.clone()).or_insert(StoredEntry {
            meta: meta.clone(),
            ttl: None,
            eviction_armed: false,
        });
        entry.meta = meta.clone();
        if entry.meta.phase().is_terminal() && !entry.eviction_armed {
            if let Some(ttl) = entry.ttl {
                entry.eviction_armed = true;
                self.spawn_eviction(job_id.clone(), ttl);
            }
        }
        for subscriber in &state.subscribers {
            subscriber(vec![(job_id.clone(), meta.clone())]);
        }
    }

    fn spawn_eviction(&self, job_id: JobId, ttl: Duration) {
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            let mut state = state.lock().expect("store lock");
            let terminal = state
                .entries
                .get(&job_id)
                .map(|e| e.meta.phase().is_terminal())
                .unwrap_or(false);
            if terminal {
                state.entries.remove(&job_id);
                debug!(job_id = %job_id, operator = "StoreEvict", "evicted finished job metadata");
            }
        });
    }

    fn apply_locked(&self, job_id: &JobId, transform: &MetaTransform) {
        let mut state = self.state.lock().expect("store lock");
        let Some(entry) = state.entries.get(job_id) else {
            // Benign: the entry was evicted between scheduling and apply.
            debug!(
                job_id = %job_id,
                node = %self.node,
                kind = transform.kind(),
                operator = "StoreTransform",
                "dropping transform for unknown entry"
            );
            return;
        };
        let next = transform.apply(&entry.meta);
        global_metrics().inc_transforms_applied(transform.kind());
        self.commit(&mut state, job_id, next);
    }
}

#[async_trait]
impl JobMetaStore for ReplicatedJobStore {
    async fn get(&self, job_id: &JobId) -> Result<Option<JobMetadata>> {
        let state = self.state.lock().expect("store lock");
        Ok(state.entries.get(job_id).map(|e| e.meta.clone()))
    }

    async fn put(&self, job_id: &JobId, meta: JobMetadata) -> Result<()> {
        let mut state = self.state.lock().expect("store lock");
        self.commit(&mut state, job_id, meta);
        Ok(())
    }

    async fn transform(&self, job_id: &JobId, transform: MetaTransform) -> Result<()> {
        self.apply_locked(job_id, &transform);
        Ok(())
    }

    fn transform_async(&self, job_id: &JobId, transform: MetaTransform) {
        self.apply_locked(job_id, &transform);
    }

    async fn values(&self) -> Vec<JobMetadata> {
        let state = self.state.lock().expect("store lock");
        state.entries.values().map(|e| e.meta.clone()).collect()
    }

    async fn set_ttl(&self, job_id: &JobId, ttl: Duration) -> Result<()> {
        let mut state = self.state.lock().expect("store lock");
        match state.entries.get_mut(job_id) {
            Some(entry) => {
                entry.ttl = Some(ttl);
                // Covers a TTL applied after the terminal transform already
                // committed.
                if entry.meta.phase().is_terminal() && !entry.eviction_armed {
                    entry.eviction_armed = true;
                    self.spawn_eviction(job_id.clone(), ttl);
                }
                Ok(())
            }
            None => Err(FmrError::Store(format!(
                "cannot set ttl for unknown job {job_id}"
            ))),
        }
    }

    fn subscribe(&self, callback: ChangeCallback) {
        let mut state = self.state.lock().expect("store lock");
        state.subscribers.push(callback);
    }
}
