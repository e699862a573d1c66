//! Seams to the tracker's external collaborators.
//!
//! The tracker owns none of these: task execution, shuffle, and membership
//! are cluster services; the tracker only consumes their contracts.

use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use fmr_common::{JobId, NodeId, Result};
use fmr_model::{JobMetadata, MapReduceJob, TaskInfo};

/// Local task executor contract.
///
/// Two instances exist per node, internal and external; the tracker selects
/// by the job's execution mode, except commit/abort which always run
/// internally. Completions flow back through
/// [`JobTracker::on_task_finished`](crate::JobTracker::on_task_finished).
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Enqueue a batch of task attempts for the given job.
    async fn run(&self, job: Arc<dyn MapReduceJob>, tasks: Vec<TaskInfo>);

    /// Cancel every attempt of the job still running locally. Idempotent;
    /// cancelled attempts still report their completion.
    async fn cancel_tasks(&self, job_id: &JobId);

    /// Informational hook invoked on every metadata change of an
    /// externally executed job.
    async fn on_job_state_changed(&self, job_id: &JobId, meta: &JobMetadata) {
        let _ = (job_id, meta);
    }
}

/// Shuffle subsystem contract.
#[async_trait]
pub trait ShuffleService: Send + Sync {
    /// Drain this node's buffered map output for the job to its consumers.
    async fn flush(&self, job_id: &JobId) -> Result<()>;

    /// One-shot local notification that the job reached its terminal phase.
    fn job_finished(&self, job_id: &JobId);
}

/// Discovery event kinds the tracker reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryEventKind {
    /// A node left the cluster gracefully.
    NodeLeft,
    /// A node was declared failed.
    NodeFailed,
}

/// A membership change reported by the discovery subsystem.
#[derive(Debug, Clone)]
pub struct DiscoveryEvent {
    /// What happened.
    pub kind: DiscoveryEventKind,
    /// The departed node.
    pub node: NodeId,
    /// The surviving member set at the time of the event.
    pub live: BTreeSet<NodeId>,
}

/// This node's view of cluster membership.
///
/// Updated from discovery events on the dispatcher thread, read by planning
/// and update-leader election.
#[derive(Debug)]
pub struct ClusterTopology {
    local: NodeId,
    live: RwLock<BTreeSet<NodeId>>,
}

impl ClusterTopology {
    /// Topology with the given local node and initial member set.
    pub fn new(local: NodeId, live: BTreeSet<NodeId>) -> Self {
        Self {
            local,
            live: RwLock::new(live),
        }
    }

    /// The local node id.
    pub fn local(&self) -> &NodeId {
        &self.local
    }

    /// Snapshot of the live member set.
    pub fn live_nodes(&self) -> BTreeSet<NodeId> {
        self.live.read().expect("topology lock").clone()
    }

    /// Whether the node is currently a live member.
    pub fn is_live(&self, node: &NodeId) -> bool {
        self.live.read().expect("topology lock").contains(node)
    }

    pub(crate) fn set_live(&self, live: BTreeSet<NodeId>) {
        *self.live.write().expect("topology lock") = live;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topology_tracks_membership_updates() {
        let a = NodeId::new("node-a");
        let b = NodeId::new("node-b");
        let topology = ClusterTopology::new(a.clone(), [a.clone(), b.clone()].into());
        assert!(topology.is_live(&b));

        topology.set_live([a.clone()].into());
        assert!(!topology.is_live(&b));
        assert_eq!(topology.live_nodes(), [a].into());
    }
}
