//! The replicated per-job metadata entity.

use fmr_common::{JobId, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::job::{FailCause, JobInfo, JobPhase};
use crate::plan::{InputSplit, MapReducePlan};

/// Replicated job state. Owned by the metadata store; local copies are
/// read-only value snapshots, evolved exclusively through
/// [`MetaTransform`](crate::MetaTransform) applications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMetadata {
    job_id: JobId,
    info: JobInfo,
    submitted_by: NodeId,
    plan: MapReducePlan,
    phase: JobPhase,
    pending_splits: BTreeSet<InputSplit>,
    pending_reducers: BTreeSet<usize>,
    external_execution: bool,
    fail_cause: Option<FailCause>,
}

impl JobMetadata {
    /// Initial metadata for a freshly planned job: phase `Map`, every split
    /// and every reducer index pending.
    pub fn new(
        job_id: JobId,
        info: JobInfo,
        submitted_by: NodeId,
        plan: MapReducePlan,
        external_execution: bool,
    ) -> Self {
        let pending_splits = plan.all_splits();
        let pending_reducers = (0..info.reducers).collect();
        Self {
            job_id,
            info,
            submitted_by,
            plan,
            phase: JobPhase::Map,
            pending_splits,
            pending_reducers,
            external_execution,
            fail_cause: None,
        }
    }

    /// Job id.
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// User-provided descriptor.
    pub fn info(&self) -> &JobInfo {
        &self.info
    }

    /// Node that submitted the job. Part of the update-leader candidate set
    /// even when it hosts no task.
    pub fn submitted_by(&self) -> &NodeId {
        &self.submitted_by
    }

    /// Placement plan.
    pub fn plan(&self) -> &MapReducePlan {
        &self.plan
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> JobPhase {
        self.phase
    }

    /// Splits not yet acknowledged as mapped.
    pub fn pending_splits(&self) -> &BTreeSet<InputSplit> {
        &self.pending_splits
    }

    /// Reducer indices not yet acknowledged as reduced.
    pub fn pending_reducers(&self) -> &BTreeSet<usize> {
        &self.pending_reducers
    }

    /// Whether tasks run in an external worker process.
    pub fn external_execution(&self) -> bool {
        self.external_execution
    }

    /// Failure cause, if the job failed. Monotonic: never cleared once set.
    pub fn fail_cause(&self) -> Option<&FailCause> {
        self.fail_cause.as_ref()
    }

    /// Deterministic attempt number of a mapper split.
    pub fn split_task_number(&self, split: &InputSplit) -> Option<usize> {
        self.plan.split_task_number(split)
    }

    /// Deterministic attempt number of a node's combine task.
    pub fn node_task_number(&self, node: &NodeId) -> Option<usize> {
        self.plan.node_task_number(node)
    }

    pub(crate) fn set_phase(&mut self, phase: JobPhase) {
        self.phase = phase;
    }

    pub(crate) fn pending_splits_mut(&mut self) -> &mut BTreeSet<InputSplit> {
        &mut self.pending_splits
    }

    pub(crate) fn pending_reducers_mut(&mut self) -> &mut BTreeSet<usize> {
        &mut self.pending_reducers
    }

    // Monotonic: the first recorded cause wins.
    pub(crate) fn record_fail_cause(&mut self, cause: FailCause) {
        if self.fail_cause.is_none() {
            self.fail_cause = Some(cause);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn initial_metadata_has_everything_pending() {
        let node = NodeId::new("node-a");
        let split = InputSplit::new("in/x", 0, 4);
        let mut mappers = BTreeMap::new();
        mappers.insert(node.clone(), [split.clone()].into());
        let mut reducers = BTreeMap::new();
        reducers.insert(node.clone(), vec![0, 1]);
        let plan = MapReducePlan::new(mappers, reducers);

        let meta = JobMetadata::new(
            JobId::new(node.clone(), 1),
            JobInfo::new(vec!["in/x".into()], "out", 2),
            node,
            plan,
            false,
        );

        assert_eq!(meta.phase(), JobPhase::Map);
        assert!(meta.pending_splits().contains(&split));
        assert_eq!(meta.pending_reducers().len(), 2);
        assert!(meta.fail_cause().is_none());
    }

    #[test]
    fn metadata_round_trips_through_json() {
        let node = NodeId::new("node-a");
        let mut mappers = BTreeMap::new();
        mappers.insert(node.clone(), [InputSplit::new("in/x", 0, 4)].into());
        let plan = MapReducePlan::new(mappers, BTreeMap::new());
        let meta = JobMetadata::new(
            JobId::new(node.clone(), 7),
            JobInfo::new(vec!["in/x".into()], "out", 0),
            node,
            plan,
            true,
        );

        let encoded = serde_json::to_vec(&meta).expect("encode");
        let decoded: JobMetadata = serde_json::from_slice(&encoded).expect("decode");
        assert_eq!(decoded, meta);
    }
}
