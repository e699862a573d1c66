//! Metadata transform closures.
//!
//! Contract:
//! - a transform is a pure value `JobMetadata → JobMetadata`, applied by the
//!   store under an exclusive per-entry lock;
//! - transforms never read outside their input and never fail;
//! - applying the same transform twice leaves the metadata as after one
//!   application;
//! - `fail_cause` is monotonic: a transform only records a cause when none
//!   is set yet.
//!
//! Represented as a tagged enum rather than boxed closures so a distributed
//! store can ship transforms between nodes as plain data.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::job::{FailCause, JobPhase};
use crate::metadata::JobMetadata;
use crate::plan::InputSplit;

/// One serialisable metadata transform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tag", rename_all = "snake_case")]
pub enum MetaTransform {
    /// Set the job phase.
    UpdatePhase {
        /// Phase to set.
        phase: JobPhase,
    },
    /// Acknowledge mapped (or failed) splits.
    RemoveMappers {
        /// Splits to remove from the pending set.
        splits: BTreeSet<InputSplit>,
        /// Failure that ends the job, if the removal reports one.
        err: Option<FailCause>,
    },
    /// Acknowledge one reduced (or failed) partition.
    RemoveReducer {
        /// Reducer index to remove from the pending set.
        reducer: usize,
        /// Failure that ends the job, if the removal reports one.
        err: Option<FailCause>,
    },
    /// Strip splits and reducers that will never run and drive the job
    /// towards `Complete`.
    CancelJob {
        /// Splits to remove from the pending set.
        splits: BTreeSet<InputSplit>,
        /// Reducer indices to remove from the pending set.
        reducers: BTreeSet<usize>,
        /// Failure cause when cancellation is failure-initiated.
        err: Option<FailCause>,
    },
}

impl MetaTransform {
    /// Remove a single mapped split.
    pub fn remove_mapper(split: InputSplit, err: Option<FailCause>) -> Self {
        MetaTransform::RemoveMappers {
            splits: BTreeSet::from([split]),
            err,
        }
    }

    /// Stable kind label used for logging and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            MetaTransform::UpdatePhase { .. } => "update_phase",
            MetaTransform::RemoveMappers { .. } => "remove_mappers",
            MetaTransform::RemoveReducer { .. } => "remove_reducer",
            MetaTransform::CancelJob { .. } => "cancel_job",
        }
    }

    /// Apply the transform, producing the next metadata snapshot.
    pub fn apply(&self, meta: &JobMetadata) -> JobMetadata {
        let mut next = meta.clone();
        match self {
            MetaTransform::UpdatePhase { phase } => {
                next.set_phase(*phase);
            }
            MetaTransform::RemoveMappers { splits, err } => {
                for split in splits {
                    next.pending_splits_mut().remove(split);
                }
                if let Some(cause) = err {
                    next.record_fail_cause(cause.clone());
                    next.set_phase(JobPhase::Cancelling);
                }
                // Promote only out of Map: a late duplicate removal must not
                // drag a cancelling or terminal job back into Reduce.
                if next.pending_splits().is_empty() && next.phase() == JobPhase::Map {
                    next.set_phase(JobPhase::Reduce);
                }
            }
            MetaTransform::RemoveReducer { reducer, err } => {
                next.pending_reducers_mut().remove(reducer);
                if let Some(cause) = err {
                    next.record_fail_cause(cause.clone());
                    next.set_phase(JobPhase::Cancelling);
                }
            }
            MetaTransform::CancelJob {
                splits,
                reducers,
                err,
            } => {
                debug_assert!(
                    meta.phase() == JobPhase::Cancelling || err.is_some(),
                    "cancel without cause outside cancelling phase: {:?}",
                    meta.phase()
                );
                for split in splits {
                    next.pending_splits_mut().remove(split);
                }
                for reducer in reducers {
                    next.pending_reducers_mut().remove(reducer);
                }
                if let Some(cause) = err {
                    next.record_fail_cause(cause.clone());
                }
                next.set_phase(JobPhase::Cancelling);
                if next.pending_splits().is_empty() && next.pending_reducers().is_empty() {
                    next.set_phase(JobPhase::Complete);
                }
            }
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobInfo;
    use crate::plan::MapReducePlan;
    use fmr_common::{JobId, NodeId};
    use std::collections::BTreeMap;

    fn meta_with(splits: Vec<InputSplit>, reducers: usize) -> JobMetadata {
        let node = NodeId::new("node-a");
        let mut mappers = BTreeMap::new();
        mappers.insert(node.clone(), splits.into_iter().collect());
        let mut reducer_map = BTreeMap::new();
        if reducers > 0 {
            reducer_map.insert(node.clone(), (0..reducers).collect());
        }
        let plan = MapReducePlan::new(mappers, reducer_map);
        JobMetadata::new(
            JobId::new(node.clone(), 1),
            JobInfo::new(vec!["in".into()], "out", reducers),
            node,
            plan,
            false,
        )
    }

    fn split(n: u64) -> InputSplit {
        InputSplit::new("in/data", n * 10, 10)
    }

    #[test]
    fn removing_last_split_moves_map_to_reduce() {
        let meta = meta_with(vec![split(0), split(1)], 1);
        let mid = MetaTransform::remove_mapper(split(0), None).apply(&meta);
        assert_eq!(mid.phase(), JobPhase::Map);
        let done = MetaTransform::remove_mapper(split(1), None).apply(&mid);
        assert_eq!(done.phase(), JobPhase::Reduce);
        assert!(done.pending_splits().is_empty());
    }

    #[test]
    fn remove_mappers_with_error_cancels_and_records_cause() {
        let meta = meta_with(vec![split(0), split(1)], 1);
        let next =
            MetaTransform::remove_mapper(split(0), Some(FailCause::task("boom"))).apply(&meta);
        assert_eq!(next.phase(), JobPhase::Cancelling);
        assert_eq!(next.fail_cause().map(|c| c.message.as_str()), Some("boom"));
    }

    #[test]
    fn fail_cause_is_monotonic() {
        let meta = meta_with(vec![split(0), split(1)], 0);
        let first =
            MetaTransform::remove_mapper(split(0), Some(FailCause::task("first"))).apply(&meta);
        let second =
            MetaTransform::remove_mapper(split(1), Some(FailCause::task("second"))).apply(&first);
        assert_eq!(
            second.fail_cause().map(|c| c.message.as_str()),
            Some("first")
        );
        assert_eq!(second.phase(), JobPhase::Cancelling);
    }

    #[test]
    fn transforms_are_idempotent() {
        let meta = meta_with(vec![split(0), split(1)], 2);
        let cases = vec![
            MetaTransform::UpdatePhase {
                phase: JobPhase::Reduce,
            },
            MetaTransform::remove_mapper(split(0), None),
            MetaTransform::RemoveReducer {
                reducer: 1,
                err: None,
            },
            MetaTransform::CancelJob {
                splits: BTreeSet::from([split(0)]),
                reducers: BTreeSet::from([0]),
                err: Some(FailCause::node_loss("gone")),
            },
        ];
        for transform in cases {
            let once = transform.apply(&meta);
            let twice = transform.apply(&once);
            assert_eq!(once, twice, "{} not idempotent", transform.kind());
        }
    }

    #[test]
    fn remove_reducer_on_empty_pending_set_is_a_noop() {
        let meta = meta_with(vec![split(0)], 0);
        let next = MetaTransform::RemoveReducer {
            reducer: 5,
            err: None,
        }
        .apply(&meta);
        assert_eq!(next, meta);
    }

    #[test]
    fn cancel_emptying_both_sets_completes_the_job() {
        let meta = meta_with(vec![split(0)], 1);
        let next = MetaTransform::CancelJob {
            splits: BTreeSet::from([split(0)]),
            reducers: BTreeSet::from([0]),
            err: Some(FailCause::node_loss("node lost")),
        }
        .apply(&meta);
        assert_eq!(next.phase(), JobPhase::Complete);
        assert!(next.fail_cause().is_some());
    }

    #[test]
    fn late_removal_does_not_regress_a_terminal_job() {
        let meta = meta_with(vec![split(0)], 1);
        let cancelled = MetaTransform::CancelJob {
            splits: BTreeSet::from([split(0)]),
            reducers: BTreeSet::from([0]),
            err: Some(FailCause::task("boom")),
        }
        .apply(&meta);
        assert_eq!(cancelled.phase(), JobPhase::Complete);
        let late = MetaTransform::remove_mapper(split(0), None).apply(&cancelled);
        assert_eq!(late.phase(), JobPhase::Complete);
    }

    #[test]
    fn transforms_round_trip_through_json() {
        let transform = MetaTransform::CancelJob {
            splits: BTreeSet::from([split(1)]),
            reducers: BTreeSet::from([0, 2]),
            err: Some(FailCause::node_loss("one or more nodes failed")),
        };
        let encoded = serde_json::to_string(&transform).expect("encode");
        assert!(encoded.contains("\"tag\":\"cancel_job\""));
        let decoded: MetaTransform = serde_json::from_str(&encoded).expect("decode");
        assert_eq!(decoded, transform);
    }
}
