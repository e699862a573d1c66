//! Input splits and the immutable map-reduce placement plan.
//!
//! Contract:
//! - the plan is fixed for the life of the job;
//! - every node reads only its own slice (`mappers_for`/`reducers_for`);
//! - task numbering is a pure function of the plan, so every node labels
//!   the same attempt with the same number.

use fmr_common::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Opaque identity of one slice of input data processed by a single mapper.
///
/// Carries enough for a task executor to read the data; the tracker treats
/// it purely as an ordered, hashable set element.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InputSplit {
    /// Source path the split reads from.
    pub path: String,
    /// Byte offset of the split within the source.
    pub offset: u64,
    /// Split length in bytes.
    pub len: u64,
    /// Nodes holding the data locally, preferred by the planner.
    pub hosts: Vec<NodeId>,
}

impl InputSplit {
    /// Split covering `[offset, offset + len)` of `path` with no locality hint.
    pub fn new(path: impl Into<String>, offset: u64, len: u64) -> Self {
        Self {
            path: path.into(),
            offset,
            len,
            hosts: Vec::new(),
        }
    }

    /// Attach preferred hosts, builder style.
    pub fn with_hosts(mut self, hosts: Vec<NodeId>) -> Self {
        self.hosts = hosts;
        self
    }
}

impl fmt::Display for InputSplit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}+{}", self.path, self.offset, self.len)
    }
}

/// Immutable placement of mapper splits and reducer indices onto nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapReducePlan {
    mappers: BTreeMap<NodeId, BTreeSet<InputSplit>>,
    reducers: BTreeMap<NodeId, Vec<usize>>,
}

impl MapReducePlan {
    /// Build a plan from explicit assignments. Empty per-node entries are
    /// dropped so `participants` only lists nodes with actual work.
    pub fn new(
        mappers: BTreeMap<NodeId, BTreeSet<InputSplit>>,
        reducers: BTreeMap<NodeId, Vec<usize>>,
    ) -> Self {
        Self {
            mappers: mappers.into_iter().filter(|(_, s)| !s.is_empty()).collect(),
            reducers: reducers.into_iter().filter(|(_, r)| !r.is_empty()).collect(),
        }
    }

    /// Splits this node must map, if any.
    pub fn mappers_for(&self, node: &NodeId) -> Option<&BTreeSet<InputSplit>> {
        self.mappers.get(node)
    }

    /// Reducer indices this node must run, if any.
    pub fn reducers_for(&self, node: &NodeId) -> Option<&[usize]> {
        self.reducers.get(node).map(Vec::as_slice)
    }

    /// Nodes hosting at least one mapper.
    pub fn mapper_nodes(&self) -> impl Iterator<Item = &NodeId> {
        self.mappers.keys()
    }

    /// Nodes hosting at least one reducer.
    pub fn reducer_nodes(&self) -> impl Iterator<Item = &NodeId> {
        self.reducers.keys()
    }

    /// Every node that appears in the plan.
    pub fn participants(&self) -> BTreeSet<NodeId> {
        self.mappers
            .keys()
            .chain(self.reducers.keys())
            .cloned()
            .collect()
    }

    /// Union of all splits across all mapper nodes.
    pub fn all_splits(&self) -> BTreeSet<InputSplit> {
        self.mappers.values().flatten().cloned().collect()
    }

    /// Total number of reducer indices in the plan.
    pub fn reducer_count(&self) -> usize {
        self.reducers.values().map(Vec::len).sum()
    }

    /// Deterministic attempt number of a mapper split: its rank in the
    /// ordered union of all splits.
    pub fn split_task_number(&self, split: &InputSplit) -> Option<usize> {
        self.all_splits().iter().position(|s| s == split)
    }

    /// Deterministic attempt number for a node's combine task: the node's
    /// rank among mapper nodes, offset past every split number so map and
    /// combine labels never collide.
    pub fn node_task_number(&self, node: &NodeId) -> Option<usize> {
        let splits = self.all_splits().len();
        self.mappers.keys().position(|n| n == node).map(|i| splits + i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_node_plan() -> MapReducePlan {
        let a = NodeId::new("node-a");
        let b = NodeId::new("node-b");
        let mut mappers = BTreeMap::new();
        mappers.insert(
            a.clone(),
            [InputSplit::new("in/x", 0, 10), InputSplit::new("in/x", 10, 10)].into(),
        );
        mappers.insert(b.clone(), [InputSplit::new("in/y", 0, 5)].into());
        let mut reducers = BTreeMap::new();
        reducers.insert(a, vec![0]);
        reducers.insert(b, vec![1]);
        MapReducePlan::new(mappers, reducers)
    }

    #[test]
    fn split_numbers_are_dense_and_deterministic() {
        let plan = two_node_plan();
        let numbers: BTreeSet<usize> = plan
            .all_splits()
            .iter()
            .map(|s| plan.split_task_number(s).expect("numbered"))
            .collect();
        assert_eq!(numbers, (0..3).collect());
    }

    #[test]
    fn combine_numbers_do_not_collide_with_split_numbers() {
        let plan = two_node_plan();
        let a = plan.node_task_number(&NodeId::new("node-a")).expect("a");
        let b = plan.node_task_number(&NodeId::new("node-b")).expect("b");
        assert_eq!(a, 3);
        assert_eq!(b, 4);
        assert!(plan.node_task_number(&NodeId::new("node-c")).is_none());
    }

    #[test]
    fn participants_cover_both_roles() {
        let plan = two_node_plan();
        assert_eq!(plan.participants().len(), 2);
        assert_eq!(plan.reducer_count(), 2);
    }

    #[test]
    fn empty_assignments_are_dropped() {
        let mut mappers = BTreeMap::new();
        mappers.insert(NodeId::new("node-a"), BTreeSet::new());
        let plan = MapReducePlan::new(mappers, BTreeMap::new());
        assert!(plan.participants().is_empty());
    }
}
