//! Locality-aware default placement.
//!
//! Contract:
//! - output is deterministic for identical inputs (splits are visited in
//!   their natural order, ties break on node order), so independent nodes
//!   planning the same job would produce the same plan;
//! - a split lands on one of its preferred hosts when any is live,
//!   otherwise on the least-loaded live node;
//! - reducer indices round-robin across the live nodes.

use std::collections::{BTreeMap, BTreeSet};

use fmr_common::{FmrError, NodeId, Result};
use fmr_model::{InputSplit, MapReducePlan};
use tracing::debug;

use crate::MapReducePlanner;

/// Default planner: preferred-host placement with least-loaded fallback.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalityPlanner;

impl LocalityPlanner {
    fn pick_node<'a>(
        split: &InputSplit,
        nodes: &'a BTreeSet<NodeId>,
        load: &BTreeMap<NodeId, usize>,
    ) -> &'a NodeId {
        let local = split
            .hosts
            .iter()
            .filter_map(|h| nodes.get(h))
            .min_by_key(|n| (load.get(*n).copied().unwrap_or(0), *n));
        local.unwrap_or_else(|| {
            nodes
                .iter()
                .min_by_key(|n| (load.get(*n).copied().unwrap_or(0), *n))
                .expect("non-empty node set")
        })
    }
}

impl MapReducePlanner for LocalityPlanner {
    fn prepare_plan(
        &self,
        splits: &[InputSplit],
        nodes: &BTreeSet<NodeId>,
        reducers: usize,
    ) -> Result<MapReducePlan> {
        if nodes.is_empty() {
            return Err(FmrError::Planning(
                "cannot place a job on an empty node set".to_string(),
            ));
        }

        let mut ordered: Vec<&InputSplit> = splits.iter().collect();
        ordered.sort();

        let mut load = BTreeMap::new();
        let mut mappers: BTreeMap<NodeId, BTreeSet<InputSplit>> = BTreeMap::new();
        for split in ordered {
            let node = Self::pick_node(split, nodes, &load).clone();
            *load.entry(node.clone()).or_insert(0) += 1;
            debug!(
                split = %split,
                node = %node,
                operator = "LocalityPlanner",
                "placed mapper split"
            );
            mappers.entry(node).or_default().insert(split.clone());
        }

        let mut reducer_map: BTreeMap<NodeId, Vec<usize>> = BTreeMap::new();
        for (idx, node) in (0..reducers).zip(nodes.iter().cycle()) {
            reducer_map.entry(node.clone()).or_default().push(idx);
        }

        Ok(MapReducePlan::new(mappers, reducer_map))
    }
}
