//! Map-reduce placement planning.
//!
//! Architecture role:
//! - turns a job's input splits and the live node set into an immutable
//!   [`MapReducePlan`](fmr_model::MapReducePlan)
//! - the tracker consumes the plan through the [`MapReducePlanner`] seam so
//!   deployments can substitute their own placement policy
//!
//! Key modules:
//! - [`locality`]

pub mod locality;

use std::collections::BTreeSet;

use fmr_common::{NodeId, Result};
use fmr_model::{InputSplit, MapReducePlan};

pub use locality::LocalityPlanner;

/// Placement policy seam: produce a plan for one job.
pub trait MapReducePlanner: Send + Sync {
    /// Assign every split to a mapper node and every reducer index
    /// `0..reducers` to a reducer node, over the given live nodes.
    fn prepare_plan(
        &self,
        splits: &[InputSplit],
        nodes: &BTreeSet<NodeId>,
        reducers: usize,
    ) -> Result<MapReducePlan>;
}
