//! Per-node scheduling bookkeeping for one job.
//!
//! Contract:
//! - `add_mapper`/`add_reducer` return true only on first insertion, so a
//!   task is handed to the executor at most once per node;
//! - `on_cancel` latches: exactly one caller observes true, so executor
//!   cancellation fires at most once per job per node;
//! - all of a node's mappers are registered in a single controller pass
//!   before any of them can complete, which is what makes the
//!   last-mapper test against `mapper_count` sound.

use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use fmr_model::{InputSplit, JobMetadata, MapReduceJob};

/// Node-local view of one job: what is scheduled here, how many mappers
/// finished, and whether local cancellation already fired.
pub struct LocalJobState {
    job: Arc<dyn MapReduceJob>,
    meta: JobMetadata,
    curr_mappers: Mutex<HashSet<InputSplit>>,
    curr_reducers: Mutex<HashSet<usize>>,
    completed_mappers: AtomicUsize,
    cancelled: AtomicBool,
}

impl LocalJobState {
    /// Fresh state from the job handle and the metadata snapshot that first
    /// made this job relevant to the node.
    pub fn new(job: Arc<dyn MapReduceJob>, meta: JobMetadata) -> Self {
        Self {
            job,
            meta,
            curr_mappers: Mutex::new(HashSet::new()),
            curr_reducers: Mutex::new(HashSet::new()),
            completed_mappers: AtomicUsize::new(0),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Runnable job handle.
    pub fn job(&self) -> &Arc<dyn MapReduceJob> {
        &self.job
    }

    /// Metadata snapshot captured at state creation. Immutable fields only
    /// (plan, descriptor, execution mode); live phase/pending data must be
    /// read from the store.
    pub fn meta(&self) -> &JobMetadata {
        &self.meta
    }

    /// Register a mapper split; true if it was not scheduled before.
    pub fn add_mapper(&self, split: InputSplit) -> bool {
        self.curr_mappers.lock().expect("mapper set lock").insert(split)
    }

    /// Register a reducer index; true if it was not scheduled before.
    pub fn add_reducer(&self, reducer: usize) -> bool {
        self.curr_reducers
            .lock()
            .expect("reducer set lock")
            .insert(reducer)
    }

    /// Whether the split was scheduled on this node.
    pub fn mapper_scheduled(&self, split: &InputSplit) -> bool {
        self.curr_mappers
            .lock()
            .expect("mapper set lock")
            .contains(split)
    }

    /// Whether the reducer index was scheduled on this node.
    pub fn reducer_scheduled(&self, reducer: usize) -> bool {
        self.curr_reducers
            .lock()
            .expect("reducer set lock")
            .contains(&reducer)
    }

    /// Snapshot of every split scheduled on this node. Combine completion
    /// acknowledges all of them in one transform.
    pub fn scheduled_mappers(&self) -> BTreeSet<InputSplit> {
        self.curr_mappers
            .lock()
            .expect("mapper set lock")
            .iter()
            .cloned()
            .collect()
    }

    /// Count one finished mapper; true when it was the last one scheduled
    /// on this node.
    pub fn on_mapper_finished(&self) -> bool {
        let completed = self.completed_mappers.fetch_add(1, Ordering::AcqRel) + 1;
        completed == self.curr_mappers.lock().expect("mapper set lock").len()
    }

    /// Latch local cancellation; true exactly once.
    pub fn on_cancel(&self) -> bool {
        !self.cancelled.swap(true, Ordering::AcqRel)
    }
}
