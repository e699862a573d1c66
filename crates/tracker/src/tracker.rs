//! The job tracker: lifecycle controller, submission/status API, and task
//! completion handling.
//!
//! Responsibilities:
//! - submit jobs: plan placement, write initial metadata to the store;
//! - react to replicated metadata changes: launch/cancel this node's slice
//!   of the plan, never work owed to other nodes;
//! - fold task completions back into the metadata through transform values;
//! - recover from node loss via the update leader's replica scan;
//! - tear down behind the busy-gate, failing outstanding completion handles.
//!
//! Exactly-once semantics:
//! - terminal COMMIT/ABORT tasks are submitted by the update leader only
//!   (lowest-ordered live node among the plan's nodes and the submitter),
//!   re-guarded by a local latch against repeated notifications;
//! - per-node task dedup lives in [`LocalJobState`]; per-node cancel
//!   delivery is latched the same way.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use fmr_common::metrics::global_metrics;
use fmr_common::{FmrError, JobId, JobIdSource, NodeId, Result, TrackerConfig};
use fmr_model::{
    FailCause, JobFactory, JobInfo, JobMetadata, JobPhase, MapReduceJob, MapReducePlan,
    MetaTransform, TaskInfo, TaskState, TaskStatus, TaskType,
};
use fmr_planner::MapReducePlanner;
use fmr_store::JobMetaStore;
use tracing::{debug, error, info, warn};

use crate::contracts::{ClusterTopology, DiscoveryEvent, ShuffleService, TaskExecutor};
use crate::dispatcher::{EventDispatcher, TrackerEvent};
use crate::finish::{CompletionHandle, JobOutcome};
use crate::gate::BusyGate;
use crate::local_state::LocalJobState;

/// Node-local collaborators the tracker is wired to.
pub struct TrackerContext {
    /// Node-level tracker configuration.
    pub config: TrackerConfig,
    /// Cluster membership view; also names the local node.
    pub topology: Arc<ClusterTopology>,
    /// Placement policy.
    pub planner: Arc<dyn MapReducePlanner>,
    /// Materialises runnable job handles from descriptors.
    pub job_factory: Arc<dyn JobFactory>,
    /// In-tracker task executor.
    pub internal_executor: Arc<dyn TaskExecutor>,
    /// Separate-process task executor.
    pub external_executor: Arc<dyn TaskExecutor>,
    /// Shuffle subsystem.
    pub shuffle: Arc<dyn ShuffleService>,
}

impl TrackerContext {
    fn task_executor(&self, external: bool) -> &Arc<dyn TaskExecutor> {
        if external {
            &self.external_executor
        } else {
            &self.internal_executor
        }
    }
}

/// Status snapshot returned by [`JobTracker::status`].
#[derive(Clone)]
pub struct JobStatus {
    /// Handle resolving with the job's terminal outcome.
    pub completion: CompletionHandle,
    /// The job's descriptor.
    pub info: JobInfo,
}

/// One node's tracker instance.
///
/// Clonable handle over shared state; clones observe the same tracker.
#[derive(Clone)]
pub struct JobTracker {
    inner: Arc<TrackerInner>,
}

struct TrackerInner {
    ctx: TrackerContext,
    store: Arc<dyn JobMetaStore>,
    job_ids: JobIdSource,
    active_jobs: Mutex<HashMap<JobId, Arc<LocalJobState>>>,
    finish_futs: Mutex<HashMap<JobId, CompletionHandle>>,
    terminal_submitted: Mutex<HashSet<JobId>>,
    gate: BusyGate,
    dispatcher: EventDispatcher,
}

impl JobTracker {
    /// Start a tracker: spawn the dispatcher worker and subscribe to the
    /// store's change notifications. Call [`JobTracker::stop`] to tear it
    /// down; otherwise the worker task keeps the tracker alive.
    pub fn start(ctx: TrackerContext, store: Arc<dyn JobMetaStore>) -> Self {
        let local = ctx.topology.local().clone();
        let (dispatcher, mut events) = EventDispatcher::new();
        let inner = Arc::new(TrackerInner {
            job_ids: JobIdSource::new(local.clone()),
            ctx,
            store,
            active_jobs: Mutex::new(HashMap::new()),
            finish_futs: Mutex::new(HashMap::new()),
            terminal_submitted: Mutex::new(HashSet::new()),
            gate: BusyGate::new(),
            dispatcher,
        });

        let worker_inner = Arc::clone(&inner);
        let worker = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                worker_inner.handle_event(event).await;
            }
        });
        inner.dispatcher.attach_worker(worker);

        // The change callback runs on the store's notification path: it must
        // not block and must not call back into the store, so it only hands
        // the batch to the dispatcher worker.
        let subscriber = Arc::downgrade(&inner);
        inner.store.subscribe(Box::new(move |batch| {
            let Some(inner) = subscriber.upgrade() else {
                return;
            };
            let Some(_permit) = inner.gate.try_enter() else {
                return;
            };
            inner.dispatcher.enqueue(TrackerEvent::MetadataUpdated(batch));
        }));

        info!(node = %local, operator = "TrackerStart", "job tracker started");
        Self { inner }
    }

    /// Allocate the next job id on this node.
    pub fn next_job_id(&self) -> JobId {
        self.inner.job_ids.next_id()
    }

    /// Submit a job: build it, plan placement, register a completion handle,
    /// and write the initial metadata to the store. The returned handle
    /// resolves once the job reaches its terminal phase on this node.
    pub async fn submit(&self, job_id: JobId, info: JobInfo) -> Result<CompletionHandle> {
        let inner = &self.inner;
        let Some(_permit) = inner.gate.try_enter() else {
            return Err(FmrError::Stopping(format!(
                "failed to submit map-reduce job {job_id}"
            )));
        };

        let job = inner.ctx.job_factory.create(&job_id, &info)?;
        let splits = job.input()?;
        let nodes = inner.ctx.topology.live_nodes();
        let plan = inner.ctx.planner.prepare_plan(&splits, &nodes, info.reducers)?;
        let external = info.external_execution(inner.ctx.config.external_execution);
        let meta = JobMetadata::new(
            job_id.clone(),
            info,
            inner.local().clone(),
            plan,
            external,
        );

        let handle = CompletionHandle::new();
        {
            let mut futs = inner.finish_futs.lock().expect("finish futures lock");
            if futs.contains_key(&job_id) {
                return Err(FmrError::AlreadySubmitted(job_id.to_string()));
            }
            futs.insert(job_id.clone(), handle.clone());
        }

        debug!(
            job_id = %job_id,
            splits = meta.pending_splits().len(),
            reducers = meta.pending_reducers().len(),
            external,
            operator = "TrackerSubmit",
            "submitting job metadata"
        );
        if let Err(e) = inner.store.put(&job_id, meta).await {
            inner
                .finish_futs
                .lock()
                .expect("finish futures lock")
                .remove(&job_id);
            return Err(e);
        }
        global_metrics().inc_jobs_submitted(inner.local().as_str());
        Ok(handle)
    }

    /// Look up a job's status. `None` when no metadata exists for the id.
    pub async fn status(&self, job_id: &JobId) -> Result<Option<JobStatus>> {
        let inner = &self.inner;
        let Some(_permit) = inner.gate.try_enter() else {
            return Err(FmrError::Stopping(format!(
                "failed to query status of job {job_id}"
            )));
        };

        let Some(meta) = inner.store.get(job_id).await? else {
            return Ok(None);
        };
        if meta.phase().is_terminal() {
            debug!(job_id = %job_id, operator = "TrackerStatus", "job is complete, returning finished handle");
            return Ok(Some(JobStatus {
                completion: CompletionHandle::finished(outcome_of(&meta)),
                info: meta.info().clone(),
            }));
        }

        let handle = inner
            .finish_futs
            .lock()
            .expect("finish futures lock")
            .entry(job_id.clone())
            .or_insert_with(CompletionHandle::new)
            .clone();

        // Re-read to close the window against a completion that raced the
        // handle registration.
        match inner.store.get(job_id).await? {
            None => {
                handle.complete(Err(FmrError::NotFound(job_id.to_string())));
                inner
                    .finish_futs
                    .lock()
                    .expect("finish futures lock")
                    .remove(job_id);
            }
            Some(current) if current.phase().is_terminal() => {
                handle.complete(outcome_of(&current));
                inner
                    .finish_futs
                    .lock()
                    .expect("finish futures lock")
                    .remove(job_id);
            }
            Some(_) => {}
        }

        Ok(Some(JobStatus {
            completion: handle,
            info: meta.info().clone(),
        }))
    }

    /// The job's placement plan, if its metadata is still live.
    pub async fn plan(&self, job_id: &JobId) -> Result<Option<MapReducePlan>> {
        let inner = &self.inner;
        let Some(_permit) = inner.gate.try_enter() else {
            return Err(FmrError::Stopping(format!(
                "failed to read plan of job {job_id}"
            )));
        };
        Ok(inner.store.get(job_id).await?.map(|m| m.plan().clone()))
    }

    /// A runnable handle for the job, from local state or materialised from
    /// its metadata.
    pub async fn job(&self, job_id: &JobId) -> Result<Option<Arc<dyn MapReduceJob>>> {
        let inner = &self.inner;
        let Some(_permit) = inner.gate.try_enter() else {
            return Err(FmrError::Stopping(format!("failed to look up job {job_id}")));
        };
        if let Some(state) = inner
            .active_jobs
            .lock()
            .expect("active jobs lock")
            .get(job_id)
        {
            return Ok(Some(state.job().clone()));
        }
        match inner.store.get(job_id).await? {
            None => Ok(None),
            Some(meta) => inner.ctx.job_factory.create(job_id, meta.info()).map(Some),
        }
    }

    /// Task executor callback: a local task attempt finished.
    pub async fn on_task_finished(&self, task: TaskInfo, status: TaskStatus) {
        let inner = &self.inner;
        let Some(_permit) = inner.gate.try_enter() else {
            return;
        };
        inner.handle_task_finished(task, status).await;
    }

    /// Discovery callback: a node left or failed.
    pub fn on_discovery_event(&self, event: DiscoveryEvent) {
        let inner = &self.inner;
        let Some(_permit) = inner.gate.try_enter() else {
            return;
        };
        debug!(
            node = %inner.local(),
            departed = %event.node,
            kind = ?event.kind,
            operator = "TrackerDiscovery",
            "processing discovery event"
        );
        inner.dispatcher.enqueue(TrackerEvent::TopologyChanged {
            departed: event.node,
            live: event.live,
        });
    }

    /// Stop the tracker: close the busy-gate (waiting for in-flight work),
    /// shut the dispatcher worker down, and fail every outstanding
    /// completion handle.
    pub async fn stop(&self) {
        let inner = &self.inner;
        info!(node = %inner.local(), operator = "TrackerStop", "stopping job tracker");
        inner.gate.close().await;
        inner.dispatcher.shutdown().await;

        let outstanding: Vec<(JobId, CompletionHandle)> = inner
            .finish_futs
            .lock()
            .expect("finish futures lock")
            .drain()
            .collect();
        for (job_id, handle) in outstanding {
            handle.complete(Err(FmrError::Stopping(format!(
                "failed to execute map-reduce job {job_id} (tracker is stopping)"
            ))));
        }
    }
}

impl TrackerInner {
    fn local(&self) -> &NodeId {
        self.ctx.topology.local()
    }

    async fn handle_event(&self, event: TrackerEvent) {
        // Events already enqueued when shutdown starts are dropped here.
        let Some(_permit) = self.gate.try_enter() else {
            return;
        };
        match event {
            TrackerEvent::MetadataUpdated(batch) => {
                for (job_id, meta) in batch {
                    if let Err(e) = self.process_meta(&job_id, meta).await {
                        error!(
                            job_id = %job_id,
                            error = %e,
                            operator = "TrackerMetaUpdate",
                            "unhandled error while processing job metadata"
                        );
                    }
                }
            }
            TrackerEvent::TopologyChanged { departed, live } => {
                self.ctx.topology.set_live(live);
                self.process_node_left(&departed).await;
            }
        }
    }

    async fn process_meta(&self, job_id: &JobId, meta: JobMetadata) -> Result<()> {
        debug!(
            node = %self.local(),
            job_id = %job_id,
            phase = %meta.phase(),
            operator = "TrackerMetaUpdate",
            "processing job metadata update"
        );

        if meta.external_execution() {
            self.ctx
                .external_executor
                .on_job_state_changed(job_id, &meta)
                .await;
        }

        if meta.phase() == JobPhase::Complete {
            self.finish_job(job_id, &meta);
            return Ok(());
        }
        let job = self.job_handle(job_id, &meta)?;

        match meta.phase() {
            JobPhase::Setup => {
                debug!(job_id = %job_id, operator = "TrackerMetaUpdate", "job still in setup");
            }
            JobPhase::Map => {
                let mut tasks = self.mapper_tasks(&job, &meta);
                if meta.external_execution() {
                    // The external worker process launches once per node per
                    // job, so it must receive the node's reducers in the same
                    // pass as its mappers.
                    self.collect_reducer_tasks(&job, &meta, &mut tasks);
                }
                if !tasks.is_empty() {
                    self.run_tasks(&meta, job, tasks).await;
                }
            }
            JobPhase::Reduce => {
                if meta.pending_reducers().is_empty() && self.is_update_leader(&meta) {
                    self.submit_terminal(&meta, TaskType::Commit, job).await;
                    return Ok(());
                }
                if !meta.external_execution() {
                    let mut tasks = Vec::new();
                    self.collect_reducer_tasks(&job, &meta, &mut tasks);
                    if !tasks.is_empty() {
                        self.run_tasks(&meta, job, tasks).await;
                    }
                }
            }
            JobPhase::Cancelling => {
                self.process_cancelling(job_id, &meta, job).await;
            }
            // Handled before the job handle was materialised.
            JobPhase::Complete => {}
        }
        Ok(())
    }

    async fn process_cancelling(
        &self,
        job_id: &JobId,
        meta: &JobMetadata,
        job: Arc<dyn MapReduceJob>,
    ) {
        let state = self.lookup_state(job_id);
        if let Some(state) = &state {
            if state.on_cancel() {
                debug!(
                    node = %self.local(),
                    job_id = %job_id,
                    operator = "TrackerCancel",
                    "cancelling local task execution"
                );
                self.ctx
                    .task_executor(meta.external_execution())
                    .cancel_tasks(job_id)
                    .await;
            }
        }

        if meta.pending_splits().is_empty() && meta.pending_reducers().is_empty() {
            if self.is_update_leader(meta) {
                self.submit_terminal(meta, TaskType::Abort, job).await;
            }
            return;
        }

        // Strip work that was assigned here but never scheduled, so the
        // pending sets can drain without those tasks ever running. Only
        // still-pending entries are stripped; an empty strip is suppressed,
        // or every commit would echo another identical cancel.
        let mut cancel_splits = BTreeSet::new();
        if let Some(mappers) = meta.plan().mappers_for(self.local()) {
            for split in mappers {
                let scheduled = state
                    .as_ref()
                    .is_some_and(|s| s.mapper_scheduled(split));
                if !scheduled && meta.pending_splits().contains(split) {
                    cancel_splits.insert(split.clone());
                }
            }
        }
        let mut cancel_reducers = BTreeSet::new();
        if let Some(reducers) = meta.plan().reducers_for(self.local()) {
            for reducer in reducers {
                let scheduled = state
                    .as_ref()
                    .is_some_and(|s| s.reducer_scheduled(*reducer));
                if !scheduled && meta.pending_reducers().contains(reducer) {
                    cancel_reducers.insert(*reducer);
                }
            }
        }
        if !cancel_splits.is_empty() || !cancel_reducers.is_empty() {
            self.store.transform_async(
                job_id,
                MetaTransform::CancelJob {
                    splits: cancel_splits,
                    reducers: cancel_reducers,
                    err: None,
                },
            );
        }
    }

    fn finish_job(&self, job_id: &JobId, meta: &JobMetadata) {
        let removed = self
            .active_jobs
            .lock()
            .expect("active jobs lock")
            .remove(job_id);
        if removed.is_some() {
            self.ctx.shuffle.job_finished(job_id);
        }
        self.terminal_submitted
            .lock()
            .expect("terminal latch lock")
            .remove(job_id);
        global_metrics().set_active_jobs(
            self.local().as_str(),
            self.active_jobs.lock().expect("active jobs lock").len() as u64,
        );

        let handle = self
            .finish_futs
            .lock()
            .expect("finish futures lock")
            .remove(job_id);
        if let Some(handle) = handle {
            let outcome = outcome_of(meta);
            debug!(
                node = %self.local(),
                job_id = %job_id,
                success = outcome.is_ok(),
                operator = "TrackerComplete",
                "completing job future"
            );
            global_metrics().inc_jobs_completed(
                self.local().as_str(),
                if outcome.is_ok() { "success" } else { "failed" },
            );
            handle.complete(outcome);
        }
    }

    async fn handle_task_finished(&self, task: TaskInfo, status: TaskStatus) {
        if status.state() == TaskState::Running {
            debug_assert!(false, "completion callback with RUNNING state");
            warn!(
                job_id = %task.job_id,
                task = %task.task_type,
                operator = "TrackerTaskFinished",
                "ignoring completion callback with running state"
            );
            return;
        }
        debug!(
            node = %self.local(),
            job_id = %task.job_id,
            task = %task.task_type,
            number = task.task_number,
            state = ?status.state(),
            operator = "TrackerTaskFinished",
            "received task finished callback"
        );

        let state = self.lookup_state(&task.job_id);
        match task.task_type {
            TaskType::Map => match state {
                Some(state) => self.on_map_finished(&state, task, status),
                // Benign: completion arrived after the job left this node.
                None => debug!(
                    job_id = %task.job_id,
                    operator = "TrackerTaskFinished",
                    "map completion without local state"
                ),
            },
            TaskType::Reduce => {
                let err = status.fail_cause().cloned();
                self.store.transform_async(
                    &task.job_id,
                    MetaTransform::RemoveReducer {
                        reducer: task.task_number,
                        err,
                    },
                );
            }
            TaskType::Combine => match state {
                Some(state) => self.on_combine_finished(&state, task, status),
                None => debug!(
                    job_id = %task.job_id,
                    operator = "TrackerTaskFinished",
                    "combine completion without local state"
                ),
            },
            TaskType::Commit | TaskType::Abort => {
                let ttl = match self.store.get(&task.job_id).await {
                    Ok(Some(meta)) => meta
                        .info()
                        .finished_job_info_ttl()
                        .unwrap_or_else(|| self.ctx.config.finished_job_info_ttl()),
                    _ => self.ctx.config.finished_job_info_ttl(),
                };
                if let Err(e) = self.store.set_ttl(&task.job_id, ttl).await {
                    warn!(
                        job_id = %task.job_id,
                        error = %e,
                        operator = "TrackerTaskFinished",
                        "failed to set ttl on finished job metadata"
                    );
                }
                self.store.transform_async(
                    &task.job_id,
                    MetaTransform::UpdatePhase {
                        phase: JobPhase::Complete,
                    },
                );
            }
        }
    }

    fn on_map_finished(&self, state: &Arc<LocalJobState>, task: TaskInfo, status: TaskStatus) {
        let job_id = task.job_id.clone();
        let Some(split) = task.input_split else {
            warn!(job_id = %job_id, operator = "TrackerTaskFinished", "map completion without split");
            return;
        };
        let last_mapper_finished = state.on_mapper_finished();

        if status.state().is_failure() {
            // Fail the whole job.
            let err = status.fail_cause().cloned();
            self.store
                .transform_async(&job_id, MetaTransform::remove_mapper(split, err));
            return;
        }

        if state.job().has_combiner() {
            // The combine path acknowledges this node's mappers later, in one
            // transform; nothing to do until the node's last mapper is in.
            if last_mapper_finished && !state.meta().external_execution() {
                let number = state
                    .meta()
                    .node_task_number(self.local())
                    .expect("mapper node numbered by plan");
                let combine = TaskInfo::combine(self.local().clone(), job_id, number);
                self.spawn_internal_run(state.job().clone(), vec![combine]);
            }
        } else if last_mapper_finished {
            let store = Arc::clone(&self.store);
            let shuffle = Arc::clone(&self.ctx.shuffle);
            tokio::spawn(async move {
                let err = shuffle
                    .flush(&job_id)
                    .await
                    .err()
                    .map(|e| FailCause::shuffle(e.to_string()));
                store.transform_async(&job_id, MetaTransform::remove_mapper(split, err));
            });
        } else {
            self.store
                .transform_async(&job_id, MetaTransform::remove_mapper(split, None));
        }
    }

    fn on_combine_finished(&self, state: &Arc<LocalJobState>, task: TaskInfo, status: TaskStatus) {
        debug_assert!(state.job().has_combiner());
        let job_id = task.job_id;
        let splits = state.scheduled_mappers();

        if status.state().is_failure() {
            // Fail the whole job.
            let err = status.fail_cause().cloned();
            self.store
                .transform_async(&job_id, MetaTransform::RemoveMappers { splits, err });
            return;
        }

        let store = Arc::clone(&self.store);
        let shuffle = Arc::clone(&self.ctx.shuffle);
        tokio::spawn(async move {
            let err = shuffle
                .flush(&job_id)
                .await
                .err()
                .map(|e| FailCause::shuffle(e.to_string()));
            store.transform_async(&job_id, MetaTransform::RemoveMappers { splits, err });
        });
    }

    // Combine tasks are scheduled from the completion callback, outside the
    // dispatcher; run them on their own task so the executor callback chain
    // cannot recurse into itself.
    fn spawn_internal_run(&self, job: Arc<dyn MapReduceJob>, tasks: Vec<TaskInfo>) {
        for task in &tasks {
            global_metrics().inc_tasks_submitted(
                self.local().as_str(),
                &task.task_type.to_string(),
                1,
            );
        }
        let executor = Arc::clone(&self.ctx.internal_executor);
        tokio::spawn(async move {
            executor.run(job, tasks).await;
        });
    }

    async fn process_node_left(&self, departed: &NodeId) {
        for meta in self.store.values().await {
            if !matches!(meta.phase(), JobPhase::Map | JobPhase::Reduce) {
                continue;
            }
            // Only the update leader acts; elected over the survivors, so a
            // dead leader is replaced before this check.
            if !self.is_update_leader(&meta) {
                continue;
            }

            // Check every plan node, not only the departed one: multiple
            // nodes may be gone by the time this scan runs.
            let mut cancel_splits = BTreeSet::new();
            for node in meta.plan().mapper_nodes() {
                if !self.ctx.topology.is_live(node) {
                    if let Some(splits) = meta.plan().mappers_for(node) {
                        cancel_splits.extend(splits.iter().cloned());
                    }
                }
            }
            let mut cancel_reducers = BTreeSet::new();
            for node in meta.plan().reducer_nodes() {
                if !self.ctx.topology.is_live(node) {
                    if let Some(reducers) = meta.plan().reducers_for(node) {
                        cancel_reducers.extend(reducers.iter().copied());
                    }
                }
            }

            if !cancel_splits.is_empty() || !cancel_reducers.is_empty() {
                warn!(
                    node = %self.local(),
                    job_id = %meta.job_id(),
                    departed = %departed,
                    splits = cancel_splits.len(),
                    reducers = cancel_reducers.len(),
                    operator = "TrackerNodeLeft",
                    "cancelling job after node loss"
                );
                let cancel = MetaTransform::CancelJob {
                    splits: cancel_splits,
                    reducers: cancel_reducers,
                    err: Some(FailCause::node_loss(
                        "one or more nodes participating in map-reduce job execution failed",
                    )),
                };
                if let Err(e) = self.store.transform(meta.job_id(), cancel).await {
                    error!(
                        job_id = %meta.job_id(),
                        error = %e,
                        operator = "TrackerNodeLeft",
                        "failed to cancel job"
                    );
                }
            }
        }
    }

    fn mapper_tasks(&self, job: &Arc<dyn MapReduceJob>, meta: &JobMetadata) -> Vec<TaskInfo> {
        let Some(splits) = meta.plan().mappers_for(self.local()) else {
            return Vec::new();
        };
        let state = self.init_state(job, meta);
        let mut tasks = Vec::new();
        for split in splits {
            if state.add_mapper(split.clone()) {
                let number = meta
                    .split_task_number(split)
                    .expect("split numbered by plan");
                debug!(
                    node = %self.local(),
                    job_id = %meta.job_id(),
                    split = %split,
                    number,
                    operator = "TrackerSchedule",
                    "submitting map task for execution"
                );
                tasks.push(TaskInfo::map(
                    self.local().clone(),
                    meta.job_id().clone(),
                    number,
                    split.clone(),
                ));
            }
        }
        tasks
    }

    fn collect_reducer_tasks(
        &self,
        job: &Arc<dyn MapReduceJob>,
        meta: &JobMetadata,
        tasks: &mut Vec<TaskInfo>,
    ) {
        let Some(reducers) = meta.plan().reducers_for(self.local()) else {
            return;
        };
        let state = self.init_state(job, meta);
        for reducer in reducers {
            if state.add_reducer(*reducer) {
                debug!(
                    node = %self.local(),
                    job_id = %meta.job_id(),
                    reducer,
                    operator = "TrackerSchedule",
                    "submitting reduce task for execution"
                );
                tasks.push(TaskInfo::reduce(
                    self.local().clone(),
                    meta.job_id().clone(),
                    *reducer,
                ));
            }
        }
    }

    async fn run_tasks(&self, meta: &JobMetadata, job: Arc<dyn MapReduceJob>, tasks: Vec<TaskInfo>) {
        for task in &tasks {
            global_metrics().inc_tasks_submitted(
                self.local().as_str(),
                &task.task_type.to_string(),
                1,
            );
        }
        self.ctx
            .task_executor(meta.external_execution())
            .run(job, tasks)
            .await;
    }

    async fn submit_terminal(
        &self,
        meta: &JobMetadata,
        task_type: TaskType,
        job: Arc<dyn MapReduceJob>,
    ) {
        let job_id = meta.job_id().clone();
        // Several notifications can observe the terminal-eligible state
        // before the phase flips; the latch keeps the terminal task single.
        if !self
            .terminal_submitted
            .lock()
            .expect("terminal latch lock")
            .insert(job_id.clone())
        {
            return;
        }
        debug!(
            node = %self.local(),
            job_id = %job_id,
            task = %task_type,
            operator = "TrackerTerminal",
            "submitting terminal task for execution"
        );
        let task = match task_type {
            TaskType::Commit => TaskInfo::commit(self.local().clone(), job_id),
            _ => TaskInfo::abort(self.local().clone(), job_id),
        };
        global_metrics().inc_tasks_submitted(self.local().as_str(), &task_type.to_string(), 1);
        // Terminal tasks always run on the internal executor.
        self.ctx.internal_executor.run(job, vec![task]).await;
    }

    fn is_update_leader(&self, meta: &JobMetadata) -> bool {
        let live = self.ctx.topology.live_nodes();
        let mut candidates = meta.plan().participants();
        candidates.insert(meta.submitted_by().clone());
        candidates
            .intersection(&live)
            .next()
            .is_some_and(|leader| leader == self.local())
    }

    fn lookup_state(&self, job_id: &JobId) -> Option<Arc<LocalJobState>> {
        self.active_jobs
            .lock()
            .expect("active jobs lock")
            .get(job_id)
            .cloned()
    }

    fn init_state(&self, job: &Arc<dyn MapReduceJob>, meta: &JobMetadata) -> Arc<LocalJobState> {
        let mut jobs = self.active_jobs.lock().expect("active jobs lock");
        let state = jobs
            .entry(meta.job_id().clone())
            .or_insert_with(|| Arc::new(LocalJobState::new(job.clone(), meta.clone())))
            .clone();
        global_metrics().set_active_jobs(self.local().as_str(), jobs.len() as u64);
        state
    }

    fn job_handle(&self, job_id: &JobId, meta: &JobMetadata) -> Result<Arc<dyn MapReduceJob>> {
        if let Some(state) = self.lookup_state(job_id) {
            return Ok(state.job().clone());
        }
        self.ctx.job_factory.create(job_id, meta.info())
    }
}

fn outcome_of(meta: &JobMetadata) -> JobOutcome {
    match meta.fail_cause() {
        Some(cause) => Err(cause.clone().into()),
        None => Ok(meta.job_id().clone()),
    }
}

#[cfg(test)]
#[path = "tracker_tests.rs"]
mod tracker_tests;
