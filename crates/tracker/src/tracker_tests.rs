use super::*;
use crate::contracts::DiscoveryEventKind;
use fmr_planner::LocalityPlanner;
use fmr_store::StoreCluster;

use std::sync::Mutex as StdMutex;
use std::time::Duration;

use async_trait::async_trait;

const COMBINER_OPTION: &str = "fmr.combiner";

struct TestJob {
    id: JobId,
    splits: Vec<fmr_model::InputSplit>,
    combiner: bool,
}

impl MapReduceJob for TestJob {
    fn id(&self) -> &JobId {
        &self.id
    }

    fn input(&self) -> Result<Vec<fmr_model::InputSplit>> {
        Ok(self.splits.clone())
    }

    fn has_combiner(&self) -> bool {
        self.combiner
    }
}

// Builds one split per input path; a "host:name" path pins the split to
// that host through the planner's locality preference.
struct TestJobFactory;

impl JobFactory for TestJobFactory {
    fn create(&self, job_id: &JobId, info: &JobInfo) -> Result<Arc<dyn MapReduceJob>> {
        let splits = info
            .input_paths
            .iter()
            .map(|path| {
                let split = fmr_model::InputSplit::new(path.clone(), 0, 100);
                match path.split_once(':') {
                    Some((host, _)) => split.with_hosts(vec![NodeId::new(host)]),
                    None => split,
                }
            })
            .collect();
        let combiner = info
            .config
            .get(COMBINER_OPTION)
            .is_some_and(|v| v == "true");
        Ok(Arc::new(TestJob {
            id: job_id.clone(),
            splits,
            combiner,
        }))
    }
}

#[derive(Default)]
struct RecordingExecutor {
    runs: StdMutex<Vec<Vec<TaskInfo>>>,
    cancelled: StdMutex<Vec<JobId>>,
    state_changes: StdMutex<usize>,
}

#[async_trait]
impl TaskExecutor for RecordingExecutor {
    async fn run(&self, _job: Arc<dyn MapReduceJob>, tasks: Vec<TaskInfo>) {
        self.runs.lock().expect("runs lock").push(tasks);
    }

    async fn cancel_tasks(&self, job_id: &JobId) {
        self.cancelled
            .lock()
            .expect("cancelled lock")
            .push(job_id.clone());
    }

    async fn on_job_state_changed(&self, _job_id: &JobId, _meta: &JobMetadata) {
        *self.state_changes.lock().expect("state changes lock") += 1;
    }
}

impl RecordingExecutor {
    fn tasks_of(&self, task_type: TaskType) -> Vec<TaskInfo> {
        self.runs
            .lock()
            .expect("runs lock")
            .iter()
            .flatten()
            .filter(|t| t.task_type == task_type)
            .cloned()
            .collect()
    }

    async fn wait_for(&self, task_type: TaskType, count: usize) -> Vec<TaskInfo> {
        wait_until(|| {
            let tasks = self.tasks_of(task_type);
            (tasks.len() >= count).then_some(tasks)
        })
        .await
        .unwrap_or_else(|| {
            panic!(
                "timed out waiting for {count} {task_type} tasks; saw {}",
                self.tasks_of(task_type).len()
            )
        })
    }

    async fn wait_cancelled(&self, job_id: &JobId) {
        wait_until(|| {
            self.cancelled
                .lock()
                .expect("cancelled lock")
                .contains(job_id)
                .then_some(())
        })
        .await
        .expect("timed out waiting for cancel_tasks");
    }
}

#[derive(Default)]
struct TestShuffle {
    flushes: StdMutex<Vec<JobId>>,
    finished: StdMutex<Vec<JobId>>,
    fail_flush: StdMutex<Option<String>>,
}

#[async_trait]
impl ShuffleService for TestShuffle {
    async fn flush(&self, job_id: &JobId) -> Result<()> {
        self.flushes
            .lock()
            .expect("flushes lock")
            .push(job_id.clone());
        match self.fail_flush.lock().expect("fail lock").clone() {
            Some(message) => Err(FmrError::Shuffle(message)),
            None => Ok(()),
        }
    }

    fn job_finished(&self, job_id: &JobId) {
        self.finished
            .lock()
            .expect("finished lock")
            .push(job_id.clone());
    }
}

fn init_logging() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn wait_until<T>(mut probe: impl FnMut() -> Option<T>) -> Option<T> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(value) = probe() {
            return Some(value);
        }
        if tokio::time::Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

struct TestNode {
    node: NodeId,
    tracker: JobTracker,
    internal: Arc<RecordingExecutor>,
    external: Arc<RecordingExecutor>,
    shuffle: Arc<TestShuffle>,
}

impl TestNode {
    fn start(cluster: &StoreCluster, name: &str, members: &[&str]) -> Self {
        init_logging();
        let node = NodeId::new(name);
        let topology = Arc::new(ClusterTopology::new(
            node.clone(),
            members.iter().map(|m| NodeId::new(*m)).collect(),
        ));
        let internal = Arc::new(RecordingExecutor::default());
        let external = Arc::new(RecordingExecutor::default());
        let shuffle = Arc::new(TestShuffle::default());
        let tracker = JobTracker::start(
            TrackerContext {
                config: TrackerConfig::default(),
                topology,
                planner: Arc::new(LocalityPlanner),
                job_factory: Arc::new(TestJobFactory),
                internal_executor: internal.clone(),
                external_executor: external.clone(),
                shuffle: shuffle.clone(),
            },
            Arc::new(cluster.node_store(node.clone())),
        );
        Self {
            node,
            tracker,
            internal,
            external,
            shuffle,
        }
    }

    async fn finish(&self, task: &TaskInfo, status: TaskStatus) {
        self.tracker.on_task_finished(task.clone(), status).await;
    }
}

// Records violations of the replicated-metadata invariants on every commit.
fn record_invariant_violations(cluster: &StoreCluster) -> Arc<StdMutex<Vec<String>>> {
    let violations = Arc::new(StdMutex::new(Vec::new()));
    let seen_failed: Arc<StdMutex<std::collections::HashSet<JobId>>> =
        Arc::new(StdMutex::new(std::collections::HashSet::new()));
    let sink = Arc::clone(&violations);
    cluster
        .node_store(NodeId::new("invariant-observer"))
        .subscribe(Box::new(move |batch| {
            for (job_id, meta) in batch {
                let report = |msg: String| {
                    sink.lock().expect("violations lock").push(format!("{job_id}: {msg}"))
                };
                if !meta.pending_splits().is_subset(&meta.plan().all_splits()) {
                    report("pending splits outside the plan".to_string());
                }
                if meta
                    .pending_reducers()
                    .iter()
                    .any(|r| *r >= meta.info().reducers)
                {
                    report("pending reducer index out of range".to_string());
                }
                let failed = meta.fail_cause().is_some();
                if failed {
                    seen_failed.lock().expect("failed set lock").insert(job_id.clone());
                } else if seen_failed.lock().expect("failed set lock").contains(&job_id) {
                    report("fail cause was cleared".to_string());
                }
                if meta.phase() == JobPhase::Complete
                    && !(meta.pending_splits().is_empty() && meta.pending_reducers().is_empty())
                    && !failed
                {
                    report("complete with pending work and no fail cause".to_string());
                }
            }
        }));
    violations
}

#[tokio::test]
async fn two_node_job_completes_through_map_reduce_commit() {
    let cluster = StoreCluster::new();
    let violations = record_invariant_violations(&cluster);
    let a = TestNode::start(&cluster, "node-a", &["node-a", "node-b"]);
    let b = TestNode::start(&cluster, "node-b", &["node-a", "node-b"]);

    let job_id = a.tracker.next_job_id();
    let info = JobInfo::new(
        vec![
            "node-a:part-0".into(),
            "node-a:part-1".into(),
            "node-b:part-2".into(),
        ],
        "out/words",
        1,
    );
    let handle = a.tracker.submit(job_id.clone(), info).await.expect("submit");
    assert!(handle.try_outcome().is_none());

    let a_maps = a.internal.wait_for(TaskType::Map, 2).await;
    let b_maps = b.internal.wait_for(TaskType::Map, 1).await;
    for task in a_maps.iter().chain(b_maps.iter()) {
        assert_eq!(task.node, task.input_split.as_ref().expect("map split").hosts[0]);
    }

    // Status taken mid-flight resolves with the same outcome later.
    let status = a
        .tracker
        .status(&job_id)
        .await
        .expect("status")
        .expect("job known");
    assert_eq!(status.info.output_path, "out/words");

    for task in b_maps.iter().chain(a_maps.iter()) {
        let owner = if task.node == a.node { &a } else { &b };
        owner.finish(task, TaskStatus::completed()).await;
    }

    let reduces = a.internal.wait_for(TaskType::Reduce, 1).await;
    a.finish(&reduces[0], TaskStatus::completed()).await;

    // The update leader is node-a; node-b never submits the commit.
    let commits = a.internal.wait_for(TaskType::Commit, 1).await;
    a.finish(&commits[0], TaskStatus::completed()).await;

    assert_eq!(handle.wait().await, Ok(job_id.clone()));
    assert_eq!(status.completion.wait().await, Ok(job_id.clone()));
    assert!(b.internal.tasks_of(TaskType::Commit).is_empty());
    assert!(a.internal.tasks_of(TaskType::Combine).is_empty());

    // Both nodes flushed their map output and observed job teardown.
    assert_eq!(a.shuffle.flushes.lock().expect("flushes").len(), 1);
    assert_eq!(b.shuffle.flushes.lock().expect("flushes").len(), 1);
    wait_until(|| {
        (a.shuffle.finished.lock().expect("finished").contains(&job_id)
            && b.shuffle.finished.lock().expect("finished").contains(&job_id))
        .then_some(())
    })
    .await
    .expect("shuffle teardown on both nodes");

    // A terminal job answers status with an already-finished handle.
    let done = a
        .tracker
        .status(&job_id)
        .await
        .expect("status")
        .expect("metadata still live");
    assert_eq!(done.completion.wait().await, Ok(job_id));

    assert_eq!(*violations.lock().expect("violations"), Vec::<String>::new());
}

#[tokio::test]
async fn single_node_combiner_job_runs_combine_then_commit() {
    let cluster = StoreCluster::new();
    let a = TestNode::start(&cluster, "node-a", &["node-a"]);

    let job_id = a.tracker.next_job_id();
    let info = JobInfo::new(
        vec!["node-a:part-0".into(), "node-a:part-1".into()],
        "out",
        0,
    )
    .with_option(COMBINER_OPTION, "true");
    let handle = a.tracker.submit(job_id.clone(), info).await.expect("submit");

    let maps = a.internal.wait_for(TaskType::Map, 2).await;
    a.finish(&maps[0], TaskStatus::completed()).await;
    // No per-mapper acknowledgement with a combiner present.
    assert!(a.shuffle.flushes.lock().expect("flushes").is_empty());

    a.finish(&maps[1], TaskStatus::completed()).await;
    let combines = a.internal.wait_for(TaskType::Combine, 1).await;
    // Combine numbering starts past the split numbers.
    assert_eq!(combines[0].task_number, 2);

    a.finish(&combines[0], TaskStatus::completed()).await;
    let commits = a.internal.wait_for(TaskType::Commit, 1).await;
    a.finish(&commits[0], TaskStatus::completed()).await;

    assert_eq!(handle.wait().await, Ok(job_id));
    assert!(a.internal.tasks_of(TaskType::Reduce).is_empty());
    // One flush for the whole node, driven by the combine.
    assert_eq!(a.shuffle.flushes.lock().expect("flushes").len(), 1);
}

#[tokio::test]
async fn crashed_mapper_cancels_job_and_keeps_original_cause() {
    let cluster = StoreCluster::new();
    let a = TestNode::start(&cluster, "node-a", &["node-a", "node-b"]);
    let b = TestNode::start(&cluster, "node-b", &["node-a", "node-b"]);

    let job_id = a.tracker.next_job_id();
    let info = JobInfo::new(
        vec![
            "node-a:part-0".into(),
            "node-a:part-1".into(),
            "node-b:part-2".into(),
        ],
        "out",
        1,
    );
    let handle = a.tracker.submit(job_id.clone(), info).await.expect("submit");

    let a_maps = a.internal.wait_for(TaskType::Map, 2).await;
    let b_maps = b.internal.wait_for(TaskType::Map, 1).await;

    a.finish(&a_maps[0], TaskStatus::crashed(FailCause::task("split exploded")))
        .await;

    // Every node cancels its local execution exactly once.
    a.internal.wait_cancelled(&job_id).await;
    b.internal.wait_cancelled(&job_id).await;

    // In-flight attempts still report in; a late success and a late
    // cancellation failure are both benign and must not override the cause.
    a.finish(&a_maps[1], TaskStatus::completed()).await;
    b.finish(&b_maps[0], TaskStatus::failed(FailCause::task("cancelled")))
        .await;

    let aborts = a.internal.wait_for(TaskType::Abort, 1).await;
    a.finish(&aborts[0], TaskStatus::completed()).await;

    assert_eq!(
        handle.wait().await,
        Err(FmrError::TaskFailed("split exploded".into()))
    );
    assert!(b.internal.tasks_of(TaskType::Abort).is_empty());
    assert!(a.internal.tasks_of(TaskType::Commit).is_empty());
    assert!(b.internal.tasks_of(TaskType::Commit).is_empty());
}

#[tokio::test]
async fn node_loss_cancels_the_dead_nodes_share() {
    let cluster = StoreCluster::new();
    let a = TestNode::start(&cluster, "node-a", &["node-a", "node-b"]);
    let b = TestNode::start(&cluster, "node-b", &["node-a", "node-b"]);

    let job_id = a.tracker.next_job_id();
    let info = JobInfo::new(
        vec![
            "node-a:part-0".into(),
            "node-b:part-1".into(),
            "node-b:part-2".into(),
        ],
        "out",
        1,
    );
    let handle = a.tracker.submit(job_id.clone(), info).await.expect("submit");

    let a_maps = a.internal.wait_for(TaskType::Map, 1).await;
    let b_maps = b.internal.wait_for(TaskType::Map, 2).await;
    b.finish(&b_maps[0], TaskStatus::completed()).await;

    a.tracker.on_discovery_event(DiscoveryEvent {
        kind: DiscoveryEventKind::NodeFailed,
        node: b.node.clone(),
        live: [a.node.clone()].into(),
    });

    a.internal.wait_cancelled(&job_id).await;
    a.finish(&a_maps[0], TaskStatus::completed()).await;

    let aborts = a.internal.wait_for(TaskType::Abort, 1).await;
    a.finish(&aborts[0], TaskStatus::completed()).await;

    match handle.wait().await {
        Err(FmrError::NodeLoss(message)) => {
            assert!(message.contains("one or more nodes"));
        }
        other => panic!("expected node-loss failure, got {other:?}"),
    }
}

#[tokio::test]
async fn shutdown_fails_outstanding_futures_and_rejects_new_work() {
    let cluster = StoreCluster::new();
    let a = TestNode::start(&cluster, "node-a", &["node-a"]);

    let job_id = a.tracker.next_job_id();
    let info = JobInfo::new(vec!["node-a:part-0".into()], "out", 1);
    let handle = a.tracker.submit(job_id.clone(), info.clone()).await.expect("submit");
    a.internal.wait_for(TaskType::Map, 1).await;

    a.tracker.stop().await;

    match handle.wait().await {
        Err(FmrError::Stopping(_)) => {}
        other => panic!("expected stopping failure, got {other:?}"),
    }
    assert!(matches!(
        a.tracker.submit(a.tracker.next_job_id(), info).await,
        Err(FmrError::Stopping(_))
    ));
    assert!(matches!(
        a.tracker.status(&job_id).await,
        Err(FmrError::Stopping(_))
    ));
}

#[tokio::test]
async fn duplicate_submission_is_rejected() {
    let cluster = StoreCluster::new();
    let a = TestNode::start(&cluster, "node-a", &["node-a"]);

    let job_id = a.tracker.next_job_id();
    let info = JobInfo::new(vec!["node-a:part-0".into()], "out", 0);
    let _handle = a
        .tracker
        .submit(job_id.clone(), info.clone())
        .await
        .expect("first submit");
    assert!(matches!(
        a.tracker.submit(job_id, info).await,
        Err(FmrError::AlreadySubmitted(_))
    ));
}

#[tokio::test]
async fn zero_reducer_job_commits_without_reduce_tasks() {
    let cluster = StoreCluster::new();
    let a = TestNode::start(&cluster, "node-a", &["node-a"]);

    let job_id = a.tracker.next_job_id();
    let info = JobInfo::new(vec!["node-a:part-0".into()], "out", 0);
    let handle = a.tracker.submit(job_id.clone(), info).await.expect("submit");

    let maps = a.internal.wait_for(TaskType::Map, 1).await;
    a.finish(&maps[0], TaskStatus::completed()).await;

    let commits = a.internal.wait_for(TaskType::Commit, 1).await;
    a.finish(&commits[0], TaskStatus::completed()).await;

    assert_eq!(handle.wait().await, Ok(job_id));
    assert!(a.internal.tasks_of(TaskType::Reduce).is_empty());
}

#[tokio::test]
async fn shuffle_flush_failure_fails_the_job() {
    let cluster = StoreCluster::new();
    let a = TestNode::start(&cluster, "node-a", &["node-a"]);
    *a.shuffle.fail_flush.lock().expect("fail lock") = Some("disk full".into());

    let job_id = a.tracker.next_job_id();
    let info = JobInfo::new(vec!["node-a:part-0".into()], "out", 1);
    let handle = a.tracker.submit(job_id.clone(), info).await.expect("submit");

    let maps = a.internal.wait_for(TaskType::Map, 1).await;
    a.finish(&maps[0], TaskStatus::completed()).await;

    // Stripping the never-scheduled reducer empties both pending sets, so
    // the job completes straight from the cancel transform without an
    // abort task.
    a.internal.wait_cancelled(&job_id).await;
    assert_eq!(handle.wait().await, Err(FmrError::Shuffle("disk full".into())));
    assert!(a.internal.tasks_of(TaskType::Abort).is_empty());
}

#[tokio::test]
async fn external_execution_couples_map_and_reduce_scheduling() {
    let cluster = StoreCluster::new();
    let a = TestNode::start(&cluster, "node-a", &["node-a"]);

    let job_id = a.tracker.next_job_id();
    let info = JobInfo::new(vec!["node-a:part-0".into()], "out", 1)
        .with_option(fmr_model::job::OPT_EXTERNAL_EXECUTION, "true")
        .with_option(COMBINER_OPTION, "true");
    let handle = a.tracker.submit(job_id.clone(), info).await.expect("submit");

    // The external worker launches once per node per job, so the node's
    // mappers and reducers arrive in a single batch.
    let maps = a.external.wait_for(TaskType::Map, 1).await;
    let reduces = a.external.wait_for(TaskType::Reduce, 1).await;
    let coupled = a
        .external
        .runs
        .lock()
        .expect("runs lock")
        .iter()
        .any(|batch| {
            batch.iter().any(|t| t.task_type == TaskType::Map)
                && batch.iter().any(|t| t.task_type == TaskType::Reduce)
        });
    assert!(coupled, "mappers and reducers must be dispatched together");
    assert!(*a.external.state_changes.lock().expect("state changes") > 0);

    // The combiner runs inside the external process, never locally.
    a.finish(&maps[0], TaskStatus::completed()).await;
    assert!(a.internal.tasks_of(TaskType::Combine).is_empty());
    assert!(a.external.tasks_of(TaskType::Combine).is_empty());

    // The external process reports its combine; that acknowledges the
    // node's mappers.
    let combine = TaskInfo::combine(a.node.clone(), job_id.clone(), 1);
    a.finish(&combine, TaskStatus::completed()).await;
    a.finish(&reduces[0], TaskStatus::completed()).await;

    // Commit and abort always run on the internal executor.
    let commits = a.internal.wait_for(TaskType::Commit, 1).await;
    a.finish(&commits[0], TaskStatus::completed()).await;
    assert!(a.external.tasks_of(TaskType::Commit).is_empty());

    assert_eq!(handle.wait().await, Ok(job_id));
}

#[tokio::test]
async fn status_of_unknown_job_is_none() {
    let cluster = StoreCluster::new();
    let a = TestNode::start(&cluster, "node-a", &["node-a"]);
    let job_id = JobId::new(NodeId::new("node-z"), 42);
    assert!(a.tracker.status(&job_id).await.expect("status").is_none());
    assert!(a.tracker.plan(&job_id).await.expect("plan").is_none());
    assert!(a.tracker.job(&job_id).await.expect("job").is_none());
}
