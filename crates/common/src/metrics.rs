use std::sync::{Arc, OnceLock};

use prometheus::{CounterVec, Encoder, GaugeVec, Opts, Registry, TextEncoder};

/// Cheap-to-clone registry of tracker metrics with Prometheus rendering.
#[derive(Clone, Debug)]
pub struct MetricsRegistry {
    inner: Arc<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    registry: Registry,
    jobs_submitted: CounterVec,
    jobs_completed: CounterVec,
    tasks_submitted: CounterVec,
    transforms_applied: CounterVec,
    active_jobs: GaugeVec,
}

impl MetricsRegistry {
    /// Create an empty registry with all fmr metric families registered.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner::new()),
        }
    }

    /// Count one job submission on this node.
    pub fn inc_jobs_submitted(&self, node: &str) {
        self.inner
            .jobs_submitted
            .with_label_values(&[node])
            .inc();
    }

    /// Count one locally observed job completion with its outcome
    /// (`"success"`, `"failed"`, or `"cancelled"`).
    pub fn inc_jobs_completed(&self, node: &str, outcome: &str) {
        self.inner
            .jobs_completed
            .with_label_values(&[node, outcome])
            .inc();
    }

    /// Count tasks handed to a local executor, by task type.
    pub fn inc_tasks_submitted(&self, node: &str, task_type: &str, count: u64) {
        self.inner
            .tasks_submitted
            .with_label_values(&[node, task_type])
            .inc_by(count as f64);
    }

    /// Count metadata transforms applied by the local store replica, by kind.
    pub fn inc_transforms_applied(&self, kind: &str) {
        self.inner
            .transforms_applied
            .with_label_values(&[kind])
            .inc();
    }

    /// Record the number of jobs with live local state on this node.
    pub fn set_active_jobs(&self, node: &str, active: u64) {
        self.inner
            .active_jobs
            .with_label_values(&[node])
            .set(active as f64);
    }

    /// Render all registered families in Prometheus text format.
    pub fn render_prometheus(&self) -> String {
        let metric_families = self.inner.registry.gather();
        let mut out = Vec::new();
        let enc = TextEncoder::new();
        if enc.encode(&metric_families, &mut out).is_err() {
            return String::new();
        }
        String::from_utf8_lossy(&out).to_string()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsInner {
    fn new() -> Self {
        let registry = Registry::new();

        let jobs_submitted = counter_vec(
            &registry,
            "fmr_jobs_submitted_total",
            "Jobs submitted on this node",
            &["node"],
        );
        let jobs_completed = counter_vec(
            &registry,
            "fmr_jobs_completed_total",
            "Job completions observed locally, by outcome",
            &["node", "outcome"],
        );
        let tasks_submitted = counter_vec(
            &registry,
            "fmr_tasks_submitted_total",
            "Tasks handed to local executors, by type",
            &["node", "task_type"],
        );
        let transforms_applied = counter_vec(
            &registry,
            "fmr_meta_transforms_applied_total",
            "Metadata transforms applied by the local store replica, by kind",
            &["kind"],
        );
        let active_jobs = gauge_vec(
            &registry,
            "fmr_active_jobs",
            "Jobs with live local state on this node",
            &["node"],
        );

        Self {
            registry,
            jobs_submitted,
            jobs_completed,
            tasks_submitted,
            transforms_applied,
            active_jobs,
        }
    }
}

fn counter_vec(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> CounterVec {
    let c = CounterVec::new(Opts::new(name, help), labels).expect("counter vec");
    registry
        .register(Box::new(c.clone()))
        .expect("register counter");
    c
}

fn gauge_vec(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> GaugeVec {
    let g = GaugeVec::new(Opts::new(name, help), labels).expect("gauge vec");
    registry
        .register(Box::new(g.clone()))
        .expect("register gauge");
    g
}

static GLOBAL_METRICS: OnceLock<MetricsRegistry> = OnceLock::new();

/// Process-wide metrics registry shared by every tracker component.
pub fn global_metrics() -> &'static MetricsRegistry {
    GLOBAL_METRICS.get_or_init(MetricsRegistry::new)
}
