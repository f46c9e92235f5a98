use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Global metrics instance.
pub static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Metrics collector for the food log service.
#[derive(Debug, Clone)]
pub struct Metrics {
    initialized: bool,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self { initialized: true }
    }

    pub fn record_idempotency_outcome(&self, outcome: &str) {
        counter!("idempotency_requests_total", "outcome" => outcome.to_string()).increment(1);
    }

    pub fn record_job_run(&self, job: &str, success: bool, duration_ms: f64, items: u64) {
        counter!("scheduler_job_runs_total", "job" => job.to_string(), "success" => success.to_string()).increment(1);
        histogram!("scheduler_job_duration_ms", "job" => job.to_string()).record(duration_ms);
        if success {
            counter!("scheduler_job_items_total", "job" => job.to_string()).increment(items);
        }
    }

    pub fn record_job_skipped(&self, job: &str) {
        counter!("scheduler_job_skipped_total", "job" => job.to_string()).increment(1);
    }

    pub fn record_food_log_created(&self) {
        counter!("food_logs_created_total").increment(1);
    }

    pub fn record_db_query(&self, query_type: &str, duration_ms: f64, success: bool) {
        counter!("db_queries_total", "type" => query_type.to_string(), "success" => success.to_string()).increment(1);
        histogram!("db_query_duration_ms", "type" => query_type.to_string()).record(duration_ms);
    }
}

/// Timer for measuring operation latency.
pub struct LatencyTimer {
    start: Instant,
}

impl LatencyTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for LatencyTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Initializes the metrics system and returns the Prometheus handle.
pub fn init_metrics() -> PrometheusHandle {
    let handle = METRICS_HANDLE.get_or_init(|| {
        let builder = PrometheusBuilder::new();
        let handle = builder
            .install_recorder()
            .expect("Failed to install Prometheus recorder");

        describe_metrics();
        handle
    });

    METRICS.get_or_init(Metrics::new);

    handle.clone()
}

/// Describes all metrics for Prometheus.
fn describe_metrics() {
    describe_counter!("idempotency_requests_total", Unit::Count, "Idempotency layer outcomes by kind");

    describe_counter!("scheduler_job_runs_total", Unit::Count, "Total job ticks executed");
    describe_histogram!("scheduler_job_duration_ms", Unit::Milliseconds, "Job tick latency in milliseconds");
    describe_counter!("scheduler_job_items_total", Unit::Count, "Items processed by successful job ticks");
    describe_counter!("scheduler_job_skipped_total", Unit::Count, "Ticks skipped because the previous run was still active");

    describe_counter!("food_logs_created_total", Unit::Count, "Total food log entries created");

    describe_counter!("db_queries_total", Unit::Count, "Total database queries");
    describe_histogram!("db_query_duration_ms", Unit::Milliseconds, "Database query latency in milliseconds");
}

/// Returns the global metrics instance.
pub fn get_metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}
