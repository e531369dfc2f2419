//! Metrics recorder (spec §4.E).
//!
//! Wraps the `metrics` facade (recorded by a `metrics-exporter-prometheus`
//! recorder installed once at start-up) behind a small API so dispatcher
//! wrappers never touch `counter!`/`histogram!`/`gauge!` call sites directly —
//! the single-deferred-cleanup pattern spec §9 asks for.

use crate::errors::ErrorReason;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use sha2::{Digest, Sha256};
use std::time::Instant;

/// Bucket boundaries for `duration_seconds`, in milliseconds (spec §4.E).
const DURATION_BUCKETS_MS: &[f64] = &[
    1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0,
];

/// Installs the process-wide Prometheus recorder and exposes its render
/// handle (wired to the HTTP transport's metrics endpoint).
pub fn install_recorder() -> anyhow::Result<PrometheusHandle> {
    let buckets: Vec<f64> = DURATION_BUCKETS_MS.iter().map(|ms| ms / 1000.0).collect();
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Full("duration_seconds".to_string()),
            &buckets,
        )?
        .install_recorder()?;
    Ok(handle)
}

/// Hashes a project id into a short digest for gauge labels, bounding label
/// cardinality (spec §4.E: "Project IDs appear as hashed short digests in
/// gauge labels, not raw").
pub fn hashed_project_label(project_id: &str) -> String {
    if project_id.is_empty() {
        return String::new();
    }
    let mut hasher = Sha256::new();
    hasher.update(project_id.as_bytes());
    hex::encode(hasher.finalize())[..12].to_string()
}

/// An in-flight invocation timer, returned by `start_timer`. Dropping it
/// without calling `finish` still decrements the active gauge and records a
/// terminal `internal_error` outcome (see `Drop` impl), so a panicking
/// handler can never leave the gauge stuck high or an invocation unrecorded.
pub struct InvocationTimer {
    tool: String,
    start: Instant,
    finished: bool,
}

impl InvocationTimer {
    fn new(tool: &str) -> Self {
        gauge!("active_requests", "tool" => tool.to_string()).increment(1.0);
        Self {
            tool: tool.to_string(),
            start: Instant::now(),
            finished: false,
        }
    }

    pub fn tool(&self) -> &str {
        &self.tool
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Record the terminal outcome for this invocation and decrement the
    /// active gauge. `reason` is `None` on success, `Some(reason)` on
    /// failure — exactly one `errors_total` increment happens either way.
    pub fn finish(mut self, recorder: &MetricsRecorder, reason: Option<ErrorReason>) {
        recorder.record_invocation(&self.tool, self.elapsed_secs());
        if let Some(reason) = reason {
            recorder.record_error(&self.tool, reason);
        }
        gauge!("active_requests", "tool" => self.tool.clone()).decrement(1.0);
        self.finished = true;
    }
}

impl Drop for InvocationTimer {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        // The caller never reached `finish` — e.g. the handler panicked and
        // the dispatcher's guard never ran. Still balance the gauge and
        // record the invocation so spec §8's "balanced active_requests"
        // property holds on every exit path, including a panic.
        let recorder = MetricsRecorder::new();
        recorder.record_invocation(&self.tool, self.elapsed_secs());
        recorder.record_error(&self.tool, ErrorReason::InternalError);
        gauge!("active_requests", "tool" => self.tool.clone()).decrement(1.0);
    }
}

/// Entry point for dispatcher wrappers (spec §4.F contract step 4).
#[derive(Debug, Clone, Default)]
pub struct MetricsRecorder;

impl MetricsRecorder {
    pub fn new() -> Self {
        Self
    }

    /// Start timing one tool invocation. The gauge is incremented here and
    /// guaranteed to be decremented exactly once, whether the caller calls
    /// `finish` or simply drops the timer on an early return or panic.
    pub fn start_timer(&self, tool: &str) -> InvocationTimer {
        InvocationTimer::new(tool)
    }

    /// Record one `invocations_total` increment and one `duration_seconds`
    /// observation for `tool`.
    pub fn record_invocation(&self, tool: &str, elapsed_secs: f64) {
        counter!("invocations_total", "tool" => tool.to_string()).increment(1);
        histogram!("duration_seconds", "tool" => tool.to_string()).record(elapsed_secs);
    }

    pub fn record_error(&self, tool: &str, reason: ErrorReason) {
        counter!("errors_total", "tool" => tool.to_string(), "reason" => reason.as_str())
            .increment(1);
    }
}
