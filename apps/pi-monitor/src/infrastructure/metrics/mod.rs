//! Prometheus Metrics Module
//!
//! Exposes application metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Events**: Published, delivered and dropped counts by metric kind
//! - **Sources**: Failed samples and sampling latency by metric kind
//! - **Sessions**: Active streaming sessions
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the HTTP server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::domain::metric::MetricKind;
use crate::infrastructure::broker::PublishReport;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if the recorder cannot be installed.
#[allow(clippy::expect_used)]
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "pi_monitor_events_published_total",
        "Total events published to the broker"
    );
    describe_counter!(
        "pi_monitor_events_delivered_total",
        "Total event deliveries to session queues"
    );
    describe_counter!(
        "pi_monitor_events_dropped_total",
        "Total event deliveries dropped because a session was not ready"
    );
    describe_counter!(
        "pi_monitor_source_failures_total",
        "Total failed metric samples"
    );

    describe_gauge!(
        "pi_monitor_sessions",
        "Number of open streaming sessions"
    );

    describe_histogram!(
        "pi_monitor_sample_duration_seconds",
        "Time to read and format one metric sample"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record one publish and its per-subscriber outcome.
pub fn record_event_published(kind: MetricKind, report: &PublishReport) {
    counter!("pi_monitor_events_published_total", "kind" => kind.as_str()).increment(1);
    if report.delivered > 0 {
        counter!("pi_monitor_events_delivered_total", "kind" => kind.as_str())
            .increment(report.delivered as u64);
    }
    if report.dropped > 0 {
        counter!("pi_monitor_events_dropped_total", "kind" => kind.as_str())
            .increment(report.dropped as u64);
    }
}

/// Record a failed sample.
pub fn record_source_failure(kind: MetricKind) {
    counter!("pi_monitor_source_failures_total", "kind" => kind.as_str()).increment(1);
}

/// Record how long a sample took.
pub fn record_sample_duration(kind: MetricKind, duration: Duration) {
    histogram!("pi_monitor_sample_duration_seconds", "kind" => kind.as_str())
        .record(duration.as_secs_f64());
}

/// Record a session opening.
pub fn session_opened() {
    gauge!("pi_monitor_sessions").increment(1.0);
}

/// Record a session closing.
pub fn session_closed() {
    gauge!("pi_monitor_sessions").decrement(1.0);
}

// =============================================================================
// Tests
// =============================================================================
