//! Health Check and Metrics Endpoints
//!
//! Health, readiness and Prometheus handlers mounted on the main HTTP router.
//!
//! # Endpoints
//!
//! - `GET /health` - Returns JSON health status
//! - `GET /healthz` - Liveness probe (simple OK)
//! - `GET /readyz` - Readiness probe (every producer has sampled)
//! - `GET /metrics` - Prometheus metrics in text format

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::application::services::{ProducerState, ProducerStatus};
use crate::infrastructure::broker::BrokerStats;
use crate::infrastructure::http::AppState;
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy", "degraded", or "unhealthy".
    pub status: HealthStatus,
    /// Monitor version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Connected viewers.
    pub subscribers: usize,
    /// Broker counters.
    pub broker: BrokerStats,
    /// Per-metric sampling status.
    pub producers: Vec<ProducerStatus>,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Every producer's last sample succeeded.
    Healthy,
    /// Some producers are failing.
    Degraded,
    /// No command-backed metric can be read.
    Unhealthy,
}

// =============================================================================
// HTTP Handlers
// =============================================================================

/// `GET /health`
pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

/// `GET /healthz`
pub async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// `GET /readyz`
pub async fn readiness_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if is_ready(&state.producers) {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

/// `GET /metrics`
pub async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

fn build_health_response(state: &AppState) -> HealthResponse {
    let broker = state.broker.stats();

    HealthResponse {
        status: determine_health_status(&state.producers),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        subscribers: broker.subscribers,
        broker,
        producers: state.producers.iter().map(|p| p.status()).collect(),
    }
}

fn determine_health_status(producers: &[Arc<ProducerState>]) -> HealthStatus {
    let sampled: Vec<_> = producers.iter().filter(|p| p.kind().is_sampled()).collect();
    let failing = sampled.iter().filter(|p| !p.is_ok()).count();

    if !sampled.is_empty() && failing == sampled.len() {
        HealthStatus::Unhealthy
    } else if producers.iter().any(|p| !p.is_ok()) {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}

fn is_ready(producers: &[Arc<ProducerState>]) -> bool {
    producers.iter().all(|p| p.has_sampled())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::metric::MetricKind;

    fn states(ok: &[(MetricKind, bool)]) -> Vec<Arc<ProducerState>> {
        ok.iter()
            .map(|&(kind, ok)| {
                let state = ProducerState::new(kind);
                if ok {
                    state.record_success();
                } else {
                    state.record_failure("boom".to_string());
                }
                Arc::new(state)
            })
            .collect()
    }

    #[test]
    fn health_status_serialization() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Healthy).unwrap(),
            "\"healthy\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Degraded).unwrap(),
            "\"degraded\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Unhealthy).unwrap(),
            "\"unhealthy\""
        );
    }

    #[test]
    fn determine_status_all_ok() {
        let producers = states(&MetricKind::ALL.map(|k| (k, true)));
        assert_eq!(determine_health_status(&producers), HealthStatus::Healthy);
    }

    #[test]
    fn determine_status_partial() {
        let producers = states(&[
            (MetricKind::Temp, false),
            (MetricKind::Clock, false),
            (MetricKind::Volt, false),
            (MetricKind::Mem, true),
            (MetricKind::Observers, true),
        ]);
        assert_eq!(determine_health_status(&producers), HealthStatus::Degraded);
    }

    #[test]
    fn determine_status_all_commands_failing() {
        let producers = states(&[
            (MetricKind::Temp, false),
            (MetricKind::Clock, false),
            (MetricKind::Volt, false),
            (MetricKind::Mem, false),
            (MetricKind::Observers, true),
        ]);
        assert_eq!(determine_health_status(&producers), HealthStatus::Unhealthy);
    }

    #[test]
    fn ready_once_every_producer_sampled() {
        let mut producers = states(&[(MetricKind::Temp, false), (MetricKind::Mem, true)]);
        assert!(is_ready(&producers));

        producers.push(Arc::new(ProducerState::new(MetricKind::Observers)));
        assert!(!is_ready(&producers));
    }
}
