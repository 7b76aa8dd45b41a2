//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the event broker, the command-backed metric source,
//! the HTTP surface and the process-wide observability setup.

/// In-memory fan-out of events to streaming sessions.
pub mod broker;

/// Configuration loading.
pub mod config;

/// Health check and metrics endpoints.
pub mod health;

/// HTTP server, SSE sessions and static front-end.
pub mod http;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Metric source backed by host commands.
pub mod source;

/// Logging and OpenTelemetry tracing.
pub mod telemetry;
