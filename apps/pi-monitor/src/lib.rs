#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Pi Monitor - Live Telemetry Stream
//!
//! An HTTP service that samples a Raspberry Pi's temperature, clock, core
//! voltage and memory use once per interval and pushes every reading to all
//! connected browsers over Server-Sent Events, together with a live count of
//! how many people are watching.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Metric kinds, raw output formatting and the event type
//!   - `metric`: `MetricKind` and its formatting rules
//!   - `event`: The `(kind, payload)` pair delivered to viewers
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: `MetricSource`, the seam to the host's tools
//!   - `services`: Periodic producers, one per metric
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `broker`: Fan-out from producers to sessions
//!   - `source`: `vcgencmd` / `free` command runner
//!   - `http`: SSE sessions, static front-end, router and server
//!   - `health`: Health, readiness and Prometheus endpoints
//!   - `config`, `metrics`, `telemetry`: Ambient setup
//!
//! # Data Flow
//!
//! ```text
//! vcgencmd ──┐
//!            │   ┌───────────┐     ┌──────────┐     ┌──────────┐
//! free ──────┼──►│ Producers │────►│  Broker  │────►│ Sessions │──► Browser 1
//!            │   └───────────┘     └──────────┘     │  (SSE)   │──► Browser 2
//! viewers ───┘         ▲                 │          └──────────┘──► Browser N
//!                      └─────count───────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Metric and event types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::event::Event;
pub use domain::metric::{FormatError, MetricKind};

// Ports and services
pub use application::ports::{MetricSource, SourceError};
pub use application::services::{MetricProducer, ProducerConfig, ProducerSet, ProducerState};

// Infrastructure config
pub use infrastructure::config::{
    BrokerSettings, ConfigError, MonitorConfig, ProducerSettings, ServerSettings,
};

// Broker
pub use infrastructure::broker::{
    BrokerConfig, BrokerError, BrokerStats, EventBroker, SharedBroker, Subscription,
};

// Metric source
pub use infrastructure::source::{CommandSource, CommandSourceConfig};

// HTTP server
pub use infrastructure::http::{AppState, HttpServer, ServerError, router};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
