//! Domain Layer - Core telemetry types and formatting rules.
//!
//! This layer contains the metric vocabulary and the event type that flows
//! through the broker. It has no I/O and no async code.

/// Telemetry events exchanged between producers and sessions.
pub mod event;

/// Metric kinds and raw-output formatting.
pub mod metric;
