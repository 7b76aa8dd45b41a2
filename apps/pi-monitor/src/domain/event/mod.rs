//! Telemetry Events
//!
//! The unit of data flowing from producers through the broker to sessions.
//! An event carries the metric kind and a payload that is already formatted
//! for display; nothing downstream re-interprets it.

use std::fmt;

use super::metric::MetricKind;

/// Payload published when a metric source fails.
pub const SENTINEL_PAYLOAD: &str = "-";

/// One metric sample, immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    kind: MetricKind,
    payload: String,
}

impl Event {
    /// Create an event for a metric with a formatted payload.
    #[must_use]
    pub fn new(kind: MetricKind, payload: impl Into<String>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    /// Create the placeholder event published when sampling fails.
    #[must_use]
    pub fn sentinel(kind: MetricKind) -> Self {
        Self::new(kind, SENTINEL_PAYLOAD)
    }

    /// Metric kind of this event.
    #[must_use]
    pub const fn kind(&self) -> MetricKind {
        self.kind
    }

    /// Wire name of the metric kind (`temp`, `clock`, ...).
    #[must_use]
    pub const fn kind_str(&self) -> &'static str {
        self.kind.as_str()
    }

    /// Formatted payload.
    #[must_use]
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Whether this is a sentinel (failed sample) event.
    #[must_use]
    pub fn is_sentinel(&self) -> bool {
        self.payload == SENTINEL_PAYLOAD
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.kind, self.payload)
    }
}
