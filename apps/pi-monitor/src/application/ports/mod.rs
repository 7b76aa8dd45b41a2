//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `MetricSource`: reads the raw text of one metric from the host

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::metric::MetricKind;

/// Source of raw metric text (an OS command in production).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Read the raw output for a metric.
    ///
    /// # Errors
    ///
    /// Returns `SourceError` if the source cannot be invoked, fails, or
    /// produces output that is not valid UTF-8.
    async fn read(&self, kind: MetricKind) -> Result<String, SourceError>;
}

/// Failure reading a metric source. Always recoverable.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The command could not be started.
    #[error("failed to run {program}: {source}")]
    Spawn {
        /// Program name.
        program: String,
        /// I/O error from the spawn.
        source: std::io::Error,
    },

    /// The command exited unsuccessfully.
    #[error("{program} exited with {status}: {stderr}")]
    Exit {
        /// Program name.
        program: String,
        /// Exit status description.
        status: String,
        /// Captured standard error, trimmed.
        stderr: String,
    },

    /// Standard output was not UTF-8.
    #[error("{program} produced non-UTF-8 output")]
    NotUtf8 {
        /// Program name.
        program: String,
    },

    /// The command did not finish in time.
    #[error("{program} timed out after {after:?}")]
    Timeout {
        /// Program name.
        program: String,
        /// Configured timeout.
        after: Duration,
    },

    /// No command is configured for this metric.
    #[error("no source command for metric {0}")]
    NoCommand(MetricKind),
}
