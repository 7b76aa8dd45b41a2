//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the producer services and the port interface
//! they use to reach the host's metric sources.

/// Port interfaces for external systems (metric sources).
pub mod ports;

/// Application services for metric production.
pub mod services;
