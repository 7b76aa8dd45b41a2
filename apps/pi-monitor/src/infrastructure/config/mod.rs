//! Configuration Module
//!
//! Configuration loading for the monitor service.

mod settings;

pub use settings::{BrokerSettings, ConfigError, MonitorConfig, ProducerSettings, ServerSettings};
