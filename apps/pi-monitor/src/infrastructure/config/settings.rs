//! Monitor Configuration Settings
//!
//! Configuration types for the monitor, loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Interface to bind.
    pub host: String,
    /// HTTP port serving the stream, front-end and health endpoints.
    pub port: u16,
    /// Directory holding the web front-end.
    pub static_dir: PathBuf,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            static_dir: PathBuf::from("web"),
        }
    }
}

/// Metric producer settings.
#[derive(Debug, Clone)]
pub struct ProducerSettings {
    /// Time between samples of each metric.
    pub interval: Duration,
    /// Maximum run time of a single metric command.
    pub command_timeout: Duration,
    /// Path or name of `vcgencmd`.
    pub vcgencmd: String,
    /// Path or name of `free`.
    pub free: String,
    /// Publish the viewer count as soon as it changes, not only on ticks.
    pub observers_eager: bool,
}

impl Default for ProducerSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            command_timeout: Duration::from_secs(5),
            vcgencmd: "vcgencmd".to_string(),
            free: "free".to_string(),
            observers_eager: false,
        }
    }
}

/// Event broker settings.
#[derive(Debug, Clone, Copy)]
pub struct BrokerSettings {
    /// Events a session may have queued before further events are dropped.
    pub subscriber_capacity: usize,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            subscriber_capacity: 16,
        }
    }
}

/// Complete monitor configuration.
#[derive(Debug, Clone, Default)]
pub struct MonitorConfig {
    /// HTTP server settings.
    pub server: ServerSettings,
    /// Metric producer settings.
    pub producers: ProducerSettings,
    /// Event broker settings.
    pub broker: BrokerSettings,
}

impl MonitorConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is present but out of range.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// Unparsable values fall back to their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the interval, timeout or capacity is zero.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let server_defaults = ServerSettings::default();
        let server = ServerSettings {
            host: lookup("PI_MONITOR_HOST")
                .filter(|v| !v.is_empty())
                .unwrap_or(server_defaults.host),
            port: parse_or(&lookup, "PI_MONITOR_PORT", server_defaults.port),
            static_dir: lookup("PI_MONITOR_STATIC_DIR")
                .filter(|v| !v.is_empty())
                .map_or(server_defaults.static_dir, PathBuf::from),
        };

        let producer_defaults = ProducerSettings::default();
        let producers = ProducerSettings {
            interval: parse_duration_millis(
                &lookup,
                "PI_MONITOR_SAMPLE_INTERVAL_MS",
                producer_defaults.interval,
            ),
            command_timeout: parse_duration_millis(
                &lookup,
                "PI_MONITOR_COMMAND_TIMEOUT_MS",
                producer_defaults.command_timeout,
            ),
            vcgencmd: lookup("PI_MONITOR_VCGENCMD")
                .filter(|v| !v.is_empty())
                .unwrap_or(producer_defaults.vcgencmd),
            free: lookup("PI_MONITOR_FREE")
                .filter(|v| !v.is_empty())
                .unwrap_or(producer_defaults.free),
            observers_eager: parse_or(
                &lookup,
                "PI_MONITOR_OBSERVERS_EAGER",
                producer_defaults.observers_eager,
            ),
        };

        let broker = BrokerSettings {
            subscriber_capacity: parse_or(
                &lookup,
                "PI_MONITOR_SUBSCRIBER_CAPACITY",
                BrokerSettings::default().subscriber_capacity,
            ),
        };

        let config = Self {
            server,
            producers,
            broker,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.producers.interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "PI_MONITOR_SAMPLE_INTERVAL_MS",
                reason: "must be greater than zero",
            });
        }
        if self.producers.command_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "PI_MONITOR_COMMAND_TIMEOUT_MS",
                reason: "must be greater than zero",
            });
        }
        if self.broker.subscriber_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "PI_MONITOR_SUBSCRIBER_CAPACITY",
                reason: "must be greater than zero",
            });
        }
        Ok(())
    }

    /// Address the HTTP server binds to.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A value is present but not acceptable.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue {
        /// Environment variable name.
        key: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_duration_millis(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Duration {
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
