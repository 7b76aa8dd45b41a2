//! Command-backed Metric Source
//!
//! Reads metrics by running the host's reporting tools:
//!
//! - `vcgencmd measure_temp` / `measure_clock arm` / `measure_volts core`
//! - `free -h`
//!
//! Each invocation is bounded by a timeout and killed if it overruns.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::ProducerSettings;
use crate::application::ports::{MetricSource, SourceError};
use crate::domain::metric::MetricKind;

/// Program and fixed arguments for one metric.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program to execute.
    pub program: String,
    /// Arguments passed verbatim.
    pub args: Vec<String>,
}

impl CommandSpec {
    fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Configuration for the command source.
#[derive(Debug, Clone)]
pub struct CommandSourceConfig {
    /// Path or name of `vcgencmd`.
    pub vcgencmd: String,
    /// Path or name of `free`.
    pub free: String,
    /// Maximum time a single command may run.
    pub timeout: Duration,
}

impl Default for CommandSourceConfig {
    fn default() -> Self {
        Self {
            vcgencmd: "vcgencmd".to_string(),
            free: "free".to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}

impl From<&ProducerSettings> for CommandSourceConfig {
    fn from(settings: &ProducerSettings) -> Self {
        Self {
            vcgencmd: settings.vcgencmd.clone(),
            free: settings.free.clone(),
            timeout: settings.command_timeout,
        }
    }
}

/// Metric source that shells out to OS tools.
#[derive(Debug, Clone, Default)]
pub struct CommandSource {
    config: CommandSourceConfig,
}

impl CommandSource {
    /// Create a new command source.
    #[must_use]
    pub const fn new(config: CommandSourceConfig) -> Self {
        Self { config }
    }

    /// Command used to sample a metric, if it has one.
    #[must_use]
    pub fn command_for(&self, kind: MetricKind) -> Option<CommandSpec> {
        let vcgencmd = self.config.vcgencmd.as_str();
        match kind {
            MetricKind::Temp => Some(CommandSpec::new(vcgencmd, &["measure_temp"])),
            MetricKind::Clock => Some(CommandSpec::new(vcgencmd, &["measure_clock", "arm"])),
            MetricKind::Volt => Some(CommandSpec::new(vcgencmd, &["measure_volts", "core"])),
            MetricKind::Mem => Some(CommandSpec::new(&self.config.free, &["-h"])),
            MetricKind::Observers => None,
        }
    }

    async fn run(&self, spec: &CommandSpec) -> Result<String, SourceError> {
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.config.timeout, command.output())
            .await
            .map_err(|_| SourceError::Timeout {
                program: spec.program.clone(),
                after: self.config.timeout,
            })?
            .map_err(|source| SourceError::Spawn {
                program: spec.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(SourceError::Exit {
                program: spec.program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        String::from_utf8(output.stdout).map_err(|_| SourceError::NotUtf8 {
            program: spec.program.clone(),
        })
    }
}

#[async_trait]
impl MetricSource for CommandSource {
    async fn read(&self, kind: MetricKind) -> Result<String, SourceError> {
        let spec = self.command_for(kind).ok_or(SourceError::NoCommand(kind))?;
        self.run(&spec).await
    }
}

// =============================================================================
// Tests
// =============================================================================
