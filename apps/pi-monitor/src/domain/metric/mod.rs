//! Metric Kinds and Formatting
//!
//! The closed set of metrics the monitor publishes and the transform that
//! turns each source's raw text into its display string.
//!
//! | kind | raw | display |
//! |------|-----|---------|
//! | `temp` | `temp=42.8'C` | `42.8 °C` |
//! | `clock` | `frequency(45)=1500000000` | `1.50 GHz` |
//! | `volt` | `volt=0.8563V` | `0.8563 V` |
//! | `mem` | output of `free -h` | `312Mi / 976Mi` |
//! | `observers` | subscriber count | `2 people here` |

use std::fmt;
use std::num::ParseFloatError;

use thiserror::Error;

/// A metric published by the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    /// SoC temperature.
    Temp,
    /// ARM core clock frequency.
    Clock,
    /// Core voltage.
    Volt,
    /// Used and total memory.
    Mem,
    /// Number of connected viewers.
    Observers,
}

impl MetricKind {
    /// Every metric kind, in publishing order.
    pub const ALL: [Self; 5] = [
        Self::Temp,
        Self::Clock,
        Self::Volt,
        Self::Mem,
        Self::Observers,
    ];

    /// Metric kinds backed by an external command.
    pub const SAMPLED: [Self; 4] = [Self::Temp, Self::Clock, Self::Volt, Self::Mem];

    /// Wire name used as the SSE event type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Temp => "temp",
            Self::Clock => "clock",
            Self::Volt => "volt",
            Self::Mem => "mem",
            Self::Observers => "observers",
        }
    }

    /// Whether this metric is read from an external command.
    #[must_use]
    pub const fn is_sampled(self) -> bool {
        !matches!(self, Self::Observers)
    }

    /// Format raw command output into the display string.
    ///
    /// # Errors
    ///
    /// Returns `FormatError` when the output of `clock` or `mem` cannot be
    /// parsed, or when called for `observers`, which has no raw text.
    pub fn format(self, raw: &str) -> Result<String, FormatError> {
        match self {
            Self::Temp => Ok(format_temp(raw)),
            Self::Clock => format_clock(raw),
            Self::Volt => Ok(format_volt(raw)),
            Self::Mem => format_mem(raw),
            Self::Observers => Err(FormatError::NoExternalSource),
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors turning raw source text into a display string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    /// Expected separator not found.
    #[error("missing '{0}' separator")]
    MissingSeparator(char),

    /// Numeric field could not be parsed.
    #[error("invalid number {value:?}: {source}")]
    InvalidNumber {
        /// The offending text.
        value: String,
        /// Parser error.
        source: ParseFloatError,
    },

    /// Output had fewer lines than required.
    #[error("unexpected output format: expected at least {expected} lines, got {found}")]
    TooFewLines {
        /// Lines required.
        expected: usize,
        /// Lines present.
        found: usize,
    },

    /// A line had fewer fields than required.
    #[error("unexpected output format: expected at least {expected} fields, got {found}")]
    TooFewFields {
        /// Fields required.
        expected: usize,
        /// Fields present.
        found: usize,
    },

    /// The metric is derived in-process and has no raw text to format.
    #[error("metric has no external source")]
    NoExternalSource,
}

fn strip_newline(raw: &str) -> &str {
    raw.strip_suffix('\n').unwrap_or(raw)
}

fn strip_affixes<'a>(raw: &'a str, prefix: &str, suffix: &str) -> &'a str {
    let trimmed = strip_newline(raw);
    let trimmed = trimmed.strip_suffix(suffix).unwrap_or(trimmed);
    trimmed.strip_prefix(prefix).unwrap_or(trimmed)
}

fn format_temp(raw: &str) -> String {
    format!("{} °C", strip_affixes(raw, "temp=", "'C"))
}

fn format_volt(raw: &str) -> String {
    format!("{} V", strip_affixes(raw, "volt=", "V"))
}

fn format_clock(raw: &str) -> Result<String, FormatError> {
    let value = strip_newline(raw)
        .split('=')
        .nth(1)
        .ok_or(FormatError::MissingSeparator('='))?;
    let hz: f64 = value.parse().map_err(|source| FormatError::InvalidNumber {
        value: value.to_string(),
        source,
    })?;
    Ok(format!("{:.2} GHz", hz / 1e9))
}

fn format_mem(raw: &str) -> Result<String, FormatError> {
    let lines: Vec<&str> = raw.split('\n').collect();
    if lines.len() < 2 {
        return Err(FormatError::TooFewLines {
            expected: 2,
            found: lines.len(),
        });
    }

    // Mem: <total> <used> <free> ...
    let fields: Vec<&str> = lines[1].split_whitespace().collect();
    if fields.len() < 3 {
        return Err(FormatError::TooFewFields {
            expected: 3,
            found: fields.len(),
        });
    }

    Ok(format!("{} / {}", fields[2], fields[1]))
}

/// Display string for the viewer count.
#[must_use]
pub fn format_observers(count: usize) -> String {
    if count == 1 {
        "1 person here".to_string()
    } else {
        format!("{count} people here")
    }
}
