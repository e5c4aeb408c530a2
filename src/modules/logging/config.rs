//! Logging configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Logging configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum log level, overridden by `RUST_LOG` when set
    pub level: LogLevel,

    /// Log output format
    pub format: LogFormat,

    /// Output target: `stdout`, `stderr` or a file path
    pub output: LogOutput,
}

/// Log level
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose - trace execution flow
    Trace,
    /// Debug information
    Debug,
    /// General information
    #[serde(alias = "INFO")]
    #[default]
    Info,
    /// Warnings
    #[serde(alias = "warning")]
    Warn,
    /// Errors
    Error,
}

impl LogLevel {
    /// Filter directive for this level
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format (structured)
    #[default]
    Json,
    /// Multi-line human readable format
    Pretty,
    /// Compact single-line format
    Compact,
}

/// Output target
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LogOutput {
    /// Standard output
    #[default]
    Stdout,
    /// Standard error
    Stderr,
    /// Append to a file
    File(PathBuf),
}

impl From<String> for LogOutput {
    fn from(s: String) -> Self {
        match s.as_str() {
            "" | "stdout" => Self::Stdout,
            "stderr" => Self::Stderr,
            _ => Self::File(PathBuf::from(s)),
        }
    }
}

impl From<LogOutput> for String {
    fn from(output: LogOutput) -> Self {
        match output {
            LogOutput::Stdout => "stdout".to_string(),
            LogOutput::Stderr => "stderr".to_string(),
            LogOutput::File(path) => path.display().to_string(),
        }
    }
}
