//! Logging error types

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Result type for logging operations
pub type LogResult<T> = Result<T, LogError>;

/// Logging errors
#[derive(Debug)]
pub enum LogError {
    /// The log file could not be opened
    OpenFile {
        /// Requested path
        path: PathBuf,
        /// Underlying IO error
        source: io::Error,
    },

    /// A global subscriber is already installed or the filter is invalid
    Init(String),
}

impl fmt::Display for LogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenFile { path, source } => {
                write!(f, "failed to open log file '{}': {}", path.display(), source)
            },
            Self::Init(msg) => write!(f, "failed to initialize logging: {}", msg),
        }
    }
}

impl std::error::Error for LogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::OpenFile { source, .. } => Some(source),
            Self::Init(_) => None,
        }
    }
}
