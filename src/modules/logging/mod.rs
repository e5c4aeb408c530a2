//! # Logging Module
//!
//! Structured logging through `tracing` with a `tracing-subscriber` fmt
//! layer. Level, format and output come from the `[logging]` section of
//! the configuration file.
//!
//! ## Features
//!
//! - JSON, pretty and compact output
//! - stdout, stderr or an append-only file
//! - `RUST_LOG` overrides the configured level

pub mod config;
pub mod error;
pub mod subscriber;

pub use config::{LogFormat, LogLevel, LogOutput, LoggingConfig};
pub use error::{LogError, LogResult};
pub use subscriber::init;
