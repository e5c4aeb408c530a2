//! # Configuration System
//!
//! TOML-based configuration for the dispatcher: one main file plus an
//! optional backends file that can be hot-reloaded.
//!
//! ## Example Configuration
//!
//! ```toml
//! [http]
//! listen_port = 8080
//!
//! [balancer]
//! strategy = "round_robin"
//! backends_file = "configs/backends.toml"
//! watch_backends = true
//!
//! [bucket]
//! capacity = 10
//! refil_rate = 1
//! refil_time = "1s"
//!
//! [store]
//! kind = "redis"
//! addr = "127.0.0.1:6379"
//!
//! [logging]
//! level = "info"
//! format = "json"
//! ```

mod error;
mod loader;
mod types;
mod watcher;

pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use types::DispatcherConfig;
pub use watcher::BackendsWatcher;
