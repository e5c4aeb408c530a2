//! # Dispatcher Modules
//!
//! - [`load_balancer`] - Round-robin backend selection with health checks and failover
//! - [`rate_limiting`] - Token bucket rate limiting over a shared store
//! - [`http_handler`] - HTTP/1.1 listener and the rate limit + dispatch pipeline
//! - [`logging`] - Structured logging setup

pub mod http_handler;
pub mod load_balancer;
pub mod logging;
pub mod rate_limiting;
