//! # R0N Dispatcher
//!
//! A reverse-proxy dispatcher that spreads HTTP traffic over a set of
//! backends in round-robin order, takes failing backends out of rotation
//! and brings them back once they answer again, and limits every client
//! with a token bucket kept in a shared store.
//!
//! ## Features
//!
//! - Round-robin selection that skips dead backends
//! - Background TCP health checks
//! - Failover with bounded linear backoff
//! - Per-client token buckets in redis or in memory
//! - TOML configuration with hot reload of the backends file
//!
//! ## Layout
//!
//! - [`config`] - configuration types, loader and backends file watcher
//! - [`modules::load_balancer`] - backends, selection, health checks, failover
//! - [`modules::rate_limiting`] - token buckets, stores and the limiter
//! - [`modules::http_handler`] - listener and request pipeline
//! - [`modules::logging`] - `tracing` subscriber setup

pub mod config;
pub mod modules;
