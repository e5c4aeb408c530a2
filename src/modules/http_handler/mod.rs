//! # HTTP Front
//!
//! Accepts HTTP/1.1 connections and runs every request through the same
//! pipeline:
//!
//! ```text
//! accept ─► RateLimitMiddleware ─► LoadBalancer::dispatch ─► backend
//!               │ 429 / 500             │ 503 / 502
//!               └────────── response ◄──┘
//! ```
//!
//! Fixed error bodies live in [`response`].

pub mod config;
pub mod error;
pub mod handler;
pub mod listener;
pub mod middleware;
pub mod response;

pub use config::HttpConfig;
pub use error::{HttpError, HttpResult};
pub use handler::{Dispatcher, HttpStats};
pub use listener::HttpListener;
pub use middleware::{MiddlewareAction, RateLimitMiddleware};
pub use response::{BoxError, ProxyBody};
