//! # Load Balancer Module
//!
//! Round-robin distribution of HTTP requests across an ordered backend set,
//! with passive failover on proxy errors and an active TCP health sweep.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │     LoadBalancer     │
//! │                      │      ┌──────────────────────────┐
//! │  ┌───────────────┐   │      │ Backend                  │
//! │  │  Round-robin  │───┼────▶│  alive flag              │
//! │  │   strategy    │   │      │  ReverseProxy            │
//! │  └───────────────┘   │      │  FailoverHandler ─ retry │
//! │  ┌───────────────┐   │      └──────────────────────────┘
//! │  │ Health sweep  │───┼────▶ TCP probe per backend
//! │  └───────────────┘   │
//! └──────────────────────┘
//! ```

pub mod backend;
pub mod balancer;
pub mod config;
pub mod error;
pub mod failover;
pub mod health;
pub mod proxy;
pub mod retry;
pub mod strategy;

pub use backend::{Backend, BackendPool, PROBE_TIMEOUT};
pub use balancer::{LoadBalancer, LoadBalancerStats};
pub use config::{BackendEntry, BackendsFile, BalancerConfig, RetryConfig};
pub use error::{LoadBalancerError, LoadBalancerResult};
pub use failover::{FailoverHandler, Recovery};
pub use health::{HealthCheck, HealthCheckResult, HealthCheckTask, HealthStatus};
pub use proxy::{http_client, parse_backend_url, HttpClient, ReverseProxy};
pub use retry::RetryPolicy;
pub use strategy::{RoundRobinStrategy, Strategy, StrategyContainer, StrategyType};
