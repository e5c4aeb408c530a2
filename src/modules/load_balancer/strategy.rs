//! Load balancing strategies.

use super::backend::Backend;
use super::error::{LoadBalancerError, LoadBalancerResult};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Known strategy names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyType {
    /// Strict insertion-order rotation.
    RoundRobin,
    /// Random pick. Recognized but not implemented.
    Random,
}

impl StrategyType {
    /// Configuration name of the strategy.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RoundRobin => "round_robin",
            Self::Random => "random",
        }
    }
}

impl FromStr for StrategyType {
    type Err = LoadBalancerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "round_robin" => Ok(Self::RoundRobin),
            "random" => Ok(Self::Random),
            other => Err(LoadBalancerError::StrategyNotFound(other.to_string())),
        }
    }
}

/// Trait for load balancing strategies.
///
/// `select` is called with the backend sequence while the caller holds the
/// pool read lock, so the slice cannot shrink underneath the scan.
pub trait Strategy: Send + Sync {
    /// Index of the chosen backend, or `None` when nothing is alive.
    fn select(&self, backends: &[Arc<Backend>]) -> Option<usize>;

    /// Reset internal position after the backend set is replaced.
    fn reset(&self) {}

    /// Get the strategy name.
    fn name(&self) -> &'static str;
}

/// Round-robin load balancing strategy.
#[derive(Debug, Default)]
pub struct RoundRobinStrategy {
    /// Monotonic cursor, meaningful modulo the backend count.
    current: AtomicUsize,
}

impl RoundRobinStrategy {
    /// Create a new round-robin strategy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current cursor value.
    #[must_use]
    pub fn cursor(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }
}

impl Strategy for RoundRobinStrategy {
    fn select(&self, backends: &[Arc<Backend>]) -> Option<usize> {
        let len = backends.len();
        if len == 0 {
            return None;
        }

        let next = self.current.fetch_add(1, Ordering::SeqCst).wrapping_add(1) % len;
        for offset in 0..len {
            let idx = (next + offset) % len;
            if backends[idx].is_alive() {
                if idx != next {
                    self.current.store(idx, Ordering::SeqCst);
                }
                return Some(idx);
            }
        }

        None
    }

    fn reset(&self) {
        self.current.store(0, Ordering::SeqCst);
    }

    fn name(&self) -> &'static str {
        "round_robin"
    }
}

/// Closed set of strategy implementations.
#[derive(Debug)]
pub enum StrategyContainer {
    /// Round-robin distribution.
    RoundRobin(RoundRobinStrategy),
}

impl StrategyContainer {
    /// Build the strategy for `strategy_type`.
    pub fn from_type(strategy_type: StrategyType) -> LoadBalancerResult<Self> {
        match strategy_type {
            StrategyType::RoundRobin => Ok(Self::RoundRobin(RoundRobinStrategy::new())),
            StrategyType::Random => Err(LoadBalancerError::StrategyNotImplemented(
                strategy_type.as_str().to_string(),
            )),
        }
    }

    /// Build the strategy for a configured name.
    pub fn from_name(name: &str) -> LoadBalancerResult<Self> {
        Self::from_type(name.parse()?)
    }

    /// Get the strategy as a trait object.
    pub fn as_strategy(&self) -> &dyn Strategy {
        match self {
            Self::RoundRobin(s) => s,
        }
    }

    /// Get strategy name.
    pub fn name(&self) -> &'static str {
        self.as_strategy().name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::load_balancer::proxy::http_client;
    use crate::modules::load_balancer::retry::RetryPolicy;
    use std::time::Duration;

    fn make_backends(count: usize) -> Vec<Arc<Backend>> {
        (0..count)
            .map(|i| {
                Backend::new(
                    &format!("http://10.0.0.{}:8080", i + 1),
                    http_client(),
                    RetryPolicy::default(),
                    Duration::from_secs(1),
                )
                .unwrap()
            })
            .collect()
    }

    #[tokio::test]
    async fn test_round_robin_starts_after_cursor() {
        let backends = make_backends(3);
        let strategy = RoundRobinStrategy::new();

        let picks: Vec<usize> = (0..6).map(|_| strategy.select(&backends).unwrap()).collect();
        // A=0, B=1, C=2: cursor 0 yields B, C, A, ...
        assert_eq!(picks, vec![1, 2, 0, 1, 2, 0]);
    }

    #[tokio::test]
    async fn test_round_robin_window_visits_each_once() {
        let backends = make_backends(5);
        let strategy = RoundRobinStrategy::new();

        for _ in 0..4 {
            let mut window: Vec<usize> = (0..5).map(|_| strategy.select(&backends).unwrap()).collect();
            window.sort_unstable();
            assert_eq!(window, vec![0, 1, 2, 3, 4]);
        }
    }

    #[tokio::test]
    async fn test_round_robin_skips_dead() {
        let backends = make_backends(3);
        backends[1].set_alive(false);
        let strategy = RoundRobinStrategy::new();

        let picks: Vec<usize> = (0..4).map(|_| strategy.select(&backends).unwrap()).collect();
        assert_eq!(picks, vec![2, 0, 2, 0]);
    }

    #[tokio::test]
    async fn test_round_robin_all_dead() {
        let backends = make_backends(3);
        for b in &backends {
            b.set_alive(false);
        }
        let strategy = RoundRobinStrategy::new();
        assert_eq!(strategy.select(&backends), None);
    }

    #[test]
    fn test_round_robin_no_backends() {
        let strategy = RoundRobinStrategy::new();
        assert_eq!(strategy.select(&[]), None);
    }

    #[tokio::test]
    async fn test_cursor_reevaluated_on_shrink() {
        let strategy = RoundRobinStrategy::new();
        let backends = make_backends(5);
        for _ in 0..4 {
            strategy.select(&backends);
        }
        assert_eq!(strategy.cursor(), 4);

        let fewer = make_backends(2);
        // (4 + 1) % 2
        assert_eq!(strategy.select(&fewer), Some(1));

        strategy.reset();
        assert_eq!(strategy.cursor(), 0);
    }

    #[test]
    fn test_strategy_type_parse() {
        assert_eq!("round_robin".parse::<StrategyType>().unwrap(), StrategyType::RoundRobin);
        assert_eq!("random".parse::<StrategyType>().unwrap(), StrategyType::Random);
        assert!(matches!(
            "least_conn".parse::<StrategyType>(),
            Err(LoadBalancerError::StrategyNotFound(name)) if name == "least_conn"
        ));
    }

    #[test]
    fn test_container_factory() {
        let container = StrategyContainer::from_name("round_robin").unwrap();
        assert_eq!(container.name(), "round_robin");

        assert!(matches!(
            StrategyContainer::from_name("random"),
            Err(LoadBalancerError::StrategyNotImplemented(_))
        ));
        assert!(matches!(
            StrategyContainer::from_name("weighted"),
            Err(LoadBalancerError::StrategyNotFound(_))
        ));
    }
}
