//! Readiness aggregation for the HTTP probes
//!
//! Provides the health check trait, the broker check backed by the
//! connection manager's non-blocking health query, and the readiness gate
//! flipped off during shutdown.

use crate::broker::publisher::EventPublisher;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Health check result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheckResult {
    pub component: String,
    pub healthy: bool,
    pub message: Option<String>,
}

/// Trait for components that can be health checked
#[async_trait]
pub trait HealthCheck: Send + Sync {
    /// Perform health check on this component
    async fn health_check(&self) -> HealthCheckResult;

    /// Get the component name for reporting
    fn component_name(&self) -> &str;
}

/// Broker connectivity check
pub struct BrokerHealthCheck<P: EventPublisher> {
    publisher: Arc<P>,
}

impl<P: EventPublisher> BrokerHealthCheck<P> {
    pub fn new(publisher: Arc<P>) -> Self {
        Self { publisher }
    }
}

#[async_trait]
impl<P: EventPublisher + 'static> HealthCheck for BrokerHealthCheck<P> {
    async fn health_check(&self) -> HealthCheckResult {
        let healthy = self.publisher.is_healthy();
        debug!(healthy, "Broker health check");

        HealthCheckResult {
            component: self.component_name().to_string(),
            healthy,
            message: Some(if healthy { "ok" } else { "disconnected" }.to_string()),
        }
    }

    fn component_name(&self) -> &str {
        "rabbitmq"
    }
}

/// Readiness gate plus the checks it aggregates
pub struct HealthService {
    ready: AtomicBool,
    checks: Vec<Box<dyn HealthCheck>>,
}

/// Outcome of a readiness evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Readiness {
    pub ready: bool,
    pub results: Vec<HealthCheckResult>,
}

impl HealthService {
    /// Starts ready
    pub fn new() -> Self {
        Self {
            ready: AtomicBool::new(true),
            checks: Vec::new(),
        }
    }

    pub fn with_check(mut self, check: Box<dyn HealthCheck>) -> Self {
        self.checks.push(check);
        self
    }

    /// Flip the gate, e.g. to false as soon as shutdown begins
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Run every check. Ready only if the gate is open and all checks pass.
    pub async fn readiness(&self) -> Readiness {
        let mut results = Vec::with_capacity(self.checks.len());
        for check in &self.checks {
            results.push(check.health_check().await);
        }

        let gate_open = self.is_ready();
        let all_healthy = results.iter().all(|r| r.healthy);
        if gate_open && !all_healthy {
            warn!(
                unhealthy = results.iter().filter(|r| !r.healthy).count(),
                "Readiness check failed"
            );
        }

        Readiness {
            ready: gate_open && all_healthy,
            results,
        }
    }
}

impl Default for HealthService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mocks::MockPublisher;

    #[tokio::test]
    async fn test_broker_health_check() {
        let publisher = Arc::new(MockPublisher::new());
        let check = BrokerHealthCheck::new(Arc::clone(&publisher));

        let result = check.health_check().await;
        assert_eq!(result.component, "rabbitmq");
        assert!(result.healthy);
        assert_eq!(result.message.as_deref(), Some("ok"));

        publisher.set_healthy(false);
        let result = check.health_check().await;
        assert!(!result.healthy);
        assert_eq!(result.message.as_deref(), Some("disconnected"));
    }

    #[tokio::test]
    async fn test_readiness_requires_all_checks() {
        let healthy = Arc::new(MockPublisher::new());
        let unhealthy = Arc::new(MockPublisher::new());
        unhealthy.set_healthy(false);

        let service = HealthService::new()
            .with_check(Box::new(BrokerHealthCheck::new(healthy)))
            .with_check(Box::new(BrokerHealthCheck::new(unhealthy)));

        let readiness = service.readiness().await;
        assert!(!readiness.ready);
        assert_eq!(readiness.results.len(), 2);
    }

    #[tokio::test]
    async fn test_readiness_gate() {
        let service = HealthService::new()
            .with_check(Box::new(BrokerHealthCheck::new(Arc::new(MockPublisher::new()))));
        assert!(service.readiness().await.ready);

        service.set_ready(false);
        let readiness = service.readiness().await;
        assert!(!readiness.ready);
        assert!(readiness.results[0].healthy);
    }

    #[tokio::test]
    async fn test_no_checks_is_ready() {
        assert!(HealthService::new().readiness().await.ready);
    }
}
