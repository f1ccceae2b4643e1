//! Node Health Prober
//!
//! Bounded liveness checks against cluster nodes. A probe never fails: network
//! errors, non-success statuses and timeouts all fold into `healthy = false`.
//! This is the only writer of [`ClusterNode`] health.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, instrument};

use super::emit;
use crate::domain::{ClusterEvent, ClusterNode, ClusterNodeClient, EventPublisher, NodeId};
use crate::metrics::{FleetMetrics, OUTCOME_FAILURE, OUTCOME_SUCCESS, OUTCOME_TIMEOUT};

/// Result of probing one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeOutcome {
    pub node: NodeId,
    pub endpoint: String,
    pub healthy: bool,
    pub latency_ms: u64,
    pub error: Option<String>,
}

/// Result of probing a set of nodes, in configured order.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeReport {
    pub outcomes: Vec<ProbeOutcome>,
    pub healthy_count: usize,
}

impl ProbeReport {
    pub fn is_healthy(&self, node: &NodeId) -> Option<bool> {
        self.outcomes
            .iter()
            .find(|o| &o.node == node)
            .map(|o| o.healthy)
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }
}

/// Probes cluster nodes for liveness.
pub struct HealthProber {
    client: Arc<dyn ClusterNodeClient>,
    events: Arc<dyn EventPublisher>,
    metrics: FleetMetrics,
    timeout: Duration,
}

impl HealthProber {
    pub fn new(
        client: Arc<dyn ClusterNodeClient>,
        events: Arc<dyn EventPublisher>,
        metrics: FleetMetrics,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            events,
            metrics,
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Probe one node and record the result on it.
    pub async fn probe(&self, node: &ClusterNode) -> bool {
        self.probe_detailed(node).await.healthy
    }

    /// Probe one node, returning latency and failure reason.
    #[instrument(skip(self, node), fields(node = %node.endpoint()))]
    pub async fn probe_detailed(&self, node: &ClusterNode) -> ProbeOutcome {
        let started = Instant::now();
        let result = timeout(self.timeout, self.client.health(node.endpoint())).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        let (healthy, outcome, error) = match result {
            Ok(Ok(())) => (true, OUTCOME_SUCCESS, None),
            Ok(Err(e)) => (false, OUTCOME_FAILURE, Some(e.to_string())),
            Err(_) => (
                false,
                OUTCOME_TIMEOUT,
                Some(format!("no response within {}ms", self.timeout.as_millis())),
            ),
        };

        node.record_probe(healthy, latency_ms);
        self.metrics.record_probe(outcome);

        match &error {
            None => debug!(latency_ms, "Node healthy"),
            Some(reason) => debug!(latency_ms, %reason, "Node unhealthy"),
        }

        emit(
            self.events.as_ref(),
            ClusterEvent::node_probed(node.endpoint(), healthy, latency_ms),
        )
        .await;

        ProbeOutcome {
            node: node.id().clone(),
            endpoint: node.endpoint().to_string(),
            healthy,
            latency_ms,
            error,
        }
    }

    /// Probe every node concurrently; resolves once all probes have settled.
    pub async fn probe_all(&self, nodes: &[ClusterNode]) -> ProbeReport {
        let checks = nodes.iter().map(|node| self.probe_detailed(node));
        let outcomes = futures::future::join_all(checks).await;
        let healthy_count = outcomes.iter().filter(|o| o.healthy).count();

        debug!(
            healthy = healthy_count,
            total = outcomes.len(),
            "Probed all nodes"
        );

        ProbeReport {
            outcomes,
            healthy_count,
        }
    }
}

impl std::fmt::Debug for HealthProber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthProber")
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{EventJournal, MockClusterClient};
    use crate::domain::nodes_from_endpoints;

    fn prober(client: Arc<MockClusterClient>, timeout: Duration) -> HealthProber {
        HealthProber::new(
            client,
            Arc::new(EventJournal::new()),
            FleetMetrics::new().unwrap(),
            timeout,
        )
    }

    #[tokio::test]
    async fn test_probe_healthy_node() {
        let client = Arc::new(MockClusterClient::new());
        client.set_healthy("http://a:9094", true);
        let prober = prober(client, Duration::from_secs(1));
        let node = ClusterNode::new("http://a:9094");

        assert!(prober.probe(&node).await);
        assert!(node.is_known_healthy());
        assert!(node.health().last_checked_at.is_some());
    }

    #[tokio::test]
    async fn test_probe_error_folds_into_false() {
        let client = Arc::new(MockClusterClient::new());
        client.set_healthy("http://a:9094", false);
        let prober = prober(client, Duration::from_secs(1));
        let node = ClusterNode::new("http://a:9094");

        let outcome = prober.probe_detailed(&node).await;
        assert!(!outcome.healthy);
        assert!(outcome.error.is_some());
        assert!(!node.is_known_healthy());
    }

    #[tokio::test]
    async fn test_probe_unknown_node_is_unhealthy() {
        let client = Arc::new(MockClusterClient::new());
        let prober = prober(client, Duration::from_secs(1));
        let node = ClusterNode::new("http://never-configured:9094");

        assert!(!prober.probe(&node).await);
    }

    #[tokio::test]
    async fn test_probe_timeout_folds_into_false() {
        let client = Arc::new(MockClusterClient::new());
        client.set_health_delay("http://slow:9094", Duration::from_secs(5));
        let prober = prober(client, Duration::from_millis(50));
        let node = ClusterNode::new("http://slow:9094");

        let started = Instant::now();
        let outcome = prober.probe_detailed(&node).await;

        assert!(!outcome.healthy);
        assert!(outcome.error.unwrap().contains("no response within 50ms"));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_probe_all_is_independent_and_ordered() {
        let client = Arc::new(MockClusterClient::new());
        client.set_healthy("http://a:9094", true);
        client.set_health_delay("http://b:9094", Duration::from_secs(5));
        client.set_healthy("http://c:9094", false);
        client.set_healthy("http://d:9094", true);
        let prober = prober(client, Duration::from_millis(100));
        let nodes = nodes_from_endpoints(&[
            "http://a:9094",
            "http://b:9094",
            "http://c:9094",
            "http://d:9094",
        ]);

        let started = Instant::now();
        let report = prober.probe_all(&nodes).await;

        // concurrent: one slow node bounds the total, not the sum
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(report.total(), 4);
        assert_eq!(report.healthy_count, 2);
        let healthy: Vec<_> = report.outcomes.iter().map(|o| o.healthy).collect();
        assert_eq!(healthy, vec![true, false, false, true]);
        assert_eq!(report.is_healthy(nodes[3].id()), Some(true));
        assert!(nodes[0].is_known_healthy());
        assert!(!nodes[1].is_known_healthy());
    }

    #[tokio::test]
    async fn test_probe_records_metrics() {
        let client = Arc::new(MockClusterClient::new());
        client.set_healthy("http://a:9094", true);
        let metrics = FleetMetrics::new().unwrap();
        let prober = HealthProber::new(
            client,
            Arc::new(EventJournal::new()),
            metrics.clone(),
            Duration::from_secs(1),
        );

        prober.probe(&ClusterNode::new("http://a:9094")).await;
        prober.probe(&ClusterNode::new("http://b:9094")).await;

        assert_eq!(metrics.probe_count(OUTCOME_SUCCESS), 1);
        assert_eq!(metrics.probe_count(OUTCOME_FAILURE), 1);
    }
}
