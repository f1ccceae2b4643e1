//! Failover Controller
//!
//! Read-only fleet health facade over the prober. It never retries operations:
//! writes stay single-attempt, and read resilience lives in the gateway
//! fallback.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use super::emit;
use super::prober::{HealthProber, ProbeOutcome};
use crate::domain::{ClusterEvent, ClusterNode, EventPublisher};
use crate::metrics::FleetMetrics;

/// Fleet health verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FleetStatus {
    /// Online nodes meet the quorum threshold
    Healthy,
    /// Fewer online nodes than the quorum threshold
    Degraded,
}

impl FleetStatus {
    /// Classify by an absolute online-node threshold.
    pub fn classify(online_nodes: usize, quorum: usize) -> Self {
        if online_nodes >= quorum {
            FleetStatus::Healthy
        } else {
            FleetStatus::Degraded
        }
    }

    pub fn is_healthy(&self) -> bool {
        *self == FleetStatus::Healthy
    }
}

impl std::fmt::Display for FleetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FleetStatus::Healthy => write!(f, "HEALTHY"),
            FleetStatus::Degraded => write!(f, "DEGRADED"),
        }
    }
}

/// Fleet health report
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetHealth {
    pub status: FleetStatus,
    pub total_nodes: usize,
    pub online_nodes: usize,
    pub offline_nodes: usize,
    pub quorum: usize,
    pub nodes: Vec<ProbeOutcome>,
    pub checked_at: DateTime<Utc>,
}

/// Computes the fleet health verdict.
pub struct FailoverController {
    prober: Arc<HealthProber>,
    events: Arc<dyn EventPublisher>,
    metrics: FleetMetrics,
    quorum: usize,
}

impl FailoverController {
    pub fn new(
        prober: Arc<HealthProber>,
        events: Arc<dyn EventPublisher>,
        metrics: FleetMetrics,
        quorum: usize,
    ) -> Self {
        Self {
            prober,
            events,
            metrics,
            quorum,
        }
    }

    pub fn quorum(&self) -> usize {
        self.quorum
    }

    /// Probe every node and classify the fleet.
    #[instrument(skip(self, nodes), fields(total = nodes.len(), quorum = self.quorum))]
    pub async fn health_check(&self, nodes: &[ClusterNode]) -> FleetHealth {
        let report = self.prober.probe_all(nodes).await;
        let online = report.healthy_count;
        let status = FleetStatus::classify(online, self.quorum);

        self.metrics.set_online_nodes(online);
        match status {
            FleetStatus::Healthy => info!(online, "Fleet healthy"),
            FleetStatus::Degraded => warn!(online, "Fleet degraded"),
        }
        emit(
            self.events.as_ref(),
            ClusterEvent::fleet_health_evaluated(status.is_healthy(), online, nodes.len()),
        )
        .await;

        FleetHealth {
            status,
            total_nodes: nodes.len(),
            online_nodes: online,
            offline_nodes: nodes.len() - online,
            quorum: self.quorum,
            nodes: report.outcomes,
            checked_at: Utc::now(),
        }
    }
}

impl std::fmt::Debug for FailoverController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailoverController")
            .field("quorum", &self.quorum)
            .finish()
    }
}
