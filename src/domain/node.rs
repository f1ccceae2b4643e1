//! Cluster Node Records
//!
//! One record per configured endpoint, rebuilt at every process start.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use super::types::NodeId;

/// Last observed liveness of a node.
///
/// Written as a whole so `healthy` and `checked_at` never tear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeHealth {
    pub last_known_healthy: bool,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_latency_ms: Option<u64>,
}

/// A configured cluster node.
#[derive(Debug)]
pub struct ClusterNode {
    id: NodeId,
    endpoint: String,
    health: RwLock<NodeHealth>,
}

impl ClusterNode {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        Self {
            id: NodeId::new(endpoint.clone()),
            endpoint,
            health: RwLock::new(NodeHealth::default()),
        }
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Snapshot of the last probe result.
    pub fn health(&self) -> NodeHealth {
        *self.health.read()
    }

    pub fn is_known_healthy(&self) -> bool {
        self.health.read().last_known_healthy
    }

    /// Only the health prober records probe outcomes.
    pub(crate) fn record_probe(&self, healthy: bool, latency_ms: u64) {
        *self.health.write() = NodeHealth {
            last_known_healthy: healthy,
            last_checked_at: Some(Utc::now()),
            last_latency_ms: Some(latency_ms),
        };
    }
}

/// Build node records from configured endpoints, preserving priority order.
pub fn nodes_from_endpoints<S: AsRef<str>>(endpoints: &[S]) -> Vec<ClusterNode> {
    endpoints.iter().map(|e| ClusterNode::new(e.as_ref())).collect()
}
