//! Domain Events
//!
//! Immutable records of significant fleet occurrences. They are the hand-off
//! point to collaborators outside this crate (storage accounting, audit log).
//!
//! # Example
//!
//! ```ignore
//! let event = ClusterEvent::upload_completed(&result);
//! event_publisher.publish(event).await?;
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::upload::UploadResult;

/// Domain event representing a significant occurrence in the fleet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClusterEvent {
    // =========================================================================
    // Node Events
    // =========================================================================
    /// A node was probed for liveness.
    NodeProbed {
        node: String,
        healthy: bool,
        latency_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A node was selected to serve an operation.
    NodeSelected {
        node: String,
        skipped: usize,
        timestamp: DateTime<Utc>,
    },

    /// The fleet health verdict was computed.
    FleetHealthEvaluated {
        healthy: bool,
        online_nodes: usize,
        total_nodes: usize,
        timestamp: DateTime<Utc>,
    },

    // =========================================================================
    // Content Events
    // =========================================================================
    /// An upload was committed to the cluster.
    UploadCompleted {
        cid: String,
        name: String,
        size: u64,
        node: String,
        timestamp: DateTime<Utc>,
    },

    /// An upload orchestration failed.
    UploadFailed {
        name: String,
        node: Option<String>,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Pin verification after upload could not confirm a status.
    ReplicationUnverified {
        cid: String,
        node: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A CID was unpinned (or was already unpinned).
    ContentUnpinned {
        cid: String,
        node: String,
        was_pinned: bool,
        timestamp: DateTime<Utc>,
    },

    /// Content was served by a public gateway.
    GatewayFallbackServed {
        cid: String,
        gateway: String,
        failed_before: usize,
        timestamp: DateTime<Utc>,
    },
}

impl ClusterEvent {
    /// Get the event type as a string.
    pub fn event_type(&self) -> &'static str {
        match self {
            ClusterEvent::NodeProbed { .. } => "NodeProbed",
            ClusterEvent::NodeSelected { .. } => "NodeSelected",
            ClusterEvent::FleetHealthEvaluated { .. } => "FleetHealthEvaluated",
            ClusterEvent::UploadCompleted { .. } => "UploadCompleted",
            ClusterEvent::UploadFailed { .. } => "UploadFailed",
            ClusterEvent::ReplicationUnverified { .. } => "ReplicationUnverified",
            ClusterEvent::ContentUnpinned { .. } => "ContentUnpinned",
            ClusterEvent::GatewayFallbackServed { .. } => "GatewayFallbackServed",
        }
    }

    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            ClusterEvent::NodeProbed { timestamp, .. }
            | ClusterEvent::NodeSelected { timestamp, .. }
            | ClusterEvent::FleetHealthEvaluated { timestamp, .. }
            | ClusterEvent::UploadCompleted { timestamp, .. }
            | ClusterEvent::UploadFailed { timestamp, .. }
            | ClusterEvent::ReplicationUnverified { timestamp, .. }
            | ClusterEvent::ContentUnpinned { timestamp, .. }
            | ClusterEvent::GatewayFallbackServed { timestamp, .. } => *timestamp,
        }
    }

    /// One-line human summary for logs.
    pub fn describe(&self) -> String {
        match self {
            ClusterEvent::NodeProbed {
                node,
                healthy,
                latency_ms,
                ..
            } => format!(
                "node {} probed {} in {}ms",
                node,
                if *healthy { "healthy" } else { "unhealthy" },
                latency_ms
            ),
            ClusterEvent::NodeSelected { node, skipped, .. } => {
                format!("node {} selected after skipping {}", node, skipped)
            }
            ClusterEvent::FleetHealthEvaluated {
                healthy,
                online_nodes,
                total_nodes,
                ..
            } => format!(
                "fleet {} with {}/{} nodes online",
                if *healthy { "HEALTHY" } else { "DEGRADED" },
                online_nodes,
                total_nodes
            ),
            ClusterEvent::UploadCompleted {
                cid,
                name,
                size,
                node,
                ..
            } => format!("uploaded {} ({} bytes) as {} via {}", name, size, cid, node),
            ClusterEvent::UploadFailed {
                name, node, reason, ..
            } => match node {
                Some(node) => format!("upload of {} via {} failed: {}", name, node, reason),
                None => format!("upload of {} failed: {}", name, reason),
            },
            ClusterEvent::ReplicationUnverified {
                cid, node, reason, ..
            } => format!("pin of {} on {} unverified: {}", cid, node, reason),
            ClusterEvent::ContentUnpinned {
                cid,
                node,
                was_pinned,
                ..
            } => {
                if *was_pinned {
                    format!("unpinned {} via {}", cid, node)
                } else {
                    format!("{} was already unpinned on {}", cid, node)
                }
            }
            ClusterEvent::GatewayFallbackServed {
                cid,
                gateway,
                failed_before,
                ..
            } => format!(
                "{} served by {} after {} failed gateway(s)",
                cid, gateway, failed_before
            ),
        }
    }

    // =========================================================================
    // Constructors
    // =========================================================================

    pub fn node_probed(node: &str, healthy: bool, latency_ms: u64) -> Self {
        ClusterEvent::NodeProbed {
            node: node.to_string(),
            healthy,
            latency_ms,
            timestamp: Utc::now(),
        }
    }

    pub fn node_selected(node: &str, skipped: usize) -> Self {
        ClusterEvent::NodeSelected {
            node: node.to_string(),
            skipped,
            timestamp: Utc::now(),
        }
    }

    pub fn fleet_health_evaluated(healthy: bool, online_nodes: usize, total_nodes: usize) -> Self {
        ClusterEvent::FleetHealthEvaluated {
            healthy,
            online_nodes,
            total_nodes,
            timestamp: Utc::now(),
        }
    }

    pub fn upload_completed(result: &UploadResult) -> Self {
        ClusterEvent::UploadCompleted {
            cid: result.cid.to_string(),
            name: result.name.clone(),
            size: result.size,
            node: result.node.clone(),
            timestamp: Utc::now(),
        }
    }

    pub fn upload_failed(name: &str, node: Option<&str>, reason: impl Into<String>) -> Self {
        ClusterEvent::UploadFailed {
            name: name.to_string(),
            node: node.map(str::to_string),
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn replication_unverified(cid: &str, node: &str, reason: impl Into<String>) -> Self {
        ClusterEvent::ReplicationUnverified {
            cid: cid.to_string(),
            node: node.to_string(),
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn content_unpinned(cid: &str, node: &str, was_pinned: bool) -> Self {
        ClusterEvent::ContentUnpinned {
            cid: cid.to_string(),
            node: node.to_string(),
            was_pinned,
            timestamp: Utc::now(),
        }
    }

    pub fn gateway_fallback_served(cid: &str, gateway: &str, failed_before: usize) -> Self {
        ClusterEvent::GatewayFallbackServed {
            cid: cid.to_string(),
            gateway: gateway.to_string(),
            failed_before,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type() {
        let event = ClusterEvent::node_probed("http://a:9094", true, 12);
        assert_eq!(event.event_type(), "NodeProbed");

        let event = ClusterEvent::upload_failed("a.txt", None, "no node");
        assert_eq!(event.event_type(), "UploadFailed");
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = ClusterEvent::gateway_fallback_served("QmX", "https://dweb.link", 1);
        let json = serde_json::to_string(&event).unwrap();

        assert!(json.contains("\"type\":\"GatewayFallbackServed\""));
        assert!(json.contains("\"failed_before\":1"));

        let back: ClusterEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_describe() {
        let event = ClusterEvent::fleet_health_evaluated(false, 2, 5);
        assert_eq!(event.describe(), "fleet DEGRADED with 2/5 nodes online");

        let event = ClusterEvent::content_unpinned("QmX", "http://a:9094", false);
        assert_eq!(event.describe(), "QmX was already unpinned on http://a:9094");
    }

    #[test]
    fn test_event_timestamp() {
        let before = Utc::now();
        let event = ClusterEvent::content_unpinned("QmX", "http://a:9094", false);
        assert!(event.timestamp() >= before);
    }
}
