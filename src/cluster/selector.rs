//! Node Selector
//!
//! Picks the first node, in configured priority order, that passes a fresh
//! liveness probe. Selection is sequential with early exit and never consults
//! cached health, so a node that just recovered is picked up immediately.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use super::emit;
use super::prober::HealthProber;
use crate::domain::{ClusterEvent, ClusterNode, EventPublisher};
use crate::error::{Error, Result};

/// Selects a usable cluster node.
pub struct NodeSelector {
    prober: Arc<HealthProber>,
    events: Arc<dyn EventPublisher>,
}

impl NodeSelector {
    pub fn new(prober: Arc<HealthProber>, events: Arc<dyn EventPublisher>) -> Self {
        Self { prober, events }
    }

    /// Return the first node in list order that answers its probe.
    ///
    /// Fails with [`Error::NoAvailableNode`] when none does; the caller
    /// surfaces it rather than retrying.
    #[instrument(skip(self, nodes), fields(candidates = nodes.len()))]
    pub async fn select<'a>(&self, nodes: &'a [ClusterNode]) -> Result<&'a ClusterNode> {
        for (index, node) in nodes.iter().enumerate() {
            if self.prober.probe(node).await {
                debug!(node = %node.endpoint(), skipped = index, "Selected cluster node");
                emit(
                    self.events.as_ref(),
                    ClusterEvent::node_selected(node.endpoint(), index),
                )
                .await;
                return Ok(node);
            }
            debug!(node = %node.endpoint(), "Node failed probe, trying next");
        }

        warn!(tried = nodes.len(), "No cluster node answered its liveness probe");
        Err(Error::NoAvailableNode { tried: nodes.len() })
    }
}

impl std::fmt::Debug for NodeSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeSelector")
            .field("prober", &self.prober)
            .finish()
    }
}
