//! Cluster Status Aggregator
//!
//! Status, peer and pin queries are answered by a single selected node acting
//! as proxy for the whole fleet; counts reflect that node's view only.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, instrument};

use super::emit;
use super::selector::NodeSelector;
use crate::domain::{
    Cid, ClusterEvent, ClusterNode, ClusterNodeClient, ClusterSnapshot, EventPublisher, PinFilter,
    PinRecord, PinState, UnpinOutcome,
};
use crate::error::{Error, Result};

/// Pin status of one CID as reported by the proxy node.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PinStatusReport {
    pub cid: Cid,
    pub state: PinState,
    pub node: String,
    pub record: PinRecord,
}

/// Fleet-wide read operations through one proxy node.
pub struct StatusAggregator {
    client: Arc<dyn ClusterNodeClient>,
    selector: Arc<NodeSelector>,
    events: Arc<dyn EventPublisher>,
}

impl StatusAggregator {
    pub fn new(
        client: Arc<dyn ClusterNodeClient>,
        selector: Arc<NodeSelector>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            client,
            selector,
            events,
        }
    }

    async fn proxy<'a>(&self, nodes: &'a [ClusterNode]) -> Result<&'a ClusterNode> {
        self.selector.select(nodes).await.map_err(|e| match e {
            Error::NoAvailableNode { tried } => Error::ClusterUnavailable(format!(
                "none of {} configured node(s) is reachable",
                tried
            )),
            other => other,
        })
    }

    /// Snapshot of peers and pins from the first reachable node.
    #[instrument(skip(self, nodes))]
    pub async fn get_status(&self, nodes: &[ClusterNode]) -> Result<ClusterSnapshot> {
        let node = self.proxy(nodes).await?;
        let all = PinFilter::default();
        let (peers, pins) = tokio::try_join!(
            self.client.peers(node.endpoint()),
            self.client.pins(node.endpoint(), &all),
        )?;

        debug!(
            node = %node.endpoint(),
            peers = peers.len(),
            pins = pins.len(),
            "Fetched cluster status"
        );

        Ok(ClusterSnapshot {
            total_nodes: nodes.len(),
            active_node: node.endpoint().to_string(),
            peer_count: peers.len(),
            pinned_count: pins.len(),
            peers,
            pins,
            fetched_at: Utc::now(),
        })
    }

    /// Raw peer listing from the first reachable node.
    #[instrument(skip(self, nodes))]
    pub async fn peers(&self, nodes: &[ClusterNode]) -> Result<Vec<Value>> {
        let node = self.proxy(nodes).await?;
        self.client.peers(node.endpoint()).await
    }

    /// Pin listing from the first reachable node, optionally filtered by state.
    #[instrument(skip(self, nodes, filter), fields(filter = %filter.as_query()))]
    pub async fn list_pins(
        &self,
        nodes: &[ClusterNode],
        filter: &PinFilter,
    ) -> Result<Vec<PinRecord>> {
        let node = self.proxy(nodes).await?;
        let mut pins = self.client.pins(node.endpoint(), filter).await?;
        pins.retain(|p| filter.matches(p.overall_state()));
        Ok(pins)
    }

    /// Pin state of one CID; [`Error::NotFound`] when the node does not know it.
    #[instrument(skip(self, nodes), fields(cid = %cid))]
    pub async fn pin_status(&self, nodes: &[ClusterNode], cid: &Cid) -> Result<PinStatusReport> {
        let node = self.proxy(nodes).await?;
        let record = self
            .client
            .pin_status(node.endpoint(), cid)
            .await?
            .ok_or_else(|| Error::NotFound(format!("no pin status for {}", cid)))?;

        Ok(PinStatusReport {
            cid: cid.clone(),
            state: record.overall_state(),
            node: node.endpoint().to_string(),
            record,
        })
    }

    /// Unpin a CID. Unpinning something that is not pinned succeeds.
    #[instrument(skip(self, nodes), fields(cid = %cid))]
    pub async fn unpin(&self, nodes: &[ClusterNode], cid: &Cid) -> Result<UnpinOutcome> {
        let node = self.proxy(nodes).await?;
        let outcome = self.client.unpin(node.endpoint(), cid).await?;

        match outcome {
            UnpinOutcome::Removed => info!(node = %node.endpoint(), "Unpinned content"),
            UnpinOutcome::AlreadyUnpinned => {
                debug!(node = %node.endpoint(), "Content was not pinned")
            }
        }
        emit(
            self.events.as_ref(),
            ClusterEvent::content_unpinned(
                cid.as_str(),
                node.endpoint(),
                outcome == UnpinOutcome::Removed,
            ),
        )
        .await;

        Ok(outcome)
    }
}

impl std::fmt::Debug for StatusAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusAggregator").finish_non_exhaustive()
    }
}
