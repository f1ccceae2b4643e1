//! Domain Ports (Port/Adapter Pattern)
//!
//! Traits for everything the coordinator talks to over the network. The
//! components in [`crate::cluster`] and [`crate::gateway`] depend only on these.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Domain Layer                            │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                    Ports (Traits)                    │    │
//! │  │  ClusterNodeClient │ GatewayClient │ EventPublisher │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Infrastructure Layer                       │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                  Adapters (Impls)                    │    │
//! │  │  HttpClusterClient │ HttpGatewayClient │ Mock*      │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;

use super::events::ClusterEvent;
use super::types::{Cid, ContentMetadata, PinFilter, PinRecord, UnpinOutcome};
use super::upload::StagedUpload;
use crate::error::Result;

// =============================================================================
// Cluster Node Port
// =============================================================================

/// Port for the cluster node HTTP surface.
///
/// Every method addresses one node by its endpoint; choosing the node is the
/// caller's job.
#[async_trait]
pub trait ClusterNodeClient: Send + Sync {
    /// `GET /health`. Ok only on a success status.
    async fn health(&self, endpoint: &str) -> Result<()>;

    /// `GET /peers`, raw peer documents.
    async fn peers(&self, endpoint: &str) -> Result<Vec<Value>>;

    /// `GET /pins`, optionally filtered by state.
    async fn pins(&self, endpoint: &str, filter: &PinFilter) -> Result<Vec<PinRecord>>;

    /// `GET /pins/:cid`. `None` when the node does not know the CID.
    async fn pin_status(&self, endpoint: &str, cid: &Cid) -> Result<Option<PinRecord>>;

    /// `DELETE /pins/:cid`. Unpinning an unknown CID is not an error.
    async fn unpin(&self, endpoint: &str, cid: &Cid) -> Result<UnpinOutcome>;

    /// `POST /add` (multipart). Returns the raw response body.
    async fn add(&self, endpoint: &str, upload: &StagedUpload) -> Result<String>;
}

// =============================================================================
// Gateway Port
// =============================================================================

/// Port for public IPFS gateways.
#[async_trait]
pub trait GatewayClient: Send + Sync {
    /// `GET {gateway}/ipfs/:cid`. Ok only on a success status.
    async fn fetch(&self, gateway: &str, cid: &Cid, timeout: Duration) -> Result<Bytes>;

    /// Header-only request for the same URL.
    async fn head(&self, gateway: &str, cid: &Cid, timeout: Duration) -> Result<ContentMetadata>;
}

// =============================================================================
// Event Publishing Port
// =============================================================================

/// Port for publishing domain events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a single event.
    async fn publish(&self, event: ClusterEvent) -> Result<()>;

    /// Publish multiple events.
    async fn publish_all(&self, events: Vec<ClusterEvent>) -> Result<()>;
}

/// Publish an event; a failing publisher is logged and never fails the caller.
pub async fn publish_or_log(publisher: &dyn EventPublisher, event: ClusterEvent) {
    let event_type = event.event_type();
    if let Err(e) = publisher.publish(event).await {
        tracing::warn!(event_type, error = %e, "Failed to publish cluster event");
    }
}
