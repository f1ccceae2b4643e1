//! Pin/Replication Orchestrator
//!
//! Commits a file to the cluster and reports where replication stands.
//!
//! # Upload Flow
//!
//! ```text
//! SELECTING ──▶ UPLOADING ──▶ EXTRACTING_CID ──▶ AWAITING_REPLICATION ──▶ VERIFYING ──▶ SUCCEEDED
//!     │             │               │
//!     └─────────────┴───────────────┴──────────────────────────────────────────────────▶ FAILED
//! ```
//!
//! # Guarantees
//!
//! 1. A write is attempted against exactly one node; there is no cross-node
//!    retry, since a duplicate add would pin twice without an idempotency key
//! 2. Verification is best-effort and never fails an upload that produced a CID
//! 3. The staged temp copy is removed on every exit path

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::{sleep, timeout};
use tracing::{info, instrument, warn};

use super::cid::extract_cid;
use super::emit;
use super::selector::NodeSelector;
use crate::domain::{
    ClusterEvent, ClusterNode, ClusterNodeClient, EventPublisher, PinRecord, StagedUpload,
    UploadAttempt, UploadRequest, UploadResult, UploadState,
};
use crate::error::{Error, Result};
use crate::metrics::{FleetMetrics, OUTCOME_FAILURE, OUTCOME_SUCCESS};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Bound on the whole add request
    pub upload_timeout: Duration,

    /// Fixed wait before verifying pin status
    pub replication_grace: Duration,

    /// Bound on the verification request
    pub verify_timeout: Duration,

    /// Directory for staged copies
    pub staging_dir: PathBuf,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            upload_timeout: Duration::from_secs(60),
            replication_grace: Duration::from_secs(3),
            verify_timeout: Duration::from_secs(10),
            staging_dir: std::env::temp_dir(),
        }
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Uploads content to one selected node and checks its pin status.
pub struct PinOrchestrator {
    config: OrchestratorConfig,
    client: Arc<dyn ClusterNodeClient>,
    selector: Arc<NodeSelector>,
    events: Arc<dyn EventPublisher>,
    metrics: FleetMetrics,
}

impl PinOrchestrator {
    pub fn new(
        config: OrchestratorConfig,
        client: Arc<dyn ClusterNodeClient>,
        selector: Arc<NodeSelector>,
        events: Arc<dyn EventPublisher>,
        metrics: FleetMetrics,
    ) -> Self {
        Self {
            config,
            client,
            selector,
            events,
            metrics,
        }
    }

    /// Run one upload orchestration.
    #[instrument(skip(self, nodes, request), fields(name = %request.name))]
    pub async fn upload(
        &self,
        nodes: &[ClusterNode],
        request: UploadRequest,
    ) -> Result<UploadResult> {
        let mut attempt = UploadAttempt::new(request.name.clone());

        let result = self.run(nodes, &request, &mut attempt).await;

        match &result {
            Ok(uploaded) => {
                self.metrics.record_upload(OUTCOME_SUCCESS);
                emit(self.events.as_ref(), ClusterEvent::upload_completed(uploaded)).await;
            }
            Err(e) => {
                attempt.fail(e.to_string());
                self.metrics.record_upload(OUTCOME_FAILURE);
                warn!(attempt = %attempt.id, error = %e, "Upload failed");
                emit(
                    self.events.as_ref(),
                    ClusterEvent::upload_failed(
                        &attempt.name,
                        attempt.target.as_ref().map(|n| n.as_str()),
                        e.to_string(),
                    ),
                )
                .await;
            }
        }

        result
    }

    async fn run(
        &self,
        nodes: &[ClusterNode],
        request: &UploadRequest,
        attempt: &mut UploadAttempt,
    ) -> Result<UploadResult> {
        // SELECTING
        let node = self.selector.select(nodes).await?;
        attempt.target = Some(node.id().clone());

        // Dropping `staged` removes the temp copy on every path out of here.
        let staged = StagedUpload::stage(&self.config.staging_dir, request).await?;

        // UPLOADING
        attempt.advance(UploadState::Uploading)?;
        let body = self.send(node, &staged).await?;

        // EXTRACTING_CID
        attempt.advance(UploadState::ExtractingCid)?;
        let cid = extract_cid(&body)?;
        info!(cid = %cid, node = %node.endpoint(), size = staged.size, "Content added");

        // AWAITING_REPLICATION
        attempt.advance(UploadState::AwaitingReplication)?;
        sleep(self.config.replication_grace).await;

        // VERIFYING
        attempt.advance(UploadState::Verifying)?;
        let pin_status = self.verify(node, &cid).await;

        attempt.advance(UploadState::Succeeded)?;
        Ok(UploadResult {
            cid,
            name: staged.name.clone(),
            size: staged.size,
            mimetype: staged.mimetype.clone(),
            pin_status,
            added_at: Utc::now(),
            node: node.endpoint().to_string(),
        })
    }

    async fn send(&self, node: &ClusterNode, staged: &StagedUpload) -> Result<String> {
        match timeout(
            self.config.upload_timeout,
            self.client.add(node.endpoint(), staged),
        )
        .await
        {
            Ok(Ok(body)) => Ok(body),
            Ok(Err(e)) => Err(Error::UploadTransport {
                node: node.endpoint().to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(Error::UploadTransport {
                node: node.endpoint().to_string(),
                reason: format!(
                    "no response within {}ms",
                    self.config.upload_timeout.as_millis()
                ),
            }),
        }
    }

    /// Best-effort pin status read; failures are logged, not returned.
    async fn verify(&self, node: &ClusterNode, cid: &crate::domain::Cid) -> Option<PinRecord> {
        let reason = match timeout(
            self.config.verify_timeout,
            self.client.pin_status(node.endpoint(), cid),
        )
        .await
        {
            Ok(Ok(Some(record))) => {
                info!(
                    cid = %cid,
                    state = %record.overall_state(),
                    pinned_on = record.pinned_on(),
                    "Pin status verified"
                );
                return Some(record);
            }
            Ok(Ok(None)) => "pin status unknown to node".to_string(),
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!(
                "no response within {}ms",
                self.config.verify_timeout.as_millis()
            ),
        };

        warn!(cid = %cid, node = %node.endpoint(), %reason, "Could not verify pin status");
        emit(
            self.events.as_ref(),
            ClusterEvent::replication_unverified(cid.as_str(), node.endpoint(), reason),
        )
        .await;
        None
    }
}

impl std::fmt::Debug for PinOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinOrchestrator")
            .field("config", &self.config)
            .finish()
    }
}
