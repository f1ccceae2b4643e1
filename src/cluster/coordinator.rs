//! Cluster Coordinator
//!
//! Facade owning the configured node set and every component built on it.
//! There is no global state: each coordinator is constructed from an explicit
//! configuration and lives until [`ClusterCoordinator::shutdown`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;
use tracing::{info, instrument};

use super::failover::{FailoverController, FleetHealth};
use super::orchestrator::{OrchestratorConfig, PinOrchestrator};
use super::prober::{HealthProber, ProbeReport};
use super::selector::NodeSelector;
use super::status::{PinStatusReport, StatusAggregator};
use crate::adapters::{
    EventJournal, FanoutEventPublisher, HttpClusterClient, HttpGatewayClient,
    LoggingEventPublisher,
};
use crate::config::CoordinatorConfig;
use crate::domain::{
    nodes_from_endpoints, Cid, ClusterEvent, ClusterNode, ClusterNodeClient, ClusterSnapshot, ContentMetadata,
    EventPublisher, GatewayClient, GatewayEndpoint, PinFilter, PinRecord, UnpinOutcome,
    UploadRequest, UploadResult,
};
use crate::error::{Error, Result};
use crate::gateway::{GatewayResolver, ResolverConfig};
use crate::metrics::FleetMetrics;

/// Coordinates a fleet of cluster nodes plus the public gateway fallback.
pub struct ClusterCoordinator {
    config: CoordinatorConfig,
    nodes: Vec<ClusterNode>,
    prober: Arc<HealthProber>,
    selector: Arc<NodeSelector>,
    orchestrator: PinOrchestrator,
    status: StatusAggregator,
    failover: FailoverController,
    gateways: GatewayResolver,
    metrics: FleetMetrics,
    journal: Arc<EventJournal>,
    running: AtomicBool,
}

impl ClusterCoordinator {
    /// Build a coordinator talking to real cluster nodes and gateways over HTTP.
    pub fn init(config: CoordinatorConfig) -> Result<Self> {
        let cluster = Arc::new(HttpClusterClient::new(&config)?);
        let gateway = Arc::new(HttpGatewayClient::new()?);
        let events = Arc::new(LoggingEventPublisher::new());
        Self::with_clients(config, cluster, gateway, events)
    }

    /// Build a coordinator over the given port implementations.
    ///
    /// Events go to `events` and to the coordinator's own journal.
    pub fn with_clients(
        config: CoordinatorConfig,
        cluster: Arc<dyn ClusterNodeClient>,
        gateway: Arc<dyn GatewayClient>,
        events: Arc<dyn EventPublisher>,
    ) -> Result<Self> {
        config.validate()?;
        let test_cid = Cid::parse(&config.gateway_test_cid)
            .map_err(|e| Error::Config(format!("gatewayTestCid: {}", e)))?;
        let metrics = FleetMetrics::new()?;
        let nodes = nodes_from_endpoints(&config.nodes[..]);
        let journal = Arc::new(EventJournal::new());
        let events: Arc<dyn EventPublisher> = Arc::new(
            FanoutEventPublisher::new()
                .with_sink(journal.clone())
                .with_sink(events),
        );

        let prober = Arc::new(HealthProber::new(
            cluster.clone(),
            events.clone(),
            metrics.clone(),
            config.probe_timeout(),
        ));
        let selector = Arc::new(NodeSelector::new(prober.clone(), events.clone()));
        let orchestrator = PinOrchestrator::new(
            OrchestratorConfig {
                upload_timeout: config.upload_timeout(),
                replication_grace: config.replication_grace(),
                verify_timeout: config.request_timeout(),
                staging_dir: config.staging_dir(),
            },
            cluster.clone(),
            selector.clone(),
            events.clone(),
            metrics.clone(),
        );
        let status = StatusAggregator::new(cluster, selector.clone(), events.clone());
        let failover = FailoverController::new(
            prober.clone(),
            events.clone(),
            metrics.clone(),
            config.healthy_quorum,
        );
        let gateways = GatewayResolver::new(
            ResolverConfig {
                gateways: config.gateways.clone(),
                attempt_timeout: config.gateway_timeout(),
                test_cid,
            },
            gateway,
            events,
            metrics.clone(),
        );

        info!(
            nodes = nodes.len(),
            gateways = config.gateways.len(),
            quorum = config.healthy_quorum,
            "Cluster coordinator initialized"
        );

        Ok(Self {
            config,
            nodes,
            prober,
            selector,
            orchestrator,
            status,
            failover,
            gateways,
            metrics,
            journal,
            running: AtomicBool::new(true),
        })
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Stop accepting operations. Idempotent.
    pub fn shutdown(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!("Cluster coordinator shut down");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(Error::ShutDown)
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Configured nodes in priority order, with their last probe results.
    pub fn nodes(&self) -> &[ClusterNode] {
        &self.nodes
    }

    pub fn metrics(&self) -> &FleetMetrics {
        &self.metrics
    }

    /// Up to `limit` of the most recent events, oldest first.
    pub fn recent_events(&self, limit: usize) -> Vec<ClusterEvent> {
        self.journal.recent(limit)
    }

    /// Events dropped from the journal window since start.
    pub fn evicted_events(&self) -> u64 {
        self.journal.evicted()
    }

    // =========================================================================
    // Cluster Operations
    // =========================================================================

    /// First node in priority order that answers a fresh probe.
    pub async fn select_node(&self) -> Result<&ClusterNode> {
        self.ensure_running()?;
        self.selector.select(&self.nodes).await
    }

    /// Probe every configured node concurrently.
    pub async fn probe_all(&self) -> Result<ProbeReport> {
        self.ensure_running()?;
        Ok(self.prober.probe_all(&self.nodes).await)
    }

    pub async fn health_check(&self) -> Result<FleetHealth> {
        self.ensure_running()?;
        Ok(self.failover.health_check(&self.nodes).await)
    }

    pub async fn status(&self) -> Result<ClusterSnapshot> {
        self.ensure_running()?;
        self.status.get_status(&self.nodes).await
    }

    pub async fn peers(&self) -> Result<Vec<Value>> {
        self.ensure_running()?;
        self.status.peers(&self.nodes).await
    }

    pub async fn list_pins(&self, filter: &PinFilter) -> Result<Vec<PinRecord>> {
        self.ensure_running()?;
        self.status.list_pins(&self.nodes, filter).await
    }

    pub async fn pin_status(&self, cid: &Cid) -> Result<PinStatusReport> {
        self.ensure_running()?;
        self.status.pin_status(&self.nodes, cid).await
    }

    pub async fn unpin(&self, cid: &Cid) -> Result<UnpinOutcome> {
        self.ensure_running()?;
        self.status.unpin(&self.nodes, cid).await
    }

    /// Upload content to one node and report its pin status.
    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn add(&self, request: UploadRequest) -> Result<UploadResult> {
        self.ensure_running()?;
        self.orchestrator.upload(&self.nodes, request).await
    }

    // =========================================================================
    // Gateway Operations
    // =========================================================================

    /// Fetch content through the public gateways.
    pub async fn download(&self, cid: &Cid) -> Result<Bytes> {
        self.ensure_running()?;
        self.gateways.download(cid).await
    }

    pub async fn metadata(&self, cid: &Cid) -> Result<ContentMetadata> {
        self.ensure_running()?;
        self.gateways.metadata(cid).await
    }

    /// Never fails; a shut-down coordinator reports nothing as accessible.
    pub async fn is_accessible(&self, cid: &Cid) -> bool {
        self.is_running() && self.gateways.is_accessible(cid).await
    }

    pub async fn rank_gateways(&self) -> Result<Vec<GatewayEndpoint>> {
        self.ensure_running()?;
        Ok(self.gateways.rank_gateways().await)
    }

    /// Fastest gateway, or the first configured one when none answer.
    pub async fn best_gateway(&self) -> Result<String> {
        self.ensure_running()?;
        Ok(self.gateways.best_gateway().await)
    }
}

impl std::fmt::Debug for ClusterCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterCoordinator")
            .field("nodes", &self.config.nodes)
            .field("gateways", &self.config.gateways)
            .field("running", &self.is_running())
            .finish()
    }
}
