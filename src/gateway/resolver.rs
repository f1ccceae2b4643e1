//! Gateway Fallback Resolver
//!
//! Retrieves content by CID from public gateways when the private cluster is
//! out of reach. Content and metadata lookups walk the configured list in
//! order and stop at the first success; ranking probes every gateway at once.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use crate::domain::{
    publish_or_log, Cid, ClusterEvent, ContentMetadata, EventPublisher, GatewayClient,
    GatewayEndpoint,
};
use crate::error::{Error, GatewayFailure, Result};
use crate::metrics::{FleetMetrics, OUTCOME_FAILURE, OUTCOME_SUCCESS, OUTCOME_TIMEOUT};

/// Configuration for the resolver
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Gateway base URLs, most preferred first
    pub gateways: Vec<String>,

    /// Bound on each single gateway attempt
    pub attempt_timeout: Duration,

    /// Well-known CID used to rank gateways
    pub test_cid: Cid,
}

/// Public gateway fallback.
pub struct GatewayResolver {
    config: ResolverConfig,
    client: Arc<dyn GatewayClient>,
    events: Arc<dyn EventPublisher>,
    metrics: FleetMetrics,
}

impl GatewayResolver {
    pub fn new(
        config: ResolverConfig,
        client: Arc<dyn GatewayClient>,
        events: Arc<dyn EventPublisher>,
        metrics: FleetMetrics,
    ) -> Self {
        Self {
            config,
            client,
            events,
            metrics,
        }
    }

    pub fn gateways(&self) -> &[String] {
        &self.config.gateways
    }

    /// Fetch content, trying gateways in order until one answers.
    ///
    /// On total failure every per-gateway reason is returned, not just the last.
    #[instrument(skip(self), fields(cid = %cid))]
    pub async fn download(&self, cid: &Cid) -> Result<Bytes> {
        let mut failures = Vec::new();

        for gateway in &self.config.gateways {
            let attempt = timeout(
                self.config.attempt_timeout,
                self.client.fetch(gateway, cid, self.config.attempt_timeout),
            )
            .await;

            match attempt {
                Ok(Ok(body)) if body.is_empty() => {
                    self.metrics.record_gateway(OUTCOME_FAILURE);
                    debug!(%gateway, "Gateway answered with an empty body");
                    failures.push(GatewayFailure::new(gateway, "empty response body"));
                }
                Ok(Ok(body)) => {
                    self.metrics.record_gateway(OUTCOME_SUCCESS);
                    info!(%gateway, bytes = body.len(), failed_before = failures.len(), "Content served by gateway");
                    publish_or_log(
                        self.events.as_ref(),
                        ClusterEvent::gateway_fallback_served(cid.as_str(), gateway, failures.len()),
                    )
                    .await;
                    return Ok(body);
                }
                Ok(Err(e)) => {
                    self.metrics.record_gateway(OUTCOME_FAILURE);
                    debug!(%gateway, error = %e, "Gateway fetch failed");
                    failures.push(GatewayFailure::new(gateway, e.to_string()));
                }
                Err(_) => {
                    self.metrics.record_gateway(OUTCOME_TIMEOUT);
                    debug!(%gateway, "Gateway fetch timed out");
                    failures.push(GatewayFailure::new(gateway, self.timeout_reason()));
                }
            }
        }

        warn!(attempted = failures.len(), "All gateways failed to serve content");
        Err(Error::AllGatewaysFailed {
            cid: cid.to_string(),
            failures,
        })
    }

    /// Header-only metadata lookup with the same ordered iteration.
    #[instrument(skip(self), fields(cid = %cid))]
    pub async fn metadata(&self, cid: &Cid) -> Result<ContentMetadata> {
        let mut failures = Vec::new();

        for gateway in &self.config.gateways {
            let attempt = timeout(
                self.config.attempt_timeout,
                self.client.head(gateway, cid, self.config.attempt_timeout),
            )
            .await;

            match attempt {
                Ok(Ok(meta)) => {
                    self.metrics.record_gateway(OUTCOME_SUCCESS);
                    return Ok(meta);
                }
                Ok(Err(e)) => {
                    self.metrics.record_gateway(OUTCOME_FAILURE);
                    failures.push(GatewayFailure::new(gateway, e.to_string()));
                }
                Err(_) => {
                    self.metrics.record_gateway(OUTCOME_TIMEOUT);
                    failures.push(GatewayFailure::new(gateway, self.timeout_reason()));
                }
            }
        }

        Err(Error::AllGatewaysFailed {
            cid: cid.to_string(),
            failures,
        })
    }

    /// Whether any gateway can describe the CID. Never fails.
    pub async fn is_accessible(&self, cid: &Cid) -> bool {
        self.metadata(cid).await.is_ok()
    }

    /// Probe every gateway concurrently against the test CID.
    ///
    /// Returned in configured order; failed probes carry no response time.
    pub async fn rank_gateways(&self) -> Vec<GatewayEndpoint> {
        let probes = self.config.gateways.iter().map(|gateway| async move {
            let started = Instant::now();
            let result = timeout(
                self.config.attempt_timeout,
                self.client
                    .head(gateway, &self.config.test_cid, self.config.attempt_timeout),
            )
            .await;
            let elapsed = started.elapsed().as_millis() as u64;

            let last_response_time_ms = match result {
                Ok(Ok(_)) => Some(elapsed),
                Ok(Err(e)) => {
                    debug!(%gateway, error = %e, "Gateway probe failed");
                    None
                }
                Err(_) => {
                    debug!(%gateway, "Gateway probe timed out");
                    None
                }
            };

            GatewayEndpoint {
                url: gateway.clone(),
                last_response_time_ms,
            }
        });

        futures::future::join_all(probes).await
    }

    /// The fastest responding gateway, or the first configured one if none respond.
    pub async fn best_gateway(&self) -> String {
        let ranked = self.rank_gateways().await;
        let fastest = ranked
            .iter()
            .filter_map(|g| g.last_response_time_ms.map(|ms| (ms, &g.url)))
            .min_by_key(|(ms, _)| *ms)
            .map(|(_, url)| url.clone());

        match fastest {
            Some(url) => {
                debug!(gateway = %url, "Selected fastest gateway");
                url
            }
            None => {
                warn!("No gateway answered the probe, using first configured");
                self.config.gateways.first().cloned().unwrap_or_default()
            }
        }
    }

    fn timeout_reason(&self) -> String {
        format!(
            "no response within {}ms",
            self.config.attempt_timeout.as_millis()
        )
    }
}

impl std::fmt::Debug for GatewayResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayResolver")
            .field("config", &self.config)
            .finish()
    }
}
