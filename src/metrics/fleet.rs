//! Fleet Metrics
//!
//! Prometheus counters for node probes, uploads and gateway fetches, kept in
//! a registry owned by the coordinator rather than the global default.

use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use crate::error::{Error, Result};

/// Outcome label values.
pub const OUTCOME_SUCCESS: &str = "success";
pub const OUTCOME_FAILURE: &str = "failure";
pub const OUTCOME_TIMEOUT: &str = "timeout";

/// Metrics for one coordinator instance.
#[derive(Clone)]
pub struct FleetMetrics {
    registry: Registry,
    node_probes: IntCounterVec,
    uploads: IntCounterVec,
    gateway_requests: IntCounterVec,
    online_nodes: IntGauge,
}

impl FleetMetrics {
    /// Create and register all metrics.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let node_probes = IntCounterVec::new(
            Opts::new("pinfleet_node_probes_total", "Cluster node liveness probes"),
            &["outcome"],
        )
        .map_err(metric_error)?;
        let uploads = IntCounterVec::new(
            Opts::new("pinfleet_uploads_total", "Upload orchestrations"),
            &["outcome"],
        )
        .map_err(metric_error)?;
        let gateway_requests = IntCounterVec::new(
            Opts::new("pinfleet_gateway_requests_total", "Public gateway requests"),
            &["outcome"],
        )
        .map_err(metric_error)?;
        let online_nodes = IntGauge::new(
            "pinfleet_fleet_online_nodes",
            "Cluster nodes online at the last health check",
        )
        .map_err(metric_error)?;

        registry
            .register(Box::new(node_probes.clone()))
            .map_err(metric_error)?;
        registry
            .register(Box::new(uploads.clone()))
            .map_err(metric_error)?;
        registry
            .register(Box::new(gateway_requests.clone()))
            .map_err(metric_error)?;
        registry
            .register(Box::new(online_nodes.clone()))
            .map_err(metric_error)?;

        Ok(Self {
            registry,
            node_probes,
            uploads,
            gateway_requests,
            online_nodes,
        })
    }

    pub fn record_probe(&self, outcome: &str) {
        self.node_probes.with_label_values(&[outcome]).inc();
    }

    pub fn record_upload(&self, outcome: &str) {
        self.uploads.with_label_values(&[outcome]).inc();
    }

    pub fn record_gateway(&self, outcome: &str) {
        self.gateway_requests.with_label_values(&[outcome]).inc();
    }

    pub fn set_online_nodes(&self, online: usize) {
        self.online_nodes.set(online as i64);
    }

    pub fn probe_count(&self, outcome: &str) -> u64 {
        self.node_probes.with_label_values(&[outcome]).get()
    }

    pub fn upload_count(&self, outcome: &str) -> u64 {
        self.uploads.with_label_values(&[outcome]).get()
    }

    pub fn gateway_count(&self, outcome: &str) -> u64 {
        self.gateway_requests.with_label_values(&[outcome]).get()
    }

    /// Encode all metrics in the Prometheus text format.
    pub fn encode(&self) -> Result<(Vec<u8>, String)> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metric_error)?;
        Ok((buffer, encoder.format_type().to_string()))
    }
}

impl std::fmt::Debug for FleetMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FleetMetrics")
            .field("online_nodes", &self.online_nodes.get())
            .finish()
    }
}

fn metric_error(e: prometheus::Error) -> Error {
    Error::Internal(format!("metrics: {}", e))
}
