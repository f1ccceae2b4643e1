//! Coordinator Configuration
//!
//! Static configuration for the storage fleet. The node list is the only source
//! of cluster membership; it is read once at process start and never persisted.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};

// =============================================================================
// Defaults
// =============================================================================

/// Default cluster REST endpoints, most preferred first.
pub const DEFAULT_NODES: &[&str] = &[
    "http://127.0.0.1:9094",
    "http://127.0.0.1:9194",
    "http://127.0.0.1:9294",
    "http://127.0.0.1:9394",
    "http://127.0.0.1:9494",
];

/// Default public gateways, most preferred first.
pub const DEFAULT_GATEWAYS: &[&str] = &[
    "https://ipfs.io",
    "https://dweb.link",
    "https://cloudflare-ipfs.com",
    "https://gateway.pinata.cloud",
];

/// Empty unixfs directory; resolvable on every public gateway.
pub const DEFAULT_GATEWAY_TEST_CID: &str = "QmUNLLsPACCz1vLxQVkXqqLX5R1X345qqfHbsf67hvA3Nn";

/// Online node count at or above which the fleet reports HEALTHY.
pub const DEFAULT_HEALTHY_QUORUM: usize = 3;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for a [`ClusterCoordinator`](crate::cluster::ClusterCoordinator)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CoordinatorConfig {
    /// Cluster node REST endpoints in priority order
    pub nodes: Vec<String>,

    /// Public gateway base URLs in preference order
    pub gateways: Vec<String>,

    /// Liveness probe timeout
    pub probe_timeout_ms: u64,

    /// Upload timeout (body size is unbounded)
    pub upload_timeout_ms: u64,

    /// Timeout for peers/pins/status/unpin requests
    pub request_timeout_ms: u64,

    /// Per-gateway attempt timeout
    pub gateway_timeout_ms: u64,

    /// Fixed delay between upload and pin verification
    pub replication_grace_ms: u64,

    /// Absolute number of online nodes required for HEALTHY
    pub healthy_quorum: usize,

    /// Forwarded as `replication-min` on add
    pub replication_factor_min: Option<i32>,

    /// Forwarded as `replication-max` on add
    pub replication_factor_max: Option<i32>,

    /// CID probed when ranking gateways
    pub gateway_test_cid: String,

    /// Directory for temporary upload copies
    pub staging_dir: Option<PathBuf>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            nodes: DEFAULT_NODES.iter().map(|s| s.to_string()).collect(),
            gateways: DEFAULT_GATEWAYS.iter().map(|s| s.to_string()).collect(),
            probe_timeout_ms: 2_000,
            upload_timeout_ms: 60_000,
            request_timeout_ms: 10_000,
            gateway_timeout_ms: 10_000,
            replication_grace_ms: 3_000,
            healthy_quorum: DEFAULT_HEALTHY_QUORUM,
            replication_factor_min: None,
            replication_factor_max: None,
            gateway_test_cid: DEFAULT_GATEWAY_TEST_CID.to_string(),
            staging_dir: None,
        }
    }
}

impl CoordinatorConfig {
    /// Load configuration from a YAML file. Missing keys take their defaults.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&raw)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Parse configuration from a YAML document.
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        serde_yaml::from_str(raw).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_millis(self.upload_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_millis(self.gateway_timeout_ms)
    }

    pub fn replication_grace(&self) -> Duration {
        Duration::from_millis(self.replication_grace_ms)
    }

    /// Directory used to stage upload copies.
    pub fn staging_dir(&self) -> PathBuf {
        self.staging_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(Error::Config("at least one cluster node is required".into()));
        }
        if self.gateways.is_empty() {
            return Err(Error::Config("at least one public gateway is required".into()));
        }
        for url in self.nodes.iter().chain(self.gateways.iter()) {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(Error::Config(format!("not an http(s) URL: {}", url)));
            }
        }
        if self.healthy_quorum == 0 {
            return Err(Error::Config("healthyQuorum must be at least 1".into()));
        }
        let timeouts = [
            ("probeTimeoutMs", self.probe_timeout_ms),
            ("uploadTimeoutMs", self.upload_timeout_ms),
            ("requestTimeoutMs", self.request_timeout_ms),
            ("gatewayTimeoutMs", self.gateway_timeout_ms),
        ];
        for (name, value) in timeouts {
            if value == 0 {
                return Err(Error::Config(format!("{} must be greater than zero", name)));
            }
        }
        if let (Some(min), Some(max)) = (self.replication_factor_min, self.replication_factor_max)
        {
            // -1 means "every peer" in IPFS Cluster
            if max != -1 && min > max {
                return Err(Error::Config(format!(
                    "replicationFactorMin ({}) exceeds replicationFactorMax ({})",
                    min, max
                )));
            }
        }
        if self.healthy_quorum > self.nodes.len() {
            warn!(
                quorum = self.healthy_quorum,
                nodes = self.nodes.len(),
                "Healthy quorum exceeds fleet size; fleet can never report HEALTHY"
            );
        }
        Ok(())
    }
}
