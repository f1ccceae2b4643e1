//! Scripted in-process adapters
//!
//! Stand-ins for cluster nodes and public gateways, driven entirely by what
//! the caller configures. Every call is recorded so tests can assert on order
//! and on what was never attempted.

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use serde_json::Value;

use crate::domain::{
    Cid, ClusterNodeClient, ContentMetadata, GatewayClient, PinFilter, PinRecord, StagedUpload,
    UnpinOutcome,
};
use crate::error::{Error, Result};

// =============================================================================
// Cluster Node Mock
// =============================================================================

/// Scripted reply of a node to `add`.
#[derive(Debug, Clone)]
pub enum MockAdd {
    /// Reply with this body
    Body(String),
    /// Fail the connection with this reason
    TransportError(String),
    /// Never answer within this duration
    Hang(Duration),
}

#[derive(Debug, Default)]
struct MockNode {
    healthy: bool,
    health_delay: Option<Duration>,
    peers: Vec<Value>,
    pins: Vec<PinRecord>,
    add: Option<MockAdd>,
    fail_pin_status: bool,
}

/// In-process cluster. Unconfigured endpoints behave like dead nodes.
#[derive(Debug, Default)]
pub struct MockClusterClient {
    nodes: RwLock<HashMap<String, MockNode>>,
    calls: RwLock<Vec<(&'static str, String)>>,
    staged: RwLock<Vec<PathBuf>>,
    uploaded: RwLock<Vec<(String, Vec<u8>)>>,
}

impl MockClusterClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_node<R>(&self, endpoint: &str, f: impl FnOnce(&mut MockNode) -> R) -> R {
        let mut nodes = self.nodes.write();
        f(nodes.entry(endpoint.to_string()).or_default())
    }

    pub fn set_healthy(&self, endpoint: &str, healthy: bool) {
        self.with_node(endpoint, |n| n.healthy = healthy);
    }

    /// Health answers only after `delay`; the node is otherwise healthy.
    pub fn set_health_delay(&self, endpoint: &str, delay: Duration) {
        self.with_node(endpoint, |n| {
            n.healthy = true;
            n.health_delay = Some(delay);
        });
    }

    pub fn set_peers(&self, endpoint: &str, peers: Vec<Value>) {
        self.with_node(endpoint, |n| n.peers = peers);
    }

    pub fn add_pin(&self, endpoint: &str, record: PinRecord) {
        self.with_node(endpoint, |n| {
            n.pins.retain(|p| p.cid() != record.cid());
            n.pins.push(record);
        });
    }

    pub fn set_add_response(&self, endpoint: &str, response: MockAdd) {
        self.with_node(endpoint, |n| n.add = Some(response));
    }

    /// Make pin status reads against this node fail.
    pub fn fail_pin_status(&self, endpoint: &str) {
        self.with_node(endpoint, |n| n.fail_pin_status = true);
    }

    /// Endpoints that received `operation`, in call order.
    pub fn endpoints_called(&self, operation: &str) -> Vec<String> {
        self.calls
            .read()
            .iter()
            .filter(|(op, _)| *op == operation)
            .map(|(_, endpoint)| endpoint.clone())
            .collect()
    }

    /// Paths of every staged file handed to `add`.
    pub fn staged_paths(&self) -> Vec<PathBuf> {
        self.staged.read().clone()
    }

    /// Bytes each node received through `add`.
    pub fn uploaded(&self) -> Vec<(String, Vec<u8>)> {
        self.uploaded.read().clone()
    }

    fn record(&self, operation: &'static str, endpoint: &str) {
        self.calls.write().push((operation, endpoint.to_string()));
    }

    /// Fail unless the node is configured and up.
    fn require_up(&self, endpoint: &str) -> Result<()> {
        match self.nodes.read().get(endpoint) {
            Some(node) if node.healthy => Ok(()),
            _ => Err(Error::NodeResponse {
                node: endpoint.to_string(),
                status: 503,
                body: "node unavailable".into(),
            }),
        }
    }
}

#[async_trait]
impl ClusterNodeClient for MockClusterClient {
    async fn health(&self, endpoint: &str) -> Result<()> {
        self.record("health", endpoint);
        let delay = self.nodes.read().get(endpoint).and_then(|n| n.health_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.require_up(endpoint)
    }

    async fn peers(&self, endpoint: &str) -> Result<Vec<Value>> {
        self.record("peers", endpoint);
        self.require_up(endpoint)?;
        Ok(self.with_node(endpoint, |n| n.peers.clone()))
    }

    async fn pins(&self, endpoint: &str, filter: &PinFilter) -> Result<Vec<PinRecord>> {
        self.record("pins", endpoint);
        self.require_up(endpoint)?;
        Ok(self.with_node(endpoint, |n| {
            n.pins
                .iter()
                .filter(|p| filter.matches(p.overall_state()))
                .cloned()
                .collect()
        }))
    }

    async fn pin_status(&self, endpoint: &str, cid: &Cid) -> Result<Option<PinRecord>> {
        self.record("pin_status", endpoint);
        self.require_up(endpoint)?;
        self.with_node(endpoint, |n| {
            if n.fail_pin_status {
                return Err(Error::NodeResponse {
                    node: endpoint.to_string(),
                    status: 500,
                    body: "pin tracker unavailable".into(),
                });
            }
            Ok(n.pins.iter().find(|p| p.cid() == cid).cloned())
        })
    }

    async fn unpin(&self, endpoint: &str, cid: &Cid) -> Result<UnpinOutcome> {
        self.record("unpin", endpoint);
        self.require_up(endpoint)?;
        Ok(self.with_node(endpoint, |n| {
            let before = n.pins.len();
            n.pins.retain(|p| p.cid() != cid);
            if n.pins.len() < before {
                UnpinOutcome::Removed
            } else {
                UnpinOutcome::AlreadyUnpinned
            }
        }))
    }

    async fn add(&self, endpoint: &str, upload: &StagedUpload) -> Result<String> {
        self.record("add", endpoint);
        self.staged.write().push(upload.path().to_path_buf());
        self.require_up(endpoint)?;

        let data = tokio::fs::read(upload.path()).await?;
        self.uploaded.write().push((endpoint.to_string(), data));

        let scripted = self.with_node(endpoint, |n| n.add.clone());
        match scripted {
            Some(MockAdd::Body(body)) => Ok(body),
            Some(MockAdd::TransportError(reason)) => Err(Error::Io(io::Error::new(
                io::ErrorKind::ConnectionReset,
                reason,
            ))),
            Some(MockAdd::Hang(duration)) => {
                tokio::time::sleep(duration).await;
                Err(Error::timeout("add", duration))
            }
            None => Err(Error::NodeResponse {
                node: endpoint.to_string(),
                status: 500,
                body: "no add response scripted".into(),
            }),
        }
    }
}

// =============================================================================
// Gateway Mock
// =============================================================================

#[derive(Debug, Clone)]
enum MockGatewayReply {
    Serve { body: Bytes, delay: Option<Duration> },
    Status(u16),
    Fail(String),
    Hang(Duration),
}

/// In-process public gateways. Unconfigured gateways refuse connections.
#[derive(Debug, Default)]
pub struct MockGatewayClient {
    replies: RwLock<HashMap<String, MockGatewayReply>>,
    calls: RwLock<Vec<(&'static str, String)>>,
}

impl MockGatewayClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(&self, gateway: &str, body: impl Into<Bytes>) {
        self.set(gateway, MockGatewayReply::Serve {
            body: body.into(),
            delay: None,
        });
    }

    /// Serve the body after a delay; used to shape latency rankings.
    pub fn serve_after(&self, gateway: &str, delay: Duration, body: impl Into<Bytes>) {
        self.set(gateway, MockGatewayReply::Serve {
            body: body.into(),
            delay: Some(delay),
        });
    }

    pub fn respond_status(&self, gateway: &str, status: u16) {
        self.set(gateway, MockGatewayReply::Status(status));
    }

    pub fn fail(&self, gateway: &str, reason: &str) {
        self.set(gateway, MockGatewayReply::Fail(reason.to_string()));
    }

    pub fn hang(&self, gateway: &str, duration: Duration) {
        self.set(gateway, MockGatewayReply::Hang(duration));
    }

    /// Gateways that received `operation` ("fetch" or "head"), in call order.
    pub fn gateways_called(&self, operation: &str) -> Vec<String> {
        self.calls
            .read()
            .iter()
            .filter(|(op, _)| *op == operation)
            .map(|(_, gateway)| gateway.clone())
            .collect()
    }

    fn set(&self, gateway: &str, reply: MockGatewayReply) {
        self.replies.write().insert(gateway.to_string(), reply);
    }

    async fn respond(&self, operation: &'static str, gateway: &str) -> Result<Bytes> {
        self.calls.write().push((operation, gateway.to_string()));
        let reply = self.replies.read().get(gateway).cloned();

        match reply {
            Some(MockGatewayReply::Serve { body, delay }) => {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                Ok(body)
            }
            Some(MockGatewayReply::Status(status)) => Err(Error::GatewayResponse {
                gateway: gateway.to_string(),
                status,
            }),
            Some(MockGatewayReply::Fail(reason)) => Err(Error::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                reason,
            ))),
            Some(MockGatewayReply::Hang(duration)) => {
                tokio::time::sleep(duration).await;
                Err(Error::timeout(operation, duration))
            }
            None => Err(Error::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "gateway not reachable",
            ))),
        }
    }
}

#[async_trait]
impl GatewayClient for MockGatewayClient {
    async fn fetch(&self, gateway: &str, _cid: &Cid, _timeout: Duration) -> Result<Bytes> {
        self.respond("fetch", gateway).await
    }

    async fn head(&self, gateway: &str, cid: &Cid, _timeout: Duration) -> Result<ContentMetadata> {
        let body = self.respond("head", gateway).await?;
        Ok(ContentMetadata {
            cid: cid.to_string(),
            gateway: gateway.to_string(),
            size: Some(body.len() as u64),
            content_type: Some("application/octet-stream".to_string()),
            last_modified: None,
        })
    }
}
