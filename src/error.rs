//! Error types for PinFleet

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// One failed attempt against a public gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GatewayFailure {
    /// Gateway base URL
    pub gateway: String,
    /// Human-readable failure reason
    pub reason: String,
}

impl GatewayFailure {
    pub fn new(gateway: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            gateway: gateway.into(),
            reason: reason.into(),
        }
    }
}

fn format_failures(failures: &[GatewayFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("  - {}: {}", f.gateway, f.reason))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Errors that can occur while coordinating the storage fleet
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Cluster Errors
    // =========================================================================
    /// No configured cluster node passed a liveness probe
    #[error("No available cluster node: all {tried} configured node(s) failed the liveness probe")]
    NoAvailableNode { tried: usize },

    /// Transport failure while streaming an upload
    #[error("Upload to {node} failed: {reason}")]
    UploadTransport { node: String, reason: String },

    /// The add response did not yield a parseable content identifier
    #[error("Failed to extract CID from add response: {0}")]
    CidExtraction(String),

    /// Status or listing query found no reachable node
    #[error("Cluster unavailable: {0}")]
    ClusterUnavailable(String),

    /// Unknown CID or missing resource
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed content identifier
    #[error("Invalid CID: {0}")]
    InvalidCid(String),

    /// Upstream request body could not be understood
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Request to a cluster node could not be completed
    #[error("Request to cluster node {node} failed: {source}")]
    NodeRequest {
        node: String,
        #[source]
        source: reqwest::Error,
    },

    /// Cluster node answered with a non-success status
    #[error("Cluster node {node} returned HTTP {status}: {body}")]
    NodeResponse {
        node: String,
        status: u16,
        body: String,
    },

    // =========================================================================
    // Gateway Errors
    // =========================================================================
    /// Every configured public gateway failed
    #[error("All {} gateway(s) failed for {cid}:\n{}", .failures.len(), format_failures(.failures))]
    AllGatewaysFailed {
        cid: String,
        failures: Vec<GatewayFailure>,
    },

    /// Request to a gateway could not be completed
    #[error("Gateway request failed: {0}")]
    GatewayRequest(#[source] reqwest::Error),

    /// Gateway answered with a non-success status
    #[error("Gateway {gateway} returned HTTP {status}")]
    GatewayResponse { gateway: String, status: u16 },

    // =========================================================================
    // Shared Errors
    // =========================================================================
    /// Response body could not be decoded
    #[error("Failed to parse response from {source_url}: {reason}")]
    ResponseParse { source_url: String, reason: String },

    /// Bounded call ran out of time
    #[error("{operation} timed out after {}ms", .after.as_millis())]
    Timeout {
        operation: String,
        after: Duration,
    },

    /// The coordinator has been shut down
    #[error("Coordinator has been shut down")]
    ShutDown,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable machine-readable name of the error variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NoAvailableNode { .. } => "NoAvailableNode",
            Error::UploadTransport { .. } => "UploadTransportError",
            Error::CidExtraction(_) => "CidExtractionError",
            Error::ClusterUnavailable(_) => "ClusterUnavailable",
            Error::NotFound(_) => "NotFound",
            Error::InvalidCid(_) => "InvalidCid",
            Error::BadRequest(_) => "BadRequest",
            Error::NodeRequest { .. } => "NodeRequestError",
            Error::NodeResponse { .. } => "NodeResponseError",
            Error::AllGatewaysFailed { .. } => "AllGatewaysFailed",
            Error::GatewayRequest(_) => "GatewayRequestError",
            Error::GatewayResponse { .. } => "GatewayResponseError",
            Error::ResponseParse { .. } => "ResponseParseError",
            Error::Timeout { .. } => "Timeout",
            Error::ShutDown => "ShutDown",
            Error::Io(_) => "IoError",
            Error::Config(_) => "ConfigError",
            Error::Internal(_) => "InternalError",
        }
    }

    /// Machine-inspectable detail for API callers, where available.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Error::AllGatewaysFailed { cid, failures } => Some(serde_json::json!({
                "cid": cid,
                "gateways": failures,
            })),
            Error::UploadTransport { node, reason } => Some(serde_json::json!({
                "node": node,
                "transport": reason,
            })),
            Error::NodeResponse { node, status, body } => Some(serde_json::json!({
                "node": node,
                "status": status,
                "body": body,
            })),
            Error::NodeRequest { node, source } => Some(serde_json::json!({
                "node": node,
                "transport": source.to_string(),
            })),
            Error::NoAvailableNode { tried } => Some(serde_json::json!({ "nodesTried": tried })),
            _ => None,
        }
    }

    /// Whether this error means the requested resource does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    pub(crate) fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Error::Timeout {
            operation: operation.into(),
            after,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_gateways_failed_lists_every_gateway() {
        let err = Error::AllGatewaysFailed {
            cid: "QmTest".to_string(),
            failures: vec![
                GatewayFailure::new("https://ipfs.io", "timed out"),
                GatewayFailure::new("https://dweb.link", "HTTP 404"),
                GatewayFailure::new("https://cloudflare-ipfs.com", "connection refused"),
            ],
        };

        let message = err.to_string();
        let gateway_lines: Vec<_> = message.lines().filter(|l| l.starts_with("  - ")).collect();

        assert_eq!(gateway_lines.len(), 3);
        assert!(message.contains("https://ipfs.io: timed out"));
        assert!(message.contains("https://dweb.link: HTTP 404"));
        assert!(message.starts_with("All 3 gateway(s) failed for QmTest"));
    }

    #[test]
    fn test_gateway_failure_details() {
        let err = Error::AllGatewaysFailed {
            cid: "QmTest".to_string(),
            failures: vec![GatewayFailure::new("https://ipfs.io", "HTTP 504")],
        };

        let details = err.details().unwrap();
        assert_eq!(details["cid"], "QmTest");
        assert_eq!(details["gateways"][0]["gateway"], "https://ipfs.io");
        assert_eq!(details["gateways"][0]["reason"], "HTTP 504");
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(Error::NoAvailableNode { tried: 5 }.kind(), "NoAvailableNode");
        assert_eq!(
            Error::CidExtraction("empty".into()).kind(),
            "CidExtractionError"
        );
        assert_eq!(
            Error::UploadTransport {
                node: "n".into(),
                reason: "reset".into()
            }
            .kind(),
            "UploadTransportError"
        );
        assert!(Error::NotFound("QmX".into()).is_not_found());
        assert!(!Error::ShutDown.is_not_found());
    }

    #[test]
    fn test_timeout_display() {
        let err = Error::timeout("Upload", Duration::from_secs(60));
        assert_eq!(err.to_string(), "Upload timed out after 60000ms");
        assert!(err.details().is_none());
    }
}
