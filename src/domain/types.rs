//! Domain Value Objects
//!
//! Identifiers, pin records and the fleet snapshot shared by every component.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

// =============================================================================
// Identifiers
// =============================================================================

/// Cluster node identifier (value object).
///
/// For configured nodes this is the endpoint URL; inside pin records it is the
/// peer name reported by the cluster.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Content identifier (value object). Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Cid(String);

impl Cid {
    /// Parse a CID, accepting any non-empty alphanumeric (multibase) string.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidCid("empty identifier".into()));
        }
        if !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::InvalidCid(trimmed.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for base58btc CIDv0 identifiers.
    pub fn is_v0(&self) -> bool {
        self.0.starts_with("Qm") && self.0.len() == 46
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Cid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Cid::parse(s)
    }
}

// =============================================================================
// Pin State
// =============================================================================

/// Pin state of a CID on one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinState {
    Queued,
    Pinning,
    Pinned,
    Unpinned,
    Error,
}

impl PinState {
    /// Map an IPFS Cluster tracker status string onto a pin state.
    pub fn from_cluster_status(status: &str) -> Self {
        match status.to_ascii_lowercase().as_str() {
            "pinned" => PinState::Pinned,
            "pinning" => PinState::Pinning,
            "pin_queued" | "queued" => PinState::Queued,
            "pin_error" | "unpin_error" | "error" | "cluster_error" => PinState::Error,
            // unpinned, unpin_queued, unpinning, remote, undefined
            _ => PinState::Unpinned,
        }
    }

    /// Token used in the cluster `?filter=` query.
    pub fn as_filter_token(&self) -> &'static str {
        match self {
            PinState::Queued => "queued",
            PinState::Pinning => "pinning",
            PinState::Pinned => "pinned",
            PinState::Unpinned => "unpinned",
            PinState::Error => "error",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            PinState::Pinned => 4,
            PinState::Pinning => 3,
            PinState::Queued => 2,
            PinState::Error => 1,
            PinState::Unpinned => 0,
        }
    }
}

impl fmt::Display for PinState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_filter_token())
    }
}

impl FromStr for PinState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "queued" => Ok(PinState::Queued),
            "pinning" => Ok(PinState::Pinning),
            "pinned" => Ok(PinState::Pinned),
            "unpinned" => Ok(PinState::Unpinned),
            "error" => Ok(PinState::Error),
            other => Err(Error::Config(format!("unknown pin state: {}", other))),
        }
    }
}

/// Set of pin states used to filter listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PinFilter(Vec<PinState>);

impl PinFilter {
    /// Duplicates are dropped; first-seen order is kept for the query string.
    pub fn new(states: Vec<PinState>) -> Self {
        let mut unique = Vec::with_capacity(states.len());
        for state in states {
            if !unique.contains(&state) {
                unique.push(state);
            }
        }
        Self(unique)
    }

    /// Parse a comma separated list such as `pinned,pinning`.
    pub fn parse(raw: &str) -> Result<Self> {
        let states = raw
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(PinState::from_str)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(states))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn matches(&self, state: PinState) -> bool {
        self.0.is_empty() || self.0.contains(&state)
    }

    /// Value for the cluster `?filter=` query.
    pub fn as_query(&self) -> String {
        self.0
            .iter()
            .map(|s| s.as_filter_token())
            .collect::<Vec<_>>()
            .join(",")
    }
}

// =============================================================================
// Pin Record
// =============================================================================

/// Cluster-wide record of one pinned CID.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PinRecord {
    cid: Cid,
    pub name: String,
    pub size: Option<u64>,
    pub pinned_at: Option<DateTime<Utc>>,
    pub replication_factor: i32,
    pub pin_status_by_node: BTreeMap<NodeId, PinState>,
}

impl PinRecord {
    pub fn new(cid: Cid) -> Self {
        Self {
            cid,
            name: String::new(),
            size: None,
            pinned_at: None,
            replication_factor: 0,
            pin_status_by_node: BTreeMap::new(),
        }
    }

    pub fn cid(&self) -> &Cid {
        &self.cid
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_node_state(mut self, node: impl Into<String>, state: PinState) -> Self {
        self.pin_status_by_node.insert(NodeId::new(node), state);
        self
    }

    /// Fleet-level state: the most advanced state any node reports.
    pub fn overall_state(&self) -> PinState {
        self.pin_status_by_node
            .values()
            .copied()
            .max_by_key(PinState::rank)
            .unwrap_or(PinState::Unpinned)
    }

    /// Number of nodes holding a pinned copy.
    pub fn pinned_on(&self) -> usize {
        self.pin_status_by_node
            .values()
            .filter(|s| **s == PinState::Pinned)
            .count()
    }

    /// Build a record from an IPFS Cluster pin / GlobalPinInfo document.
    pub fn from_cluster_json(value: &Value) -> Result<Self> {
        let cid = value
            .get("cid")
            .or_else(|| value.get("Cid"))
            .and_then(cid_field)
            .ok_or_else(|| Error::ResponseParse {
                source_url: "pins".into(),
                reason: "pin entry has no cid".into(),
            })?;
        let mut record = PinRecord::new(Cid::parse(&cid)?);

        record.name = value
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        record.size = value.get("size").and_then(number_field);

        let mut earliest_pinned: Option<DateTime<Utc>> = None;
        if let Some(peer_map) = value.get("peer_map").and_then(Value::as_object) {
            for (peer_id, info) in peer_map {
                let node = info
                    .get("peername")
                    .and_then(Value::as_str)
                    .filter(|n| !n.is_empty())
                    .unwrap_or(peer_id);
                let state = info
                    .get("status")
                    .and_then(Value::as_str)
                    .map(PinState::from_cluster_status)
                    .unwrap_or(PinState::Unpinned);
                if state == PinState::Pinned {
                    if let Some(ts) = info.get("timestamp").and_then(timestamp_field) {
                        earliest_pinned = Some(earliest_pinned.map_or(ts, |e| e.min(ts)));
                    }
                }
                record.pin_status_by_node.insert(NodeId::new(node), state);
            }
        }

        record.pinned_at = value
            .get("created")
            .and_then(timestamp_field)
            .or(earliest_pinned);

        record.replication_factor = value
            .get("replication_factor_max")
            .and_then(Value::as_i64)
            .filter(|r| *r > 0)
            .map(|r| r as i32)
            .unwrap_or(record.pin_status_by_node.len() as i32);

        Ok(record)
    }
}

fn cid_field(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(map) => map.get("/").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

fn number_field(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn timestamp_field(value: &Value) -> Option<DateTime<Utc>> {
    value
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

// =============================================================================
// Fleet Snapshot
// =============================================================================

/// Fleet-wide view as reported by the one node that answered.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSnapshot {
    pub total_nodes: usize,
    pub active_node: String,
    pub peer_count: usize,
    pub pinned_count: usize,
    pub peers: Vec<Value>,
    pub pins: Vec<PinRecord>,
    pub fetched_at: DateTime<Utc>,
}

/// Result of an unpin request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum UnpinOutcome {
    /// The pin existed and was removed
    Removed,
    /// Nothing was pinned; treated as success
    AlreadyUnpinned,
}

// =============================================================================
// Gateways
// =============================================================================

/// A public gateway and its most recent measured latency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayEndpoint {
    pub url: String,
    pub last_response_time_ms: Option<u64>,
}

/// Header-level metadata of a CID as served by a gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentMetadata {
    pub cid: String,
    pub gateway: String,
    pub size: Option<u64>,
    pub content_type: Option<String>,
    pub last_modified: Option<String>,
}

/// Content URL of a CID on a gateway; accepts bases with or without `/ipfs`.
pub fn gateway_content_url(gateway: &str, cid: &Cid) -> String {
    let base = gateway.trim_end_matches('/');
    let base = base.strip_suffix("/ipfs").unwrap_or(base);
    format!("{}/ipfs/{}", base, cid)
}
