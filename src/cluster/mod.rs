//! Cluster Coordination
//!
//! Node selection, upload orchestration, status aggregation and fleet health
//! for a small IPFS Cluster fleet.
//!
//! ## Components
//!
//! - **HealthProber**: Bounded per-node liveness probes
//! - **NodeSelector**: First healthy node in priority order
//! - **PinOrchestrator**: Upload, CID extraction and best-effort pin verification
//! - **StatusAggregator**: Status, peers, pins and unpin through one proxy node
//! - **FailoverController**: Quorum-based fleet health verdict
//! - **ClusterCoordinator**: Facade wiring the above with the gateway fallback
//!
//! ## Example
//!
//! ```ignore
//! use pinfleet::cluster::ClusterCoordinator;
//! use pinfleet::config::CoordinatorConfig;
//!
//! let coordinator = ClusterCoordinator::init(CoordinatorConfig::default())?;
//! let health = coordinator.health_check().await?;
//! println!("{} ({}/{})", health.status, health.online_nodes, health.total_nodes);
//! ```

pub mod cid;
pub mod coordinator;
pub mod failover;
pub mod orchestrator;
pub mod prober;
pub mod selector;
pub mod status;

#[cfg(test)]
mod proptest;

pub(crate) use crate::domain::publish_or_log as emit;

pub use cid::extract_cid;
pub use coordinator::ClusterCoordinator;
pub use failover::{FailoverController, FleetHealth, FleetStatus};
pub use orchestrator::{OrchestratorConfig, PinOrchestrator};
pub use prober::{HealthProber, ProbeOutcome, ProbeReport};
pub use selector::NodeSelector;
pub use status::{PinStatusReport, StatusAggregator};
