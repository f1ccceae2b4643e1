//! PinFleet - IPFS Cluster Fleet Coordinator
//!
//! Control-plane layer for a small replicated IPFS Cluster fleet. Picks a live
//! node for each operation, uploads and pins content, reports fleet health,
//! and falls back to public gateways when content must be read without the
//! cluster.
//!
//! # Architecture
//!
//! ```text
//!                  ┌──────────────────────┐
//!                  │  ClusterCoordinator  │
//!                  └──────────┬───────────┘
//!        ┌───────────┬────────┴────┬──────────────┬───────────────┐
//!        ▼           ▼             ▼              ▼               ▼
//!   NodeSelector  PinOrchestr.  StatusAggr.  FailoverCtrl.  GatewayResolver
//!        │           │             │              │               │
//!        └─────▶ HealthProber ◀────┘──────────────┘               │
//!                    │                                            │
//!            ClusterNodeClient                              GatewayClient
//! ```
//!
//! # Modules
//!
//! - [`adapters`] - HTTP, in-memory and logging implementations of the ports
//! - [`api`] - HTTP surface and response envelope
//! - [`cluster`] - Node selection, uploads, status, fleet health
//! - [`config`] - Coordinator configuration
//! - [`domain`] - Domain types, ports and events
//! - [`error`] - Error types
//! - [`gateway`] - Public gateway fallback
//! - [`metrics`] - Prometheus metrics

pub mod adapters;
pub mod api;
pub mod cluster;
pub mod config;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod metrics;

// Re-export commonly used types
pub use cluster::{ClusterCoordinator, FleetHealth, FleetStatus};
pub use config::CoordinatorConfig;
pub use domain::{Cid, PinFilter, PinRecord, PinState, UploadRequest, UploadResult};
pub use error::{Error, Result};
pub use metrics::FleetMetrics;
