//! Domain Layer
//!
//! Value objects, node records, the upload state machine, events and the port
//! traits the cluster components are written against.
//!
//! - **Types** (`types.rs`) - CIDs, pin records, snapshots
//! - **Node** (`node.rs`) - Configured cluster nodes and their health
//! - **Upload** (`upload.rs`) - Upload state machine and temp-file staging
//! - **Ports** (`ports.rs`) - Trait abstractions for external dependencies
//! - **Events** (`events.rs`) - Domain events for audit and hand-off

pub mod events;
pub mod node;
pub mod ports;
pub mod types;
pub mod upload;

pub use events::ClusterEvent;
pub use node::{nodes_from_endpoints, ClusterNode, NodeHealth};
pub use ports::{publish_or_log, ClusterNodeClient, EventPublisher, GatewayClient};
pub use types::{
    gateway_content_url, Cid, ClusterSnapshot, ContentMetadata, GatewayEndpoint, NodeId,
    PinFilter, PinRecord, PinState, UnpinOutcome,
};
pub use upload::{
    StagedUpload, UploadAttempt, UploadRequest, UploadResult, UploadSource, UploadState,
};
