//! Infrastructure Adapters
//!
//! This module contains adapter implementations for the domain ports,
//! following the Port/Adapter (Hexagonal) architecture pattern.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Domain Layer                              │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │                    Ports (Traits)                           │ │
//! │  │   ClusterNodeClient │ GatewayClient │ EventPublisher       │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Adapters (This Module)                       │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │ HttpClusterClient │ HttpGatewayClient │ LoggingEventPub.  │ │
//! │  │ MockClusterClient │ MockGatewayClient │ EventJournal      │ │
//! │  │                   │                   │ FanoutEventPub.   │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use pinfleet::adapters::{HttpClusterClient, HttpGatewayClient, LoggingEventPublisher};
//! use pinfleet::domain::ports::ClusterNodeClient;
//!
//! let cluster = HttpClusterClient::new(&config)?;
//! cluster.health("http://127.0.0.1:9094").await?;
//! ```

mod cluster_http;
mod gateway_http;
mod mock;

pub use cluster_http::HttpClusterClient;
pub use gateway_http::HttpGatewayClient;
pub use mock::{MockAdd, MockClusterClient, MockGatewayClient};

// Re-export event publishers for convenience
mod event_publisher;
pub use event_publisher::{
    EventJournal, EventSeverity, FanoutEventPublisher, LoggingEventPublisher,
    DEFAULT_JOURNAL_CAPACITY,
};
