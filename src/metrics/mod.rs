//! Metrics module
//!
//! Prometheus instrumentation for the fleet coordinator.

mod fleet;

pub use fleet::{FleetMetrics, OUTCOME_FAILURE, OUTCOME_SUCCESS, OUTCOME_TIMEOUT};
