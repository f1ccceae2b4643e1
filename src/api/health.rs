//! Health Checks
//!
//! Process liveness and readiness. A process that answers is live; readiness
//! follows the coordinator lifecycle: ready after `init`, not ready after
//! `shutdown`.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        *self == HealthStatus::Healthy
    }

    fn from_flag(flag: bool) -> Self {
        if flag {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "Healthy"),
            HealthStatus::Unhealthy => write!(f, "Unhealthy"),
        }
    }
}

/// Health check result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckResult {
    pub name: String,
    pub status: HealthStatus,
    pub message: Option<String>,
    pub uptime_seconds: u64,
    pub version: String,
}

/// Process health tracker
#[derive(Debug)]
pub struct HealthCheck {
    start_time: Instant,
}

impl HealthCheck {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Get liveness response
    pub fn liveness_check(&self) -> HealthCheckResult {
        self.result("liveness", HealthStatus::Healthy, None)
    }

    /// Get readiness response for the given coordinator state
    pub fn readiness_check(&self, coordinator_running: bool) -> HealthCheckResult {
        let status = HealthStatus::from_flag(coordinator_running);
        let message = if status.is_healthy() {
            None
        } else {
            Some("Coordinator not ready".to_string())
        };
        self.result("readiness", status, message)
    }

    fn result(&self, name: &str, status: HealthStatus, message: Option<String>) -> HealthCheckResult {
        HealthCheckResult {
            name: name.to_string(),
            status,
            message,
            uptime_seconds: self.uptime().as_secs(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
