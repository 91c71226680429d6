//! Serializable health and stats views.

use serde::Serialize;

use crate::health::HealthStatus;
use crate::resilience::CircuitState;

/// One entry of [`Sentinel::health`](crate::Sentinel::health).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceHealth {
    pub status: HealthStatus,
    /// Backup currently serving this resource's requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failover_to: Option<String>,
}

/// One entry of [`Sentinel::stats`](crate::Sentinel::stats).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceStats {
    pub status: HealthStatus,
    /// `None` when the resource has no circuit protection.
    pub circuit: Option<CircuitState>,
    pub failures: u32,
    pub failover_to: Option<String>,
}
