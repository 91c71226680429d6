//! Metrics recording.
//!
//! # Metrics
//! - `sentinel_resource_health` (gauge): 1=healthy, 0.5=degraded, 0=unhealthy
//! - `sentinel_circuit_open` (gauge): 1 while a resource's circuit is open
//! - `sentinel_failover_active` (gauge): 1 while a primary is served by its backup
//! - `sentinel_health_checks_total` (counter): checks by resource and outcome
//! - `sentinel_circuit_rejections_total` (counter): calls refused by an open circuit
//!
//! # Design Decisions
//! - Recorded through the `metrics` facade; installing an exporter is up to the host
//! - Without an installed recorder every call is a no-op

use crate::health::HealthStatus;

pub fn record_resource_health(resource: &str, status: HealthStatus) {
    let value = match status {
        HealthStatus::Healthy => 1.0,
        HealthStatus::Degraded => 0.5,
        HealthStatus::Unhealthy => 0.0,
    };
    metrics::gauge!("sentinel_resource_health", "resource" => resource.to_string()).set(value);
}

pub fn record_circuit_open(resource: &str, open: bool) {
    metrics::gauge!("sentinel_circuit_open", "resource" => resource.to_string())
        .set(if open { 1.0 } else { 0.0 });
}

pub fn record_failover_active(primary: &str, active: bool) {
    metrics::gauge!("sentinel_failover_active", "primary" => primary.to_string())
        .set(if active { 1.0 } else { 0.0 });
}

pub fn record_health_check(resource: &str, status: HealthStatus) {
    metrics::counter!(
        "sentinel_health_checks_total",
        "resource" => resource.to_string(),
        "outcome" => status.as_str()
    )
    .increment(1);
}

pub fn record_circuit_rejection(resource: &str) {
    metrics::counter!("sentinel_circuit_rejections_total", "resource" => resource.to_string())
        .increment(1);
}
