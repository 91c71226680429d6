//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Scheduled cycle (monitor.rs):
//!     Periodic timer (one cycle in flight at most)
//!     → Coordinator checks every resource concurrently
//!     → monitor.check(name): probe.rs with timeout + retry
//!     → CheckResult { status, error, attempts }
//!
//! Status table (monitor.rs):
//!     Written by the coordinator on transition or administrative override
//!     Read by the failover router on resolution
//! ```
//!
//! # Design Decisions
//! - A resource without a probe is always healthy
//! - A check never writes status itself; the coordinator applies transitions
//!   so that status, circuit and events change together
//! - Status is per-resource, defaulting to healthy on registration

pub mod monitor;
pub mod probe;
pub mod status;

pub use monitor::HealthMonitor;
pub use probe::{BoxError, CheckResult, HealthCheckError, Probe, ProbeVerdict};
pub use status::HealthStatus;
