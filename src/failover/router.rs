//! Primary → backup resolution.
//!
//! # Responsibilities
//! - Hold the static failover mapping
//! - Decide, from status snapshots alone, which resource serves a name
//! - Track which primaries are currently diverted
//!
//! # Design Decisions
//! - `resolve` is pure; bookkeeping is a separate explicit step so the
//!   caller can emit enter/leave events exactly once per edge
//! - Both sides unhealthy means no failover; the primary's circuit is the
//!   remaining safety net

use std::collections::{BTreeMap, BTreeSet};

use parking_lot::Mutex;
use serde::Serialize;

use crate::health::HealthStatus;
use crate::observability::metrics;

/// Outcome of [`FailoverRouter::resolve`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    /// Resource that should serve the request.
    pub name: String,
    /// Whether `name` is a backup standing in for the requested primary.
    pub is_failover: bool,
}

impl Resolution {
    pub fn direct(name: &str) -> Self {
        Self {
            name: name.to_string(),
            is_failover: false,
        }
    }
}

#[derive(Debug, Default)]
pub struct FailoverRouter {
    mappings: BTreeMap<String, String>,
    active: Mutex<BTreeSet<String>>,
}

impl FailoverRouter {
    /// Mappings are assumed validated against the registered connections.
    pub fn new(mappings: BTreeMap<String, String>) -> Self {
        Self {
            mappings,
            active: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn has_failover(&self, name: &str) -> bool {
        self.mappings.contains_key(name)
    }

    pub fn backup(&self, name: &str) -> Option<&str> {
        self.mappings.get(name).map(String::as_str)
    }

    pub fn mappings(&self) -> &BTreeMap<String, String> {
        &self.mappings
    }

    /// Resolve `name` given a status lookup. Unknown statuses count as healthy.
    pub fn resolve<F>(&self, name: &str, status_of: F) -> Resolution
    where
        F: Fn(&str) -> Option<HealthStatus>,
    {
        let Some(backup) = self.mappings.get(name) else {
            return Resolution::direct(name);
        };

        let primary = status_of(name).unwrap_or_default();
        let standby = status_of(backup).unwrap_or_default();

        if !primary.is_healthy() && !standby.is_unhealthy() {
            Resolution {
                name: backup.clone(),
                is_failover: true,
            }
        } else {
            Resolution::direct(name)
        }
    }

    /// Mark `name` as diverted. Returns `true` only if it was not already.
    pub fn activate_failover(&self, name: &str) -> bool {
        let inserted = self.active.lock().insert(name.to_string());
        if inserted {
            metrics::record_failover_active(name, true);
        }
        inserted
    }

    /// Clear the diversion for `name`. Returns `true` only if it was active.
    pub fn deactivate_failover(&self, name: &str) -> bool {
        let removed = self.active.lock().remove(name);
        if removed {
            metrics::record_failover_active(name, false);
        }
        removed
    }

    pub fn is_in_failover(&self, name: &str) -> bool {
        self.active.lock().contains(name)
    }

    pub fn active_failovers(&self) -> Vec<String> {
        self.active.lock().iter().cloned().collect()
    }
}
