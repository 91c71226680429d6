//! Memoized resolutions.
//!
//! Entries are computed and inserted under one lock, and invalidation clears
//! everything under that same lock. A health transition writes the new
//! status first and invalidates second, so an entry computed from the old
//! status is always cleared, and any entry computed after the clear sees the
//! new status.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::failover::router::Resolution;

#[derive(Debug, Default)]
pub struct ResolutionCache {
    entries: Mutex<HashMap<String, Resolution>>,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached resolution for `name`, computing it with `resolve` on a miss.
    pub fn get_or_resolve<F>(&self, name: &str, resolve: F) -> Resolution
    where
        F: FnOnce() -> Resolution,
    {
        let mut entries = self.entries.lock();
        if let Some(hit) = entries.get(name) {
            return hit.clone();
        }
        let resolution = resolve();
        entries.insert(name.to_string(), resolution.clone());
        resolution
    }

    /// Drop every entry.
    pub fn invalidate(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
