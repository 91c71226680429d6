//! Named handle lookup.
//!
//! Handles are owned by the caller and shared as `Arc<T>`; the sentinel never
//! looks inside them.

use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug)]
pub struct Registry<T> {
    handles: BTreeMap<String, Arc<T>>,
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self {
            handles: BTreeMap::new(),
        }
    }

    /// Add or replace a handle. Returns the one it replaced.
    pub fn insert(&mut self, name: impl Into<String>, handle: Arc<T>) -> Option<Arc<T>> {
        self.handles.insert(name.into(), handle)
    }

    pub fn get(&self, name: &str) -> Option<Arc<T>> {
        self.handles.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handles.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handles.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<T>)> {
        self.handles.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        let mut registry = Registry::new();
        assert!(registry.is_empty());
        registry.insert("replica", Arc::new(2));
        assert!(registry.insert("primary", Arc::new(1)).is_none());

        assert_eq!(registry.get("primary").as_deref(), Some(&1));
        assert!(registry.get("missing").is_none());
        assert!(registry.contains("replica"));
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["primary", "replica"]);

        let old = registry.insert("primary", Arc::new(10));
        assert_eq!(old.as_deref(), Some(&1));
        assert_eq!(registry.len(), 2);
    }
}
