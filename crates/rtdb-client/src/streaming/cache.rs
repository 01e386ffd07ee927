//! Per-subscription snapshot of materialized values
//!
//! Entries are keyed by their full path under the subscription root: `/x`
//! for the top-level child `x`, `/` for a root that holds a primitive. An
//! entry exists only while the subscription believes a value exists there.

use std::collections::BTreeMap;

use serde_json::Value;

/// Last known values for one subscription
#[derive(Debug, Default)]
pub struct SnapshotCache {
    entries: BTreeMap<String, Value>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        self.entries.get(path)
    }

    /// Store `value` at `path`, returning the value it replaced
    pub fn add_or_update(&mut self, path: impl Into<String>, value: Value) -> Option<Value> {
        self.entries.insert(path.into(), value)
    }

    pub fn remove(&mut self, path: &str) -> Option<Value> {
        self.entries.remove(path)
    }

    /// Drop every entry at or below `root_path` and hand them back in path order
    pub fn clear(&mut self, root_path: &str) -> Vec<(String, Value)> {
        let root = root_path.trim_end_matches('/');
        let keys: Vec<String> = self
            .entries
            .keys()
            .filter(|key| is_within(key, root))
            .cloned()
            .collect();

        keys.into_iter()
            .filter_map(|key| self.entries.remove(&key).map(|value| (key, value)))
            .collect()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in path order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// `root` is given without its trailing slash; the empty string is the tree root.
fn is_within(key: &str, root: &str) -> bool {
    if root.is_empty() {
        return true;
    }
    key == root
        || key
            .strip_prefix(root)
            .is_some_and(|rest| rest.starts_with('/'))
}
