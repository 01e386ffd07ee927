//! Frame to added/changed/removed translation
//!
//! [`Materializer`] applies `put` and `patch` frames to the subscription's
//! [`SnapshotCache`] and reports which top-level children changed.
//! [`EventDispatcher`] decodes those children and calls the listener.

use std::collections::BTreeMap;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{trace, warn};

use super::cache::SnapshotCache;
use super::listener::{ChangeListener, DecodeError};
use super::merge::{get_at, normalize, segments, set_at, PatchMerge};
use super::types::{Frame, Payload, StreamError};

const ROOT: &str = "/";

/// A change to one top-level child, keyed by child name (`""` for the root)
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Added(String, Value),
    Changed(String, Value),
    Removed(String),
}

fn cache_key(child: &str) -> String {
    format!("/{child}")
}

fn child_key(cache_key: &str) -> String {
    cache_key.trim_start_matches('/').to_string()
}

/// Applies frames to a [`SnapshotCache`]
#[derive(Debug, Default)]
pub struct Materializer {
    cache: SnapshotCache,
    merge: PatchMerge,
}

impl Materializer {
    pub fn new(merge: PatchMerge) -> Self {
        Self {
            cache: SnapshotCache::new(),
            merge,
        }
    }

    pub fn cache(&self) -> &SnapshotCache {
        &self.cache
    }

    /// Apply one frame and return the resulting changes in delivery order
    pub fn apply(&mut self, frame: &Frame) -> Vec<Change> {
        match frame {
            Frame::Put(payload) => self.put(payload),
            Frame::Patch(payload) => self.patch(payload),
            Frame::KeepAlive | Frame::Cancel(_) | Frame::AuthRevoked(_) => Vec::new(),
        }
    }

    /// Drop every cached entry, returning how many there were
    pub fn release(&mut self) -> usize {
        self.cache.clear(ROOT).len()
    }

    fn put(&mut self, payload: &Payload) -> Vec<Change> {
        let path = segments(&payload.path);
        match path.split_first() {
            None => self.replace_root(normalize(payload.data.clone())),
            Some((child, rest)) => {
                let data = payload.data.clone();
                self.update_child(child, |current| set_at(current, rest, data))
            }
        }
    }

    fn patch(&mut self, payload: &Payload) -> Vec<Change> {
        let Value::Object(fields) = &payload.data else {
            warn!(path = %payload.path, "Patch data is not an object, applying as put");
            return self.put(payload);
        };

        // Keys may be multi-segment paths; group them by the child they touch
        // so each child reports at most one change per frame.
        let base = segments(&payload.path);
        let mut per_child: BTreeMap<String, Vec<(Vec<String>, Value)>> = BTreeMap::new();
        for (key, value) in fields {
            let mut full = base.clone();
            full.extend(segments(key));
            if full.is_empty() {
                continue;
            }
            let child = full.remove(0);
            per_child
                .entry(child)
                .or_default()
                .push((full, value.clone()));
        }

        let merge = self.merge;
        let mut changes = Vec::new();
        for (child, updates) in per_child {
            changes.extend(self.update_child(&child, |mut current| {
                for (rest, value) in updates {
                    let value = merge.combine(get_at(current.as_ref(), &rest), value);
                    current = set_at(current, &rest, value);
                }
                current
            }));
        }
        changes
    }

    fn replace_root(&mut self, value: Option<Value>) -> Vec<Change> {
        let next: BTreeMap<String, Value> = match value {
            None => {
                return self
                    .cache
                    .clear(ROOT)
                    .into_iter()
                    .map(|(key, _)| Change::Removed(child_key(&key)))
                    .collect();
            }
            Some(Value::Object(map)) => map
                .into_iter()
                .map(|(key, value)| (cache_key(&key), value))
                .collect(),
            Some(Value::Array(items)) => items
                .into_iter()
                .enumerate()
                .filter_map(|(i, item)| normalize(item).map(|v| (cache_key(&i.to_string()), v)))
                .collect(),
            Some(primitive) => BTreeMap::from([(ROOT.to_string(), primitive)]),
        };

        let stale: Vec<String> = self
            .cache
            .iter()
            .map(|(key, _)| key)
            .filter(|key| !next.contains_key(*key))
            .map(str::to_string)
            .collect();

        let mut changes = Vec::new();
        for key in stale {
            self.cache.remove(&key);
            changes.push(Change::Removed(child_key(&key)));
        }
        for (key, value) in next {
            let child = child_key(&key);
            let current = self.cache.get(&key).cloned();
            changes.extend(self.settle(&key, child, current, Some(value)));
        }
        changes
    }

    fn update_child(
        &mut self,
        child: &str,
        f: impl FnOnce(Option<Value>) -> Option<Value>,
    ) -> Vec<Change> {
        let key = cache_key(child);
        let current = self.cache.get(&key).cloned();
        let next = f(current.clone());

        let mut changes = Vec::new();
        // A primitive root cannot coexist with children
        if next.is_some() && self.cache.remove(ROOT).is_some() {
            changes.push(Change::Removed(String::new()));
        }
        changes.extend(self.settle(&key, child.to_string(), current, next));
        changes
    }

    fn settle(
        &mut self,
        key: &str,
        child: String,
        current: Option<Value>,
        next: Option<Value>,
    ) -> Option<Change> {
        match (current, next) {
            (None, None) => None,
            (None, Some(value)) => {
                self.cache.add_or_update(key, value.clone());
                Some(Change::Added(child, value))
            }
            (Some(_), None) => {
                self.cache.remove(key);
                Some(Change::Removed(child))
            }
            (Some(old), Some(new)) if old == new => None,
            (Some(_), Some(value)) => {
                self.cache.add_or_update(key, value.clone());
                Some(Change::Changed(child, value))
            }
        }
    }
}

/// Applies frames and delivers typed notifications to a listener
pub struct EventDispatcher<T, L> {
    materializer: Materializer,
    listener: L,
    _marker: PhantomData<fn() -> T>,
}

impl<T, L> EventDispatcher<T, L>
where
    T: DeserializeOwned,
    L: ChangeListener<T>,
{
    pub fn new(listener: L, merge: PatchMerge) -> Self {
        Self {
            materializer: Materializer::new(merge),
            listener,
            _marker: PhantomData,
        }
    }

    /// Apply `frame` and notify the listener; `proceed` is checked before
    /// every callback so a cancel issued from inside one stops the rest.
    ///
    /// Returns the number of changes the frame produced.
    pub fn dispatch(&mut self, frame: &Frame, proceed: impl Fn() -> bool) -> usize {
        let changes = self.materializer.apply(frame);
        let count = changes.len();
        trace!(event = frame.event_name(), changes = count, "Frame applied");

        for change in changes {
            if !proceed() {
                return count;
            }
            self.deliver(change);
        }
        if count > 0 && proceed() {
            self.listener.on_settled();
        }
        count
    }

    /// Report a terminal failure to the listener
    pub fn report_fatal(&mut self, error: StreamError) {
        self.listener.on_fatal(error);
    }

    /// Drop all cached entries
    pub fn release(&mut self) -> usize {
        self.materializer.release()
    }

    fn deliver(&mut self, change: Change) {
        match change {
            Change::Added(key, value) => match decode::<T>(&key, value) {
                Ok(value) => self.listener.on_added(&key, value),
                Err(e) => self.listener.on_decode_error(e),
            },
            Change::Changed(key, value) => match decode::<T>(&key, value) {
                Ok(value) => self.listener.on_changed(&key, value),
                Err(e) => self.listener.on_decode_error(e),
            },
            Change::Removed(key) => self.listener.on_removed(&key),
        }
    }
}

fn decode<T: DeserializeOwned>(key: &str, value: Value) -> Result<T, DecodeError> {
    serde_json::from_value(value).map_err(|source| DecodeError {
        key: key.to_string(),
        source,
    })
}
