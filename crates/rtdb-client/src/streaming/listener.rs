//! Caller-side receivers of change notifications
//!
//! Every subscription owns exactly one [`ChangeListener`]. It is called from
//! the subscription's read loop, one frame at a time, so implementations get
//! `&mut self` and never see concurrent calls.
//!
//! Keys are the names of the subscription root's direct children (`"x"` for
//! a change under `/x`). A root holding a primitive value is reported under
//! the empty key `""`.

use std::fmt;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, warn};

use super::types::StreamError;

/// A child value that could not be decoded into the listener's type
#[derive(Debug, Error)]
#[error("Failed to decode '{key}': {source}")]
pub struct DecodeError {
    /// Key of the child that failed
    pub key: String,
    /// Underlying deserialization error
    #[source]
    pub source: serde_json::Error,
}

/// Receiver of added/changed/removed notifications for one subscription
pub trait ChangeListener<T>: Send + 'static {
    /// A child appeared
    fn on_added(&mut self, _key: &str, _value: T) {}

    /// A child's value changed
    fn on_changed(&mut self, _key: &str, _value: T) {}

    /// A child disappeared
    fn on_removed(&mut self, _key: &str) {}

    /// A child's value did not match `T`; the subscription carries on
    fn on_decode_error(&mut self, error: DecodeError) {
        warn!(key = %error.key, error = %error.source, "Dropping undecodable value");
    }

    /// The subscription stopped for good; called at most once
    fn on_fatal(&mut self, error: StreamError) {
        error!(%error, "Subscription failed");
    }

    /// All notifications for one frame have been delivered
    fn on_settled(&mut self) {}
}

type KeyValueFn<T> = Box<dyn FnMut(&str, T) + Send>;

/// Closure-based [`ChangeListener`]
///
/// ```
/// use rtdb_client::streaming::Callbacks;
/// use serde_json::Value;
///
/// let listener = Callbacks::<Value>::new()
///     .on_added(|key, value| println!("+ {key} = {value}"))
///     .on_removed(|key| println!("- {key}"));
/// # drop(listener);
/// ```
pub struct Callbacks<T> {
    added: Option<KeyValueFn<T>>,
    changed: Option<KeyValueFn<T>>,
    removed: Option<Box<dyn FnMut(&str) + Send>>,
    decode_error: Option<Box<dyn FnMut(DecodeError) + Send>>,
    fatal: Option<Box<dyn FnMut(StreamError) + Send>>,
}

impl<T> Callbacks<T> {
    pub fn new() -> Self {
        Self {
            added: None,
            changed: None,
            removed: None,
            decode_error: None,
            fatal: None,
        }
    }

    pub fn on_added(mut self, f: impl FnMut(&str, T) + Send + 'static) -> Self {
        self.added = Some(Box::new(f));
        self
    }

    pub fn on_changed(mut self, f: impl FnMut(&str, T) + Send + 'static) -> Self {
        self.changed = Some(Box::new(f));
        self
    }

    pub fn on_removed(mut self, f: impl FnMut(&str) + Send + 'static) -> Self {
        self.removed = Some(Box::new(f));
        self
    }

    pub fn on_decode_error(mut self, f: impl FnMut(DecodeError) + Send + 'static) -> Self {
        self.decode_error = Some(Box::new(f));
        self
    }

    pub fn on_fatal(mut self, f: impl FnMut(StreamError) + Send + 'static) -> Self {
        self.fatal = Some(Box::new(f));
        self
    }
}

impl<T> Default for Callbacks<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Callbacks<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("added", &self.added.is_some())
            .field("changed", &self.changed.is_some())
            .field("removed", &self.removed.is_some())
            .finish_non_exhaustive()
    }
}

impl<T: 'static> ChangeListener<T> for Callbacks<T> {
    fn on_added(&mut self, key: &str, value: T) {
        if let Some(f) = self.added.as_mut() {
            f(key, value);
        }
    }

    fn on_changed(&mut self, key: &str, value: T) {
        if let Some(f) = self.changed.as_mut() {
            f(key, value);
        }
    }

    fn on_removed(&mut self, key: &str) {
        if let Some(f) = self.removed.as_mut() {
            f(key);
        }
    }

    fn on_decode_error(&mut self, error: DecodeError) {
        match self.decode_error.as_mut() {
            Some(f) => f(error),
            None => warn!(key = %error.key, error = %error.source, "Dropping undecodable value"),
        }
    }

    fn on_fatal(&mut self, error: StreamError) {
        match self.fatal.as_mut() {
            Some(f) => f(error),
            None => error!(%error, "Subscription failed"),
        }
    }
}

/// One notification, as delivered through a [`Subscription`](super::Subscription)
#[derive(Debug)]
pub enum ChangeEvent<T> {
    Added { key: String, value: T },
    Changed { key: String, value: T },
    Removed { key: String },
    DecodeFailed(DecodeError),
    Fatal(StreamError),
}

impl<T> ChangeEvent<T> {
    /// Child key the event refers to, if any
    pub fn key(&self) -> Option<&str> {
        match self {
            ChangeEvent::Added { key, .. }
            | ChangeEvent::Changed { key, .. }
            | ChangeEvent::Removed { key } => Some(key),
            ChangeEvent::DecodeFailed(e) => Some(&e.key),
            ChangeEvent::Fatal(_) => None,
        }
    }
}

/// Forwards every notification into an unbounded channel
#[derive(Debug)]
pub struct ChannelListener<T> {
    tx: mpsc::UnboundedSender<ChangeEvent<T>>,
}

impl<T> ChannelListener<T> {
    pub fn new(tx: mpsc::UnboundedSender<ChangeEvent<T>>) -> Self {
        Self { tx }
    }

    fn send(&self, event: ChangeEvent<T>) {
        // A closed receiver means the caller dropped the stream; the handle
        // it held cancels the subscription.
        let _ = self.tx.send(event);
    }
}

impl<T: Send + 'static> ChangeListener<T> for ChannelListener<T> {
    fn on_added(&mut self, key: &str, value: T) {
        self.send(ChangeEvent::Added {
            key: key.to_string(),
            value,
        });
    }

    fn on_changed(&mut self, key: &str, value: T) {
        self.send(ChangeEvent::Changed {
            key: key.to_string(),
            value,
        });
    }

    fn on_removed(&mut self, key: &str) {
        self.send(ChangeEvent::Removed {
            key: key.to_string(),
        });
    }

    fn on_decode_error(&mut self, error: DecodeError) {
        self.send(ChangeEvent::DecodeFailed(error));
    }

    fn on_fatal(&mut self, error: StreamError) {
        self.send(ChangeEvent::Fatal(error));
    }
}

/// Rebuilds the whole value at the subscription root and reports it after
/// every frame that changed it
pub struct ValueListener<T, F> {
    children: Map<String, Value>,
    dirty: bool,
    callback: F,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T, F> ValueListener<T, F>
where
    T: DeserializeOwned + 'static,
    F: FnMut(Option<T>) + Send + 'static,
{
    pub fn new(callback: F) -> Self {
        Self {
            children: Map::new(),
            dirty: false,
            callback,
            _marker: std::marker::PhantomData,
        }
    }

    fn root_value(&self) -> Value {
        match self.children.get("") {
            Some(primitive) => primitive.clone(),
            None if self.children.is_empty() => Value::Null,
            None => match array_indices(&self.children) {
                Some(len) => {
                    let mut items = vec![Value::Null; len];
                    for (key, value) in &self.children {
                        if let Ok(index) = key.parse::<usize>() {
                            items[index] = value.clone();
                        }
                    }
                    Value::Array(items)
                }
                None => Value::Object(self.children.clone()),
            },
        }
    }
}

/// Array length when every key is a canonical index and at least half of
/// the slots are filled, as for the children of an array root
fn array_indices(children: &Map<String, Value>) -> Option<usize> {
    children
        .keys()
        .try_fold(0, |len: usize, key| {
            let index = key.parse::<usize>().ok()?;
            (index.to_string() == *key).then_some(len.max(index + 1))
        })
        .filter(|&len| len <= children.len() * 2)
}

impl<T, F> fmt::Debug for ValueListener<T, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueListener")
            .field("children", &self.children.len())
            .finish_non_exhaustive()
    }
}

impl<T, F> ChangeListener<Value> for ValueListener<T, F>
where
    T: DeserializeOwned + 'static,
    F: FnMut(Option<T>) + Send + 'static,
{
    fn on_added(&mut self, key: &str, value: Value) {
        self.children.insert(key.to_string(), value);
        self.dirty = true;
    }

    fn on_changed(&mut self, key: &str, value: Value) {
        self.children.insert(key.to_string(), value);
        self.dirty = true;
    }

    fn on_removed(&mut self, key: &str) {
        self.children.remove(key);
        self.dirty = true;
    }

    fn on_settled(&mut self) {
        if !std::mem::take(&mut self.dirty) {
            return;
        }

        let root = self.root_value();
        if root.is_null() {
            (self.callback)(None);
            return;
        }
        match serde_json::from_value::<T>(root) {
            Ok(value) => (self.callback)(Some(value)),
            Err(source) => self.on_decode_error(DecodeError {
                key: String::new(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_callbacks_forward_to_closures() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (a, r) = (seen.clone(), seen.clone());
        let mut listener = Callbacks::<i64>::new()
            .on_added(move |key, value| a.lock().unwrap().push(format!("+{key}={value}")))
            .on_removed(move |key| r.lock().unwrap().push(format!("-{key}")));

        ChangeListener::on_added(&mut listener, "x", 1);
        ChangeListener::on_changed(&mut listener, "x", 2); // no closure registered
        ChangeListener::on_removed(&mut listener, "x");

        assert_eq!(*seen.lock().unwrap(), vec!["+x=1", "-x"]);
    }

    #[tokio::test]
    async fn test_channel_listener() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut listener = ChannelListener::new(tx);

        listener.on_added("a", json!(1));
        listener.on_removed("a");
        listener.on_fatal(StreamError::AccessRevoked("denied".into()));

        assert!(matches!(
            rx.recv().await,
            Some(ChangeEvent::Added { key, value }) if key == "a" && value == json!(1)
        ));
        let removed = rx.recv().await.unwrap();
        assert_eq!(removed.key(), Some("a"));
        assert!(matches!(rx.recv().await, Some(ChangeEvent::Fatal(_))));
    }

    #[test]
    fn test_channel_listener_ignores_closed_receiver() {
        let (tx, rx) = mpsc::unbounded_channel::<ChangeEvent<Value>>();
        drop(rx);
        let mut listener = ChannelListener::new(tx);
        listener.on_added("a", json!(1));
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Todo {
        name: String,
        priority: u32,
    }

    #[test]
    fn test_value_listener_rebuilds_root() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut listener =
            ValueListener::new(move |todo: Option<Todo>| sink.lock().unwrap().push(todo));

        listener.on_added("name", json!("Execute PUSH4GET"));
        listener.on_added("priority", json!(2));
        listener.on_settled();
        listener.on_changed("priority", json!(1));
        listener.on_settled();
        listener.on_settled(); // nothing changed since the last frame
        listener.on_removed("name");
        listener.on_removed("priority");
        listener.on_settled();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(
            seen[0],
            Some(Todo {
                name: "Execute PUSH4GET".into(),
                priority: 2
            })
        );
        assert_eq!(seen[1].as_ref().map(|t| t.priority), Some(1));
        assert_eq!(seen[2], None);
    }

    #[test]
    fn test_value_listener_primitive_root() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut listener = ValueListener::new(move |v: Option<i64>| sink.lock().unwrap().push(v));

        listener.on_added("", json!(42));
        listener.on_settled();

        assert_eq!(*seen.lock().unwrap(), vec![Some(42)]);
    }

    #[test]
    fn test_value_listener_array_root() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut listener =
            ValueListener::new(move |v: Option<Vec<Option<i64>>>| sink.lock().unwrap().push(v));

        listener.on_added("0", json!(10));
        listener.on_added("1", json!(20));
        listener.on_settled();
        listener.on_removed("0");
        listener.on_settled();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![Some(vec![Some(10), Some(20)]), Some(vec![None, Some(20)])]
        );
    }

    #[test]
    fn test_sparse_or_non_canonical_keys_stay_an_object() {
        let sparse: Map<String, Value> = [("0".to_string(), json!(1)), ("9".to_string(), json!(2))]
            .into_iter()
            .collect();
        assert_eq!(array_indices(&sparse), None);

        let padded: Map<String, Value> = [("01".to_string(), json!(1))].into_iter().collect();
        assert_eq!(array_indices(&padded), None);

        let dense: Map<String, Value> = [("1".to_string(), json!(1)), ("0".to_string(), json!(2))]
            .into_iter()
            .collect();
        assert_eq!(array_indices(&dense), Some(2));
    }
}
