//! Subscription engine tests
//!
//! Connections are scripted through `ScriptedTransport`, so reconnects,
//! backoff and cancellation are exercised without a network.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use rtdb_client::streaming::{BackoffPolicy, Callbacks, ChangeEvent, ConnectionState, Subscription};
use rtdb_client::testing::{fast_backoff, wait_for, ScriptedTransport};
use rtdb_client::{AuthError, AuthProvider, ObserverHandle, QueryBuilder, RtdbClient, StreamError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

fn client(transport: &ScriptedTransport) -> RtdbClient {
    RtdbClient::new("http://store.test")
        .unwrap()
        .with_stream_transport(Arc::new(transport.clone()))
        .with_backoff(fast_backoff())
}

fn describe<T: Serialize>(event: &ChangeEvent<T>) -> String {
    let json = |value: &T| serde_json::to_string(value).unwrap();
    match event {
        ChangeEvent::Added { key, value } => format!("added {} {}", key, json(value)),
        ChangeEvent::Changed { key, value } => format!("changed {} {}", key, json(value)),
        ChangeEvent::Removed { key } => format!("removed {}", key),
        ChangeEvent::DecodeFailed(e) => format!("undecodable {}", e.key),
        ChangeEvent::Fatal(e) => format!("fatal {}", e),
    }
}

async fn next_event<T>(sub: &mut Subscription<T>) -> ChangeEvent<T> {
    tokio::time::timeout(Duration::from_secs(2), sub.next())
        .await
        .expect("timed out waiting for an event")
        .expect("subscription ended")
}

async fn next_events<T: Serialize>(sub: &mut Subscription<T>, count: usize) -> Vec<String> {
    let mut events = Vec::new();
    for _ in 0..count {
        events.push(describe(&next_event(sub).await));
    }
    events
}

async fn assert_quiet<T: Serialize>(sub: &mut Subscription<T>) {
    if let Ok(event) = tokio::time::timeout(Duration::from_millis(100), sub.next()).await {
        panic!("unexpected event: {:?}", event.as_ref().map(describe));
    }
}

async fn eventually(condition: impl Fn() -> bool) -> bool {
    wait_for(|| std::future::ready(condition()), Duration::from_secs(2)).await
}

async fn wait_terminated(handle: &ObserverHandle) {
    tokio::time::timeout(Duration::from_secs(2), handle.terminated())
        .await
        .expect("subscription did not terminate");
}

// =============================================================================
// Dispatch
// =============================================================================

#[tokio::test]
async fn test_items_added_changed_removed() {
    let transport = ScriptedTransport::new();
    let server = transport.accept("items");
    let mut items = client(&transport).subscribe::<Value>("items", None).unwrap();

    server.put("/", json!({"x": {"v": 1}}));
    server.patch("/x", json!({"v": 2}));
    server.put("/x", Value::Null);

    assert_eq!(
        next_events(&mut items, 3).await,
        vec![
            r#"added x {"v":1}"#,
            r#"changed x {"v":2}"#,
            "removed x",
        ]
    );
    assert_quiet(&mut items).await;
}

#[tokio::test]
async fn test_identical_put_and_keep_alive_are_silent() {
    let transport = ScriptedTransport::new();
    let server = transport.accept("items");
    let mut items = client(&transport).subscribe::<i64>("items", None).unwrap();

    server.put("/", json!({"a": 1}));
    server.keep_alive();
    server.put("/", json!({"a": 1}));
    server.put("/a", json!(1));

    assert_eq!(next_events(&mut items, 1).await, vec!["added a 1"]);
    assert_quiet(&mut items).await;
}

#[tokio::test]
async fn test_null_put_without_entry_is_silent() {
    let transport = ScriptedTransport::new();
    let server = transport.accept("items");
    let mut items = client(&transport).subscribe::<i64>("items", None).unwrap();

    server.put("/missing", Value::Null);
    server.put("/a", json!(1));

    assert_eq!(next_events(&mut items, 1).await, vec!["added a 1"]);
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Item {
    v: i64,
}

#[tokio::test]
async fn test_decode_failure_does_not_stop_siblings() {
    let transport = ScriptedTransport::new();
    let server = transport.accept("items");
    let mut items = client(&transport).subscribe::<Item>("items", None).unwrap();

    server.put("/", json!({"a": {"v": 1}, "b": "not an item", "c": {"v": 3}}));
    server.patch("/b", json!({"v": 2}));

    assert_eq!(
        next_events(&mut items, 4).await,
        vec![
            r#"added a {"v":1}"#,
            "undecodable b",
            r#"added c {"v":3}"#,
            r#"changed b {"v":2}"#,
        ]
    );
}

// =============================================================================
// Reconnect and resync
// =============================================================================

#[tokio::test]
async fn test_reconnect_resyncs_against_previous_snapshot() {
    let transport = ScriptedTransport::new();
    let first = transport.accept("items");
    let second = transport.accept("items");
    let mut items = client(&transport).subscribe::<i64>("items", None).unwrap();

    first.put("/", json!({"a": 1, "b": 2}));
    assert_eq!(next_events(&mut items, 2).await, vec!["added a 1", "added b 2"]);
    let first_sync = items.handle().last_resync().expect("stamped on connect");

    drop(first);
    second.put("/", json!({"a": 1, "c": 3}));

    assert_eq!(next_events(&mut items, 2).await, vec!["removed b", "added c 3"]);
    assert_quiet(&mut items).await;
    assert_eq!(transport.open_count(), 2);
    assert!(items.handle().last_resync().unwrap() >= first_sync);
}

#[tokio::test]
async fn test_malformed_frame_reconnects() {
    let transport = ScriptedTransport::new();
    let first = transport.accept("items");
    let second = transport.accept("items");
    let mut items = client(&transport).subscribe::<i64>("items", None).unwrap();

    first.put("/", json!({"a": 1}));
    first.send_raw("event: put\ndata: {oops\n\n");
    first.put("/", json!({"a": 99})); // never dispatched

    second.put("/", json!({"a": 1}));
    second.put("/b", json!(2));

    assert_eq!(next_events(&mut items, 2).await, vec!["added a 1", "added b 2"]);
    assert_eq!(transport.open_count(), 2);
}

#[tokio::test]
async fn test_transport_error_mid_stream_reconnects() {
    let transport = ScriptedTransport::new();
    let first = transport.accept("items");
    transport.reject("items", StreamError::Transport("connection refused".into()));
    let third = transport.accept("items");
    let mut items = client(&transport).subscribe::<i64>("items", None).unwrap();

    first.put("/", json!({"a": 1}));
    assert_eq!(next_events(&mut items, 1).await, vec!["added a 1"]);

    first.fail(StreamError::Transport("connection reset".into()));
    third.put("/", json!({"a": 2}));

    assert_eq!(next_events(&mut items, 1).await, vec!["changed a 2"]);
    assert_eq!(transport.open_count(), 3);
}

#[tokio::test]
async fn test_idle_timeout_reconnects() {
    let transport = ScriptedTransport::new();
    let _silent = transport.accept("items");
    let items = client(&transport)
        .with_idle_timeout(Some(Duration::from_millis(50)))
        .subscribe::<Value>("items", None)
        .unwrap();

    assert!(eventually(|| transport.open_count() >= 2).await);
    assert!(!items.handle().is_cancelled());
}

// =============================================================================
// Cancellation
// =============================================================================

#[tokio::test]
async fn test_cancel_during_backoff_stops_reconnects() {
    let transport = ScriptedTransport::new();
    transport.reject("items", StreamError::Transport("connection refused".into()));
    let slow = BackoffPolicy::new(Duration::from_secs(60), Duration::from_secs(60), 2.0);
    let mut items = client(&transport)
        .with_backoff(slow)
        .subscribe::<Value>("items", None)
        .unwrap();

    assert!(eventually(|| items.handle().state() == ConnectionState::Backoff).await);

    items.cancel();
    wait_terminated(items.handle()).await;

    assert_eq!(transport.open_count(), 1);
    assert!(items.next().await.is_none());
}

#[tokio::test]
async fn test_cancel_from_inside_callback() {
    let transport = ScriptedTransport::new();
    let server = transport.accept("items");
    let handle: Arc<OnceLock<ObserverHandle>> = Arc::new(OnceLock::new());
    let seen = Arc::new(Mutex::new(Vec::new()));

    let listener = {
        let handle = handle.clone();
        let seen = seen.clone();
        Callbacks::<Value>::new().on_added(move |key, _| {
            seen.lock().unwrap().push(key.to_string());
            if let Some(handle) = handle.get() {
                handle.cancel();
            }
        })
    };
    let observer = client(&transport).on("items", listener).unwrap();
    assert!(handle.set(observer).is_ok());

    server.put("/", json!({"a": 1, "b": 2, "c": 3}));
    wait_terminated(handle.get().unwrap()).await;

    assert_eq!(*seen.lock().unwrap(), vec!["a"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_callbacks_cancelling_each_other() {
    let transport = ScriptedTransport::new();
    let server_a = transport.accept("a");
    let server_b = transport.accept("b");
    let client = client(&transport);
    let handle_a: Arc<OnceLock<ObserverHandle>> = Arc::new(OnceLock::new());
    let handle_b: Arc<OnceLock<ObserverHandle>> = Arc::new(OnceLock::new());
    let finished = Arc::new(AtomicUsize::new(0));

    let cancels = |other: &Arc<OnceLock<ObserverHandle>>| {
        let other = other.clone();
        let finished = finished.clone();
        Callbacks::<Value>::new().on_added(move |_, _| {
            // keep both callbacks running at once
            std::thread::sleep(Duration::from_millis(100));
            if let Some(other) = other.get() {
                other.cancel();
            }
            finished.fetch_add(1, Ordering::SeqCst);
        })
    };
    let observer_a = client.on("a", cancels(&handle_b)).unwrap();
    let observer_b = client.on("b", cancels(&handle_a)).unwrap();
    assert!(handle_a.set(observer_a).is_ok());
    assert!(handle_b.set(observer_b).is_ok());

    server_a.put("/", json!({"x": 1}));
    server_b.put("/", json!({"x": 1}));

    assert!(eventually(|| finished.load(Ordering::SeqCst) == 2).await);
    wait_terminated(handle_a.get().unwrap()).await;
    wait_terminated(handle_b.get().unwrap()).await;
}

#[tokio::test]
async fn test_dropping_handle_closes_connection() {
    let transport = ScriptedTransport::new();
    let server = transport.accept("items");
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let handle = client(&transport)
        .on(
            "items",
            Callbacks::<Value>::new().on_added(move |key, _| sink.lock().unwrap().push(key.to_string())),
        )
        .unwrap();

    server.put("/a", json!(1));
    assert!(eventually(|| seen.lock().unwrap().len() == 1).await);

    drop(handle);
    assert!(eventually(|| server.is_closed()).await);

    server.put("/b", json!(2));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(*seen.lock().unwrap(), vec!["a"]);
}

#[tokio::test]
async fn test_subscriptions_are_independent() {
    let transport = ScriptedTransport::new();
    let server_a = transport.accept("a");
    let server_b = transport.accept("b");
    let client = client(&transport);
    let mut sub_a = client.subscribe::<i64>("a", None).unwrap();
    let mut sub_b = client.subscribe::<i64>("b", None).unwrap();

    server_a.put("/", json!({"x": 1}));
    server_b.put("/", json!({"y": 2}));
    assert_eq!(next_events(&mut sub_a, 1).await, vec!["added x 1"]);
    assert_eq!(next_events(&mut sub_b, 1).await, vec!["added y 2"]);

    sub_b.cancel();
    server_a.put("/", Value::Null);
    assert_eq!(next_events(&mut sub_a, 1).await, vec!["removed x"]);
    assert!(sub_b.next().await.is_none());
}

// =============================================================================
// Credentials and fatal errors
// =============================================================================

/// Mints `token-1`, `token-2`, ... and records whether each call asked for a refresh
#[derive(Debug, Default)]
struct RotatingAuth {
    calls: Mutex<Vec<bool>>,
    refuse_refresh: bool,
}

#[async_trait]
impl AuthProvider for RotatingAuth {
    async fn credential(&self, refresh: bool) -> Result<Option<String>, AuthError> {
        let mut calls = self.calls.lock().unwrap();
        calls.push(refresh);
        if refresh && self.refuse_refresh {
            return Err(AuthError("refresh token expired".into()));
        }
        Ok(Some(format!("token-{}", calls.len())))
    }
}

#[tokio::test]
async fn test_auth_revoked_refreshes_credential() {
    let transport = ScriptedTransport::new();
    let first = transport.accept("items");
    let second = transport.accept("items");
    let auth = Arc::new(RotatingAuth::default());
    let mut items = client(&transport)
        .with_auth(auth.clone())
        .subscribe::<i64>("items", None)
        .unwrap();

    first.put("/", json!({"a": 1}));
    first.send_event("auth_revoked", &json!("token expired"));
    second.put("/", json!({"a": 1, "b": 2}));

    assert_eq!(next_events(&mut items, 2).await, vec!["added a 1", "added b 2"]);
    assert_eq!(*auth.calls.lock().unwrap(), vec![false, true]);

    let urls = transport.opened_urls();
    assert_eq!(urls[0].query(), Some("auth=token-1"));
    assert_eq!(urls[1].query(), Some("auth=token-2"));
}

#[tokio::test]
async fn test_failed_refresh_is_fatal() {
    let transport = ScriptedTransport::new();
    let first = transport.accept("items");
    let auth = Arc::new(RotatingAuth {
        refuse_refresh: true,
        ..Default::default()
    });
    let mut items = client(&transport)
        .with_auth(auth)
        .subscribe::<i64>("items", None)
        .unwrap();

    first.send_event("auth_revoked", &Value::Null);

    assert!(matches!(
        next_event(&mut items).await,
        ChangeEvent::Fatal(StreamError::Auth(_))
    ));
    assert!(items.next().await.is_none());
    assert_eq!(items.handle().state(), ConnectionState::Terminated);
    assert_eq!(transport.open_count(), 1);
}

#[tokio::test]
async fn test_unauthorized_open_is_fatal() {
    let transport = ScriptedTransport::new();
    transport.reject("items", StreamError::Unauthorized { status: 401 });
    let mut items = client(&transport).subscribe::<Value>("items", None).unwrap();

    assert!(matches!(
        next_event(&mut items).await,
        ChangeEvent::Fatal(StreamError::Unauthorized { status: 401 })
    ));
    assert!(items.next().await.is_none());
    assert_eq!(transport.open_count(), 1);
}

#[tokio::test]
async fn test_cancel_frame_is_fatal() {
    let transport = ScriptedTransport::new();
    let server = transport.accept("items");
    let mut items = client(&transport).subscribe::<i64>("items", None).unwrap();

    server.put("/", json!({"a": 1}));
    server.send_event("cancel", &json!("Permission denied"));

    assert_eq!(
        next_events(&mut items, 2).await,
        vec!["added a 1", "fatal Stream cancelled by server: Permission denied"]
    );
    assert!(items.next().await.is_none());
}

// =============================================================================
// Listener forms
// =============================================================================

#[derive(Debug, Deserialize, PartialEq)]
struct Todo {
    name: String,
    priority: u32,
}

#[tokio::test]
async fn test_on_value_reports_whole_value() {
    let transport = ScriptedTransport::new();
    let server = transport.accept("todos/1");
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let _handle = client(&transport)
        .on_value::<Todo, _>("todos/1", move |todo| {
            let _ = tx.send(todo);
        })
        .unwrap();

    server.put("/", json!({"name": "Execute PUSH4GET", "priority": 2}));
    server.patch("/", json!({"priority": 1}));
    server.put("/", Value::Null);

    let mut seen = Vec::new();
    for _ in 0..3 {
        seen.push(
            tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .unwrap()
                .unwrap(),
        );
    }
    assert_eq!(
        seen,
        vec![
            Some(Todo {
                name: "Execute PUSH4GET".into(),
                priority: 2
            }),
            Some(Todo {
                name: "Execute PUSH4GET".into(),
                priority: 1
            }),
            None,
        ]
    );
}

#[tokio::test]
async fn test_on_value_reports_array_root() {
    let transport = ScriptedTransport::new();
    let server = transport.accept("list");
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let _handle = client(&transport)
        .on_value::<Vec<i64>, _>("list", move |list| {
            let _ = tx.send(list);
        })
        .unwrap();

    server.put("/", json!([10, 20]));
    server.put("/2", json!(30));

    let mut seen = Vec::new();
    for _ in 0..2 {
        seen.push(
            tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .unwrap()
                .unwrap(),
        );
    }
    assert_eq!(seen, vec![Some(vec![10, 20]), Some(vec![10, 20, 30])]);
}

#[tokio::test]
async fn test_monitor_entity_list_with_query() {
    let transport = ScriptedTransport::new();
    let server = transport.accept("todos");
    let names = Arc::new(Mutex::new(Vec::new()));
    let sink = names.clone();
    let query = QueryBuilder::new().order_by("priority").start_at(2);

    let _handle = client(&transport)
        .monitor_entity_list::<Todo, _>(
            "todos",
            Callbacks::new().on_added(move |_key, todo: Todo| sink.lock().unwrap().push(todo.name)),
            Some(&query),
        )
        .unwrap();

    server.put("/", json!({"-k1": {"name": "a", "priority": 2}, "-k2": {"name": "b", "priority": 3}}));

    assert!(eventually(|| names.lock().unwrap().len() == 2).await);
    assert_eq!(*names.lock().unwrap(), vec!["a", "b"]);
    assert_eq!(
        transport.opened_urls()[0].query(),
        Some("orderBy=%22priority%22&startAt=2")
    );
}
