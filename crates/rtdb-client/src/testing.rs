//! Test utilities for rtdb-client
//!
//! Provides helpers for running integration tests against an in-process
//! server, and a scripted [`StreamTransport`] for driving subscriptions
//! without a network.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use url::Url;

use crate::streaming::{BackoffPolicy, ByteStream, StreamError, StreamResult, StreamTransport};
use crate::{Result, RtdbClient};

/// A test server that automatically shuts down when dropped
pub struct TestServer {
    pub addr: SocketAddr,
    pub client: RtdbClient,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    /// Create a new test server from an axum Router
    ///
    /// The client reconnects streams quickly (10ms initial backoff).
    ///
    /// # Example
    ///
    /// ```ignore
    /// use rtdb_client::testing::TestServer;
    ///
    /// let server = TestServer::start(router).await?;
    /// server.client.set("todos/1", &json!({"name": "a"})).await?;
    /// ```
    pub async fn start<S>(router: axum::Router<S>) -> Result<Self>
    where
        S: Clone + Send + Sync + 'static,
        axum::Router<S>: Into<axum::Router>,
    {
        Self::start_with_timeout(router, Duration::from_secs(5), Duration::from_secs(2)).await
    }

    /// Create a new test server with custom timeouts
    pub async fn start_with_timeout<S>(
        router: axum::Router<S>,
        timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self>
    where
        S: Clone + Send + Sync + 'static,
        axum::Router<S>: Into<axum::Router>,
    {
        // Bind to any available port
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        let router: axum::Router = router.into();

        // Spawn the server
        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        // Give server a moment to start
        tokio::time::sleep(Duration::from_millis(10)).await;

        let base_url = format!("http://{}", addr);
        let client = RtdbClient::with_config(&base_url, timeout, connect_timeout)?
            .with_backoff(fast_backoff());

        Ok(Self {
            addr,
            client,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Get the base URL of the test server
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get a reference to the client
    pub fn client(&self) -> &RtdbClient {
        &self.client
    }

    /// Shutdown the server gracefully
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        // Send shutdown signal if not already done
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        // Abort the task if still running
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Backoff suited to tests: 10ms doubling up to 100ms
pub fn fast_backoff() -> BackoffPolicy {
    BackoffPolicy::new(Duration::from_millis(10), Duration::from_millis(100), 2.0)
}

/// Wait for a condition with timeout
pub async fn wait_for<F, Fut>(condition: F, timeout: Duration) -> bool
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;

    while tokio::time::Instant::now() < deadline {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    false
}

/// Outcome of one scripted `open`
enum Scripted {
    Accept(mpsc::UnboundedReceiver<StreamResult<Bytes>>),
    Reject(StreamError),
}

#[derive(Default)]
struct Script {
    /// Pending outcomes per resource path, e.g. `/items.json`
    queues: HashMap<String, VecDeque<Scripted>>,
    opened: Vec<Url>,
}

/// A [`StreamTransport`] whose connections are scripted by the test
///
/// Each `open` takes the next queued outcome for the URL's resource path.
/// When nothing is queued the connection opens but never yields a byte, as a
/// silent server would.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
}

impl std::fmt::Debug for ScriptedTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedTransport")
            .field("opened", &self.script.lock().opened.len())
            .finish()
    }
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an accepted connection for the store path `path`
    pub fn accept(&self, path: &str) -> ScriptedServer {
        let (tx, rx) = mpsc::unbounded_channel();
        self.queue(path, Scripted::Accept(rx));
        ScriptedServer { tx }
    }

    /// Queue a failed connection attempt for the store path `path`
    pub fn reject(&self, path: &str, error: StreamError) {
        self.queue(path, Scripted::Reject(error));
    }

    /// Number of `open` calls so far
    pub fn open_count(&self) -> usize {
        self.script.lock().opened.len()
    }

    /// URLs passed to `open`, including credential and query parameters
    pub fn opened_urls(&self) -> Vec<Url> {
        self.script.lock().opened.clone()
    }

    fn queue(&self, path: &str, outcome: Scripted) {
        self.script
            .lock()
            .queues
            .entry(resource_key(path))
            .or_default()
            .push_back(outcome);
    }
}

fn resource_key(path: &str) -> String {
    format!("/{}.json", path.trim_matches('/'))
}

#[async_trait]
impl StreamTransport for ScriptedTransport {
    async fn open(&self, url: Url) -> StreamResult<ByteStream> {
        let next = {
            let mut script = self.script.lock();
            script.opened.push(url.clone());
            script
                .queues
                .get_mut(url.path())
                .and_then(VecDeque::pop_front)
        };

        match next {
            Some(Scripted::Accept(rx)) => Ok(Box::pin(futures::stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|chunk| (chunk, rx))
            }))),
            Some(Scripted::Reject(error)) => Err(error),
            None => Ok(Box::pin(futures::stream::pending::<StreamResult<Bytes>>())),
        }
    }
}

/// Server side of a scripted connection; dropping it closes the connection
#[derive(Debug, Clone)]
pub struct ScriptedServer {
    tx: mpsc::UnboundedSender<StreamResult<Bytes>>,
}

impl ScriptedServer {
    /// Send one complete event
    pub fn send_event(&self, event: &str, data: &Value) {
        self.send_raw(format!("event: {}\ndata: {}\n\n", event, data));
    }

    /// Send a `put` frame
    pub fn put(&self, path: &str, data: Value) {
        self.send_event("put", &json!({ "path": path, "data": data }));
    }

    /// Send a `patch` frame
    pub fn patch(&self, path: &str, data: Value) {
        self.send_event("patch", &json!({ "path": path, "data": data }));
    }

    pub fn keep_alive(&self) {
        self.send_event("keep-alive", &Value::Null);
    }

    /// Send arbitrary bytes, possibly a partial frame
    pub fn send_raw(&self, bytes: impl Into<Bytes>) {
        let _ = self.tx.send(Ok(bytes.into()));
    }

    /// Break the connection with a transport error
    pub fn fail(&self, error: StreamError) {
        let _ = self.tx.send(Err(error));
    }

    /// Whether the client side dropped the connection
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
