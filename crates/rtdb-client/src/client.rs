//! rtdb HTTP client implementation

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, instrument};
use url::Url;

use crate::auth::{apply_credential, AuthProvider, NoAuth, StaticSecret};
use crate::config::RtdbConfig;
use crate::error::{Result, RtdbClientError};
use crate::path::{self, StorePath};
use crate::query::QueryBuilder;
use crate::streaming::{
    spawn_subscription, BackoffPolicy, ChangeListener, ChannelListener, HttpStreamTransport,
    ObserverHandle, PatchMerge, StreamError, StreamSettings, StreamTransport, Subscription,
    ValueListener,
};
use crate::types::{DatabaseRules, PushResponse};

/// Location of the security rules document
const RULES_PATH: [&str; 2] = [".settings", "rules"];

/// rtdb REST and realtime client
///
/// Cheap to clone; clones share the connection pool, credential provider and
/// stream transport.
#[derive(Debug, Clone)]
pub struct RtdbClient {
    client: Client,
    base_url: Url,
    auth: Arc<dyn AuthProvider>,
    streams: StreamSettings,
}

impl RtdbClient {
    /// Create a new client with default settings and no credential
    ///
    /// # Arguments
    /// * `base_url` - Base URL of the store (e.g., "https://example.firebaseio.com/")
    pub fn new(base_url: &str) -> Result<Self> {
        Self::from_config(&RtdbConfig::new(base_url))
    }

    /// Create a new client that sends `secret` as the `auth` parameter
    pub fn with_secret(base_url: &str, secret: &str) -> Result<Self> {
        Self::from_config(&RtdbConfig::builder(base_url).auth_secret(secret).build())
    }

    /// Create a new client with custom request timeouts
    pub fn with_config(
        base_url: &str,
        timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self> {
        Self::from_config(
            &RtdbConfig::builder(base_url)
                .request_timeout(timeout)
                .connect_timeout(connect_timeout)
                .build(),
        )
    }

    /// Create a client from a full configuration
    pub fn from_config(config: &RtdbConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .build()?;

        let base_url = Url::parse(&config.connection.base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(RtdbClientError::InvalidPath(base_url.to_string()));
        }

        let auth: Arc<dyn AuthProvider> = match &config.connection.auth_secret {
            Some(secret) => Arc::new(StaticSecret::new(secret.as_str())),
            None => Arc::new(NoAuth),
        };
        let transport = HttpStreamTransport::new(config.connect_timeout())?;

        Ok(Self {
            client,
            base_url,
            auth: auth.clone(),
            streams: StreamSettings {
                transport: Arc::new(transport),
                auth,
                backoff: config.streaming.backoff_policy(),
                idle_timeout: config.streaming.idle_timeout(),
                merge: config.streaming.patch_merge,
            },
        })
    }

    /// Use `auth` for requests and stream connections
    pub fn with_auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.auth = auth.clone();
        self.streams.auth = auth;
        self
    }

    /// Open stream connections through `transport`
    pub fn with_stream_transport(mut self, transport: Arc<dyn StreamTransport>) -> Self {
        self.streams.transport = transport;
        self
    }

    /// Reconnect delays for subscriptions created afterwards
    pub fn with_backoff(mut self, policy: BackoffPolicy) -> Self {
        self.streams.backoff = policy;
        self
    }

    /// Idle read timeout for subscriptions created afterwards (`None` disables it)
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.streams.idle_timeout = timeout;
        self
    }

    /// How subscriptions created afterwards merge `patch` frames
    pub fn with_patch_merge(mut self, merge: PatchMerge) -> Self {
        self.streams.merge = merge;
        self
    }

    /// Get the base URL
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Get a reference to the underlying HTTP client.
    ///
    /// Useful for making custom requests while reusing the client's
    /// connection pool.
    pub fn http_client(&self) -> &Client {
        &self.client
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Read the value at `path`; `None` when nothing is stored there
    #[instrument(skip(self))]
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        self.get_with_query(path, &QueryBuilder::new()).await
    }

    /// Read the value at `path`, filtered and ordered by `query`
    #[instrument(skip(self))]
    pub async fn get_with_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &QueryBuilder,
    ) -> Result<Option<T>> {
        let mut url = self.resource_url(path).await?;
        query.apply(&mut url);
        debug!("GET {}", url.path());

        let response = self.client.get(url).send().await.map_err(send_error)?;
        let value: Value = self.handle_response(response).await?;
        if value.is_null() {
            return Ok(None);
        }
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| RtdbClientError::ParseError(e.to_string()))
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Replace the value at `path`, returning what the server stored
    #[instrument(skip(self, data))]
    pub async fn set<T: Serialize + ?Sized>(&self, path: &str, data: &T) -> Result<Value> {
        let url = self.resource_url(path).await?;
        let body = encode(data)?;
        debug!("PUT {}", url.path());

        let response = self.client.put(url).json(&body).send().await.map_err(send_error)?;
        self.handle_response(response).await
    }

    /// Append `data` under a server-generated key below `path`
    #[instrument(skip(self, data))]
    pub async fn push<T: Serialize + ?Sized>(&self, path: &str, data: &T) -> Result<PushResponse> {
        let url = self.resource_url(path).await?;
        let body = encode(data)?;
        debug!("POST {}", url.path());

        let response = self.client.post(url).json(&body).send().await.map_err(send_error)?;
        self.handle_response(response).await
    }

    /// Merge the fields of `data` into the value at `path`
    ///
    /// `data` must serialize to a JSON object; anything else is rejected by
    /// the server and surfaces as [`RtdbClientError::ServerError`].
    #[instrument(skip(self, data))]
    pub async fn update<T: Serialize + ?Sized>(&self, path: &str, data: &T) -> Result<Value> {
        let url = self.resource_url(path).await?;
        let body = encode(data)?;
        debug!("PATCH {}", url.path());

        let response = self.client.patch(url).json(&body).send().await.map_err(send_error)?;
        self.handle_response(response).await
    }

    /// Delete the value at `path`
    #[instrument(skip(self))]
    pub async fn delete(&self, path: &str) -> Result<()> {
        let url = self.resource_url(path).await?;
        debug!("DELETE {}", url.path());

        let response = self.client.delete(url).send().await.map_err(send_error)?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(self.extract_error(response).await)
        }
    }

    // =========================================================================
    // Security rules
    // =========================================================================

    /// Read the database security rules
    #[instrument(skip(self))]
    pub async fn get_database_rules(&self) -> Result<DatabaseRules> {
        let url = self.authorize(path::resource_url(&self.base_url, &RULES_PATH)?).await?;

        let response = self.client.get(url).send().await.map_err(send_error)?;
        self.handle_response(response).await
    }

    /// Replace the database security rules
    #[instrument(skip(self, rules))]
    pub async fn set_database_rules(&self, rules: &DatabaseRules) -> Result<()> {
        let url = self.authorize(path::resource_url(&self.base_url, &RULES_PATH)?).await?;

        let response = self.client.put(url).json(rules).send().await.map_err(send_error)?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(self.extract_error(response).await)
        }
    }

    // =========================================================================
    // Realtime subscriptions
    // =========================================================================

    /// Get the stream URL for `path` (without credential)
    pub fn stream_url(&self, path: &str, query: Option<&QueryBuilder>) -> Result<Url> {
        let mut url = StorePath::parse(path)?.resource_url(&self.base_url)?;
        if let Some(query) = query {
            query.apply(&mut url);
        }
        Ok(url)
    }

    /// Watch the children of `path` as raw JSON
    ///
    /// Must be called from within a Tokio runtime; the subscription runs on
    /// its own task until the returned handle is cancelled or dropped.
    pub fn on<L>(&self, path: &str, listener: L) -> Result<ObserverHandle>
    where
        L: ChangeListener<Value>,
    {
        self.listen::<Value, L>(path, None, listener)
    }

    /// Watch the children of `path` matching `query`
    pub fn on_with_query<L>(
        &self,
        path: &str,
        query: &QueryBuilder,
        listener: L,
    ) -> Result<ObserverHandle>
    where
        L: ChangeListener<Value>,
    {
        self.listen::<Value, L>(path, Some(query), listener)
    }

    /// Watch the children of `path`, decoding each into `T`
    ///
    /// Children that fail to decode are reported through
    /// [`ChangeListener::on_decode_error`] without affecting their siblings.
    pub fn monitor_entity_list<T, L>(
        &self,
        path: &str,
        listener: L,
        query: Option<&QueryBuilder>,
    ) -> Result<ObserverHandle>
    where
        T: DeserializeOwned + Send + 'static,
        L: ChangeListener<T>,
    {
        self.listen::<T, L>(path, query, listener)
    }

    /// Call `callback` with the whole value at `path` after every change
    ///
    /// The callback receives `None` once the location becomes empty.
    pub fn on_value<T, F>(&self, path: &str, callback: F) -> Result<ObserverHandle>
    where
        T: DeserializeOwned + 'static,
        F: FnMut(Option<T>) + Send + 'static,
    {
        self.listen::<Value, _>(path, None, ValueListener::<T, F>::new(callback))
    }

    /// Watch the children of `path` as a [`Stream`](futures::Stream) of events
    ///
    /// # Example
    /// ```ignore
    /// let mut todos = client.subscribe::<Todo>("todos", None)?;
    ///
    /// while let Some(event) = todos.next().await {
    ///     println!("{:?}", event);
    /// }
    /// ```
    pub fn subscribe<T>(&self, path: &str, query: Option<&QueryBuilder>) -> Result<Subscription<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = self.listen::<T, _>(path, query, ChannelListener::new(tx))?;
        Ok(Subscription::new(handle, rx))
    }

    fn listen<T, L>(
        &self,
        path: &str,
        query: Option<&QueryBuilder>,
        listener: L,
    ) -> Result<ObserverHandle>
    where
        T: DeserializeOwned + Send + 'static,
        L: ChangeListener<T>,
    {
        let url = self.stream_url(path, query)?;
        let label = StorePath::parse(path)?.to_string();
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| StreamError::Transport(format!("No Tokio runtime: {}", e)))?;

        Ok(spawn_subscription(&runtime, &self.streams, url, label, listener))
    }

    // =========================================================================
    // Helper Methods
    // =========================================================================

    async fn resource_url(&self, path: &str) -> Result<Url> {
        let url = StorePath::parse(path)?.resource_url(&self.base_url)?;
        self.authorize(url).await
    }

    async fn authorize(&self, mut url: Url) -> Result<Url> {
        let credential = self
            .auth
            .credential(false)
            .await
            .map_err(|e| RtdbClientError::Auth(e.0))?;
        apply_credential(&mut url, credential.as_deref());
        Ok(url)
    }

    /// Handle response and parse JSON
    async fn handle_response<T: DeserializeOwned>(&self, response: Response) -> Result<T> {
        let status = response.status();

        if status.is_success() {
            response
                .json()
                .await
                .map_err(|e| RtdbClientError::ParseError(e.to_string()))
        } else {
            Err(self.extract_error_from_status(response, status).await)
        }
    }

    /// Extract error from failed response
    async fn extract_error(&self, response: Response) -> RtdbClientError {
        let status = response.status();
        self.extract_error_from_status(response, status).await
    }

    async fn extract_error_from_status(
        &self,
        response: Response,
        status: StatusCode,
    ) -> RtdbClientError {
        let body = match response.text().await {
            Ok(body) => body,
            Err(_) => format!("HTTP {}", status),
        };
        RtdbClientError::server_error(status.as_u16(), body)
    }
}

fn encode<T: Serialize + ?Sized>(data: &T) -> Result<Value> {
    serde_json::to_value(data).map_err(|e| RtdbClientError::SerializeError(e.to_string()))
}

fn send_error(e: reqwest::Error) -> RtdbClientError {
    if e.is_timeout() {
        RtdbClientError::Timeout
    } else {
        RtdbClientError::HttpError(e)
    }
}
