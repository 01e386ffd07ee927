//! rtdb Client Library
//!
//! Typed client for a hierarchical JSON document store reachable over HTTP:
//! one-shot reads and writes, plus realtime subscriptions that turn the
//! store's event stream into per-child change notifications.
//!
//! # Example
//!
//! ```rust,no_run
//! use rtdb_client::{QueryBuilder, RtdbClient};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct Todo {
//!     name: String,
//!     priority: u32,
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = RtdbClient::with_secret("https://example.firebaseio.com", "secret")?;
//!
//!     // Write and read back
//!     let key = client
//!         .push("todos", &Todo { name: "Execute PUSH4GET".into(), priority: 2 })
//!         .await?
//!         .name;
//!     let todo: Option<Todo> = client.get(&format!("todos/{}", key)).await?;
//!
//!     // Filtered read
//!     let query = QueryBuilder::new().order_by("priority").start_at(2);
//!     let urgent: Option<serde_json::Value> = client.get_with_query("todos", &query).await?;
//!
//!     // Realtime changes
//!     let mut changes = client.subscribe::<Todo>("todos", None)?;
//!     while let Some(event) = changes.next().await {
//!         println!("{:?}", event);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Testing
//!
//! The `testing` module provides utilities for integration testing:
//!
//! ```rust,ignore
//! use rtdb_client::testing::{ScriptedTransport, TestServer};
//!
//! let server = TestServer::start(router).await?;
//! let value: Option<Value> = server.client.get("todos").await?;
//! ```

mod auth;
mod client;
mod config;
mod error;
mod path;
mod query;
pub mod streaming;
pub mod testing;
mod types;

pub use auth::{AuthError, AuthProvider, NoAuth, StaticSecret};
pub use client::RtdbClient;
pub use config::{
    ConfigError, ConnectionConfig, RtdbConfig, RtdbConfigBuilder, StreamingConfig, TimeoutsConfig,
};
pub use error::{Result, RtdbClientError};
pub use path::StorePath;
pub use query::QueryBuilder;
pub use types::*;

// Re-export streaming types for convenience
pub use streaming::{
    Callbacks, ChangeEvent, ChangeListener, ConnectionState, ObserverHandle, PatchMerge,
    StreamError, Subscription,
};
