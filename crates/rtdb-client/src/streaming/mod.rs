//! Realtime change streams
//!
//! A subscription keeps an event-stream connection open on one location of
//! the store and turns the server's `put`/`patch` frames into per-child
//! added, changed and removed notifications. Each subscription runs on its
//! own task: it caches the last known value of every child, reconnects with
//! exponential backoff when the connection drops, and resynchronizes against
//! the full snapshot the server sends on every new connection.
//!
//! # Example
//!
//! ```no_run
//! use rtdb_client::RtdbClient;
//! use rtdb_client::streaming::Callbacks;
//! use serde::Deserialize;
//!
//! #[derive(Debug, Deserialize)]
//! struct Todo {
//!     name: String,
//!     priority: u32,
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = RtdbClient::new("https://example.firebaseio.com")?;
//!
//! let handle = client.monitor_entity_list::<Todo, _>(
//!     "todos",
//!     Callbacks::new()
//!         .on_added(|key, todo: Todo| println!("added {key}: {}", todo.name))
//!         .on_changed(|key, todo: Todo| println!("changed {key}: {}", todo.priority))
//!         .on_removed(|key| println!("removed {key}")),
//!     None,
//! )?;
//!
//! // ... later; dropping the handle has the same effect
//! handle.cancel();
//! handle.terminated().await;
//! # Ok(())
//! # }
//! ```

mod backoff;
mod cache;
mod connection;
mod dispatcher;
mod handle;
mod listener;
mod merge;
mod parser;
mod subscription;
mod transport;
mod types;

pub use backoff::{Backoff, BackoffPolicy};
pub use cache::SnapshotCache;
pub use connection::{ConnectionState, Transition};
pub use dispatcher::{Change, EventDispatcher, Materializer};
pub use handle::ObserverHandle;
pub use listener::{
    Callbacks, ChangeEvent, ChangeListener, ChannelListener, DecodeError, ValueListener,
};
pub use merge::PatchMerge;
pub use parser::FrameParser;
pub use subscription::Subscription;
pub use transport::{ByteStream, HttpStreamTransport, StreamTransport};
pub use types::{Frame, Payload, StreamError, StreamResult};

pub(crate) use connection::{spawn_subscription, StreamSettings};
