//! Subscription implementation

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::{Stream, StreamExt};
use tokio::sync::mpsc;

use super::handle::ObserverHandle;
use super::listener::ChangeEvent;

/// An active subscription delivering [`ChangeEvent`]s as a stream
///
/// Implements `Stream<Item = ChangeEvent<T>>`. The stream ends after the
/// subscription terminates, either through [`cancel`](Self::cancel) or after a
/// [`ChangeEvent::Fatal`].
///
/// # Lifecycle
///
/// - Created via `RtdbClient::subscribe()`
/// - Events are consumed via `next()` or the `Stream` trait
/// - Call `cancel()` for explicit cleanup, or let it drop
///
/// # Example
///
/// ```no_run
/// # async fn example(client: rtdb_client::RtdbClient) -> rtdb_client::Result<()> {
/// use rtdb_client::streaming::ChangeEvent;
///
/// let mut todos = client.subscribe::<serde_json::Value>("todos", None)?;
/// while let Some(event) = todos.next().await {
///     match event {
///         ChangeEvent::Added { key, value } => println!("+ {key}: {value}"),
///         ChangeEvent::Changed { key, value } => println!("~ {key}: {value}"),
///         ChangeEvent::Removed { key } => println!("- {key}"),
///         ChangeEvent::DecodeFailed(e) => eprintln!("{e}"),
///         ChangeEvent::Fatal(e) => eprintln!("stopped: {e}"),
///     }
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Subscription<T> {
    handle: ObserverHandle,
    events: mpsc::UnboundedReceiver<ChangeEvent<T>>,
}

impl<T> Subscription<T> {
    pub(crate) fn new(handle: ObserverHandle, events: mpsc::UnboundedReceiver<ChangeEvent<T>>) -> Self {
        Self { handle, events }
    }

    /// Handle controlling the underlying subscription
    pub fn handle(&self) -> &ObserverHandle {
        &self.handle
    }

    /// Get the next event
    ///
    /// Returns `None` once the subscription has terminated and every
    /// buffered event has been consumed.
    pub async fn next(&mut self) -> Option<ChangeEvent<T>> {
        <Self as StreamExt>::next(self).await
    }

    /// Cancel the subscription
    ///
    /// Events already buffered stay readable; the stream then ends.
    pub fn cancel(&self) {
        self.handle.cancel();
    }
}

impl<T> Stream for Subscription<T> {
    type Item = ChangeEvent<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_recv(cx)
    }
}
