//! Caller-facing control over a running subscription

use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, ReentrantMutex};
use tokio::sync::watch;
use tracing::debug;

use super::connection::ConnectionState;

thread_local! {
    /// Number of dispatches running on this thread, across all subscriptions
    static DISPATCH_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Marks the current thread as inside a dispatch until dropped
struct DispatchScope;

impl DispatchScope {
    fn enter() -> Self {
        DISPATCH_DEPTH.with(|depth| depth.set(depth.get() + 1));
        DispatchScope
    }

    fn active() -> bool {
        DISPATCH_DEPTH.with(|depth| depth.get() > 0)
    }
}

impl Drop for DispatchScope {
    fn drop(&mut self) {
        DISPATCH_DEPTH.with(|depth| depth.set(depth.get() - 1));
    }
}

/// State shared between a subscription's read loop and its handle
#[derive(Debug)]
pub(crate) struct Control {
    cancelled: AtomicBool,
    /// Held for the duration of every dispatch. Reentrant so a callback can
    /// cancel its own subscription.
    gate: ReentrantMutex<()>,
    cancel_tx: watch::Sender<bool>,
    state_tx: watch::Sender<ConnectionState>,
    last_resync: Mutex<Option<DateTime<Utc>>>,
}

impl Control {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            cancelled: AtomicBool::new(false),
            gate: ReentrantMutex::new(()),
            cancel_tx: watch::Sender::new(false),
            state_tx: watch::Sender::new(ConnectionState::Connecting),
            last_resync: Mutex::new(None),
        })
    }

    /// Set the cancel flag, then wait for a running dispatch to finish
    ///
    /// From inside any subscription's callback the wait is skipped: the
    /// other subscription's callback may itself be waiting on ours. The flag
    /// still stops its remaining callbacks, which check it between changes.
    pub(crate) fn cancel(&self) {
        let _gate = if DispatchScope::active() {
            None
        } else {
            Some(self.gate.lock())
        };
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            self.cancel_tx.send_replace(true);
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Run `f` under the dispatch gate unless the subscription is cancelled
    pub(crate) fn dispatch<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        let _gate = self.gate.lock();
        if self.is_cancelled() {
            return None;
        }
        let _scope = DispatchScope::enter();
        Some(f())
    }

    /// Resolves once [`cancel`](Self::cancel) has been called
    pub(crate) fn cancelled(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let mut rx = self.cancel_tx.subscribe();
        async move {
            // Err means the sender is gone, which only happens at teardown
            let _ = rx.wait_for(|cancelled| *cancelled).await;
        }
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            debug!(from = ?*current, to = ?state, "Connection state changed");
            *current = state;
            true
        });
    }

    pub(crate) fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    pub(crate) fn mark_resync(&self) {
        *self.last_resync.lock() = Some(Utc::now());
    }

    pub(crate) fn last_resync(&self) -> Option<DateTime<Utc>> {
        *self.last_resync.lock()
    }

    async fn terminated(&self) {
        let mut rx = self.state_tx.subscribe();
        let _ = rx
            .wait_for(|state| *state == ConnectionState::Terminated)
            .await;
    }
}

/// Handle to a live subscription
///
/// Dropping the handle cancels the subscription.
#[must_use = "dropping the handle cancels the subscription"]
#[derive(Debug)]
pub struct ObserverHandle {
    control: Arc<Control>,
    path: String,
}

impl ObserverHandle {
    pub(crate) fn new(control: Arc<Control>, path: String) -> Self {
        Self { control, path }
    }

    /// Stop the subscription.
    ///
    /// Idempotent and safe to call from any thread, including from inside
    /// one of the subscription's own callbacks. If a callback is running on
    /// another thread this waits for it to return; once `cancel` returns no
    /// callback of this subscription runs again. Closing the connection and
    /// releasing the cache happen on the subscription's task right after.
    pub fn cancel(&self) {
        self.control.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.control.is_cancelled()
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.control.state()
    }

    /// When the current connection was opened, i.e. when the cached snapshot
    /// was last resynchronized with the server
    pub fn last_resync(&self) -> Option<DateTime<Utc>> {
        self.control.last_resync()
    }

    /// Subscribed path
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Wait until the subscription's task has stopped and released its
    /// connection and cache
    pub async fn terminated(&self) {
        self.control.terminated().await;
    }
}

impl Drop for ObserverHandle {
    fn drop(&mut self) {
        self.control.cancel();
    }
}
