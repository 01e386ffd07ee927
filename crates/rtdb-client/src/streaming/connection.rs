//! Lifetime of one subscription's connection
//!
//! ```text
//!              Opened                 Failed / Reauthenticate
//! Connecting ─────────▶ Streaming ───────────────────────────▶ Backoff
//!     ▲  │                                                       │
//!     │  └──────────────── Failed ─────────────────────────────▶ │
//!     └───────────────────── BackoffElapsed ─────────────────────┘
//!
//! any state ── Cancelled / Fatal ──▶ Terminated
//! ```
//!
//! Each subscription runs this loop on its own task. Every await point
//! races the cancel signal.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, trace, warn};
use url::Url;

use super::backoff::{Backoff, BackoffPolicy};
use super::dispatcher::EventDispatcher;
use super::handle::{Control, ObserverHandle};
use super::listener::ChangeListener;
use super::merge::PatchMerge;
use super::parser::FrameParser;
use super::transport::{ByteStream, StreamTransport};
use super::types::{Frame, StreamError, StreamResult};
use crate::auth::{apply_credential, AuthProvider};

/// Where a subscription is in its connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Obtaining a credential and opening the stream
    Connecting,
    /// Reading frames
    Streaming,
    /// Waiting before the next connection attempt
    Backoff,
    /// Stopped for good
    Terminated,
}

/// Input to the connection state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Opened,
    /// The connection could not be opened or was lost
    Failed,
    /// The server revoked the credential
    Reauthenticate,
    BackoffElapsed,
    Cancelled,
    Fatal,
}

impl ConnectionState {
    /// Next state; transitions that do not apply to the current state leave
    /// it unchanged
    pub fn on(self, transition: Transition) -> ConnectionState {
        use ConnectionState::*;
        use Transition::*;

        match (self, transition) {
            (Terminated, _) => Terminated,
            (_, Cancelled | Fatal) => Terminated,
            (Connecting, Opened) => Streaming,
            (Connecting | Streaming, Failed | Reauthenticate) => Backoff,
            (Backoff, BackoffElapsed) => Connecting,
            (state, _) => state,
        }
    }
}

/// Everything a subscription needs from its client
#[derive(Debug, Clone)]
pub(crate) struct StreamSettings {
    pub transport: Arc<dyn StreamTransport>,
    pub auth: Arc<dyn AuthProvider>,
    pub backoff: BackoffPolicy,
    pub idle_timeout: Option<Duration>,
    pub merge: PatchMerge,
}

/// Start a subscription on `url` (without credential) and return its handle
pub(crate) fn spawn_subscription<T, L>(
    runtime: &tokio::runtime::Handle,
    settings: &StreamSettings,
    url: Url,
    path: String,
    listener: L,
) -> ObserverHandle
where
    T: DeserializeOwned + Send + 'static,
    L: ChangeListener<T>,
{
    let control = Control::new();
    let connection = StreamConnection {
        url,
        path: path.clone(),
        transport: settings.transport.clone(),
        auth: settings.auth.clone(),
        backoff: Backoff::new(settings.backoff.clone()),
        idle_timeout: settings.idle_timeout,
        dispatcher: EventDispatcher::new(listener, settings.merge),
        control: control.clone(),
    };

    runtime.spawn(connection.run());
    ObserverHandle::new(control, path)
}

/// Marks the subscription terminated however the task ends
struct TerminateOnDrop(Arc<Control>);

impl Drop for TerminateOnDrop {
    fn drop(&mut self) {
        self.0.set_state(ConnectionState::Terminated);
    }
}

struct StreamConnection<T, L> {
    url: Url,
    path: String,
    transport: Arc<dyn StreamTransport>,
    auth: Arc<dyn AuthProvider>,
    backoff: Backoff,
    idle_timeout: Option<Duration>,
    dispatcher: EventDispatcher<T, L>,
    control: Arc<Control>,
}

impl<T, L> StreamConnection<T, L>
where
    T: DeserializeOwned + Send + 'static,
    L: ChangeListener<T>,
{
    async fn run(mut self) {
        let _terminate = TerminateOnDrop(self.control.clone());
        info!(path = %self.path, "Subscription started");

        let mut state = ConnectionState::Connecting;
        let mut body: Option<ByteStream> = None;
        let mut refresh = false;

        while state != ConnectionState::Terminated {
            self.control.set_state(state);

            let transition = match state {
                ConnectionState::Connecting => match self.connect(refresh).await {
                    Ok(opened) => {
                        body = Some(opened);
                        refresh = false;
                        Transition::Opened
                    }
                    Err(transition) => transition,
                },
                ConnectionState::Streaming => match body.take() {
                    Some(opened) => self.stream(opened).await,
                    None => Transition::Failed,
                },
                ConnectionState::Backoff => self.wait_backoff().await,
                ConnectionState::Terminated => break,
            };

            if transition == Transition::Reauthenticate {
                refresh = true;
            }
            state = state.on(transition);
        }

        let released = self.dispatcher.release();
        debug!(path = %self.path, released, "Released snapshot cache");
        info!(path = %self.path, "Subscription stopped");
    }

    async fn connect(&mut self, refresh: bool) -> Result<ByteStream, Transition> {
        let auth = self.auth.clone();
        let credential = tokio::select! {
            biased;
            _ = self.control.cancelled() => return Err(Transition::Cancelled),
            credential = auth.credential(refresh) => credential,
        };
        let credential = match credential {
            Ok(credential) => credential,
            Err(e) => return Err(self.fail(StreamError::Auth(e.0))),
        };

        let mut url = self.url.clone();
        apply_credential(&mut url, credential.as_deref());

        let transport = self.transport.clone();
        let opened = tokio::select! {
            biased;
            _ = self.control.cancelled() => return Err(Transition::Cancelled),
            opened = transport.open(url) => opened,
        };

        match opened {
            Ok(body) => {
                debug!(path = %self.path, "Stream opened");
                Ok(body)
            }
            Err(e) if e.is_fatal() => Err(self.fail(e)),
            Err(e) => {
                warn!(path = %self.path, error = %e, "Failed to open stream");
                Err(Transition::Failed)
            }
        }
    }

    async fn stream(&mut self, mut body: ByteStream) -> Transition {
        let mut parser = FrameParser::new();
        self.control.mark_resync();

        loop {
            let next = tokio::select! {
                biased;
                _ = self.control.cancelled() => return Transition::Cancelled,
                next = next_chunk(&mut body, self.idle_timeout) => next,
            };

            let bytes = match next {
                Ok(Some(bytes)) => bytes,
                Ok(None) => {
                    warn!(path = %self.path, error = %StreamError::Closed, "Reconnecting");
                    return Transition::Failed;
                }
                Err(e) => {
                    warn!(path = %self.path, error = %e, "Reconnecting");
                    return Transition::Failed;
                }
            };

            for frame in parser.feed(bytes) {
                let transition = match frame {
                    Ok(frame) => self.handle_frame(frame),
                    Err(e) => {
                        warn!(path = %self.path, error = %e, "Malformed frame, reconnecting");
                        Some(Transition::Failed)
                    }
                };
                if let Some(transition) = transition {
                    return transition;
                }
            }
        }
    }

    fn handle_frame(&mut self, frame: Frame) -> Option<Transition> {
        match frame {
            Frame::KeepAlive => {
                trace!(path = %self.path, "keep-alive");
                None
            }
            Frame::Put(_) | Frame::Patch(_) => {
                let control = &self.control;
                let dispatcher = &mut self.dispatcher;
                match control.dispatch(|| dispatcher.dispatch(&frame, || !control.is_cancelled())) {
                    Some(_) => {
                        self.backoff.reset();
                        None
                    }
                    None => Some(Transition::Cancelled),
                }
            }
            Frame::AuthRevoked(reason) => {
                warn!(path = %self.path, reason = ?reason, "Credential revoked, re-authenticating");
                Some(Transition::Reauthenticate)
            }
            Frame::Cancel(reason) => {
                let reason = reason.unwrap_or_else(|| "read access revoked".to_string());
                Some(self.fail(StreamError::AccessRevoked(reason)))
            }
        }
    }

    async fn wait_backoff(&mut self) -> Transition {
        let delay = self.backoff.next_delay();
        debug!(
            path = %self.path,
            attempt = self.backoff.attempts(),
            delay_ms = delay.as_millis() as u64,
            "Waiting before reconnect"
        );

        tokio::select! {
            biased;
            _ = self.control.cancelled() => Transition::Cancelled,
            _ = tokio::time::sleep(delay) => Transition::BackoffElapsed,
        }
    }

    /// Report `error` to the listener, unless cancelled first
    fn fail(&mut self, error: StreamError) -> Transition {
        error!(path = %self.path, %error, "Subscription terminated");
        let dispatcher = &mut self.dispatcher;
        self.control.dispatch(|| dispatcher.report_fatal(error));
        Transition::Fatal
    }
}

async fn next_chunk(
    body: &mut ByteStream,
    idle_timeout: Option<Duration>,
) -> StreamResult<Option<Bytes>> {
    match idle_timeout {
        Some(limit) => match tokio::time::timeout(limit, body.next()).await {
            Ok(chunk) => chunk.transpose(),
            Err(_) => Err(StreamError::IdleTimeout),
        },
        None => body.next().await.transpose(),
    }
}
