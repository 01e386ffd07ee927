//! Opening the long-lived event-stream request

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::{header, Client, StatusCode};
use tracing::debug;
use url::Url;

use super::types::{StreamError, StreamResult};

/// Raw body of an open stream
pub type ByteStream = Pin<Box<dyn Stream<Item = StreamResult<Bytes>> + Send>>;

/// Opens event-stream connections
///
/// The connection loop calls [`open`](StreamTransport::open) once per
/// physical connection. Implementations report a rejected credential as
/// [`StreamError::Unauthorized`] so the subscription stops instead of
/// reconnecting.
#[async_trait]
pub trait StreamTransport: std::fmt::Debug + Send + Sync {
    async fn open(&self, url: Url) -> StreamResult<ByteStream>;
}

/// [`StreamTransport`] over `reqwest`
#[derive(Debug, Clone)]
pub struct HttpStreamTransport {
    client: Client,
}

impl HttpStreamTransport {
    /// Create a transport; streams have no overall timeout, only a connect
    /// timeout
    pub fn new(connect_timeout: Duration) -> StreamResult<Self> {
        let client = Client::builder().connect_timeout(connect_timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl StreamTransport for HttpStreamTransport {
    async fn open(&self, url: Url) -> StreamResult<ByteStream> {
        debug!(path = url.path(), "Opening event stream");

        let response = self
            .client
            .get(url)
            .header(header::ACCEPT, "text/event-stream")
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(StreamError::Unauthorized {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(StreamError::Server {
                status: status.as_u16(),
                message,
            });
        }

        Ok(Box::pin(
            response.bytes_stream().map(|chunk| chunk.map_err(StreamError::from)),
        ))
    }
}
