//! Upstream connection module
//!
//! Owns the one long-lived connection to the backend that every forwarded
//! request goes through. Requests serialize on a mutex; a transient failure
//! closes the connection, opens a fresh one and resends the request once.
//!
//! ```text
//! Disconnected --open--> Connected --exchange ok--> Connected
//!                            |
//!                     transient failure
//!                            v
//!                      Disconnected --reopen--> Connected
//! ```

mod connect;
mod tls;

#[cfg(test)]
pub(crate) mod mock;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::http::{Extensions, HeaderMap, Method};
use hyper::{Request, Response, Version};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_rustls::TlsConnector;

use crate::config::{ForwardConfig, Transport};
use crate::logger;

/// Upstream failure, split into what a reconnect can fix and what it can't
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid TLS server name '{0}'")]
    ServerName(String),
    #[error("TLS handshake with {host} failed: {source}")]
    Tls {
        host: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to build TLS client configuration: {0}")]
    TlsConfig(#[from] rustls::Error),
    #[error("HTTP handshake with upstream failed: {0}")]
    Handshake(#[source] hyper::Error),
    #[error("failed to send request upstream: {0}")]
    Send(#[source] hyper::Error),
    #[error("failed to read upstream response body: {0}")]
    Body(#[source] hyper::Error),
    #[error("invalid upstream request: {0}")]
    Request(#[from] hyper::http::Error),
}

impl UpstreamError {
    /// Whether a fresh connection and a single resend may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Connect { .. } | Self::Tls { .. } | Self::Handshake(_) => true,
            Self::Send(err) => !err.is_user(),
            Self::ServerName(_) | Self::TlsConfig(_) | Self::Body(_) | Self::Request(_) => false,
        }
    }
}

/// A fully buffered request, replayable on retry
#[derive(Debug, Clone)]
pub struct OutgoingRequest {
    pub method: Method,
    /// Origin-form target: path plus query
    pub target: String,
    pub headers: HeaderMap,
    /// Carries hyper's original header casing through to the upstream
    pub extensions: Extensions,
    pub body: Option<Bytes>,
}

impl OutgoingRequest {
    fn to_request(&self) -> Result<Request<Full<Bytes>>, UpstreamError> {
        let mut request = Request::builder()
            .method(self.method.clone())
            .uri(self.target.as_str())
            .version(Version::HTTP_11)
            .body(Full::new(self.body.clone().unwrap_or_default()))?;
        *request.headers_mut() = self.headers.clone();
        *request.extensions_mut() = self.extensions.clone();
        Ok(request)
    }
}

/// An open HTTP/1.1 client connection and the task driving it
struct LiveConnection {
    sender: hyper::client::conn::http1::SendRequest<Full<Bytes>>,
    driver: JoinHandle<()>,
}

impl Drop for LiveConnection {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

/// Connection state as seen from outside
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// The process-wide upstream connection
pub struct UpstreamConnection {
    target: Arc<ForwardConfig>,
    tls: Option<TlsConnector>,
    current: Mutex<Option<LiveConnection>>,
    connects: AtomicU64,
    reconnects: AtomicU64,
}

impl UpstreamConnection {
    /// Prepare the connection. Nothing is opened until the first request.
    pub fn new(target: Arc<ForwardConfig>) -> Result<Self, UpstreamError> {
        let tls = match target.transport {
            Transport::Secure => Some(tls::connector()?),
            Transport::Plain => None,
        };
        Ok(Self {
            target,
            tls,
            current: Mutex::new(None),
            connects: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
        })
    }

    pub fn target(&self) -> &ForwardConfig {
        &self.target
    }

    /// Send a request and return the complete upstream response.
    ///
    /// On a transient failure the connection is replaced and the request
    /// resent exactly once; the second failure is returned as is.
    pub async fn send(&self, request: &OutgoingRequest) -> Result<Response<Full<Bytes>>, UpstreamError> {
        let mut current = self.current.lock().await;

        match self.exchange(&mut current, request).await {
            Ok(response) => Ok(response),
            Err(err) if err.is_transient() => {
                logger::log_connecting(&self.target.connect_addr(), &err);
                *current = None;
                self.reconnects.fetch_add(1, Ordering::SeqCst);
                let result = self.exchange(&mut current, request).await;
                if result.is_err() {
                    *current = None;
                }
                result
            }
            Err(err) => {
                // Unknown connection state, start over on the next request
                *current = None;
                Err(err)
            }
        }
    }

    async fn exchange(
        &self,
        slot: &mut Option<LiveConnection>,
        request: &OutgoingRequest,
    ) -> Result<Response<Full<Bytes>>, UpstreamError> {
        let live = match slot.take() {
            Some(live) => live,
            None => {
                let live = connect::open(&self.target, self.tls.as_ref()).await?;
                self.connects.fetch_add(1, Ordering::SeqCst);
                live
            }
        };
        let live = slot.insert(live);

        let outgoing = request.to_request()?;
        live.sender.ready().await.map_err(UpstreamError::Send)?;
        let response = live
            .sender
            .send_request(outgoing)
            .await
            .map_err(UpstreamError::Send)?;

        // The connection only accepts the next request once this body is drained
        let (parts, body) = response.into_parts();
        let body = body.collect().await.map_err(UpstreamError::Body)?.to_bytes();
        Ok(Response::from_parts(parts, Full::new(body)))
    }

    /// Close the current connection, if any. Used at shutdown.
    pub async fn close(&self) {
        self.current.lock().await.take();
    }

    pub async fn state(&self) -> ConnectionState {
        match self.current.lock().await.as_ref() {
            Some(live) if !live.sender.is_closed() => ConnectionState::Connected,
            _ => ConnectionState::Disconnected,
        }
    }

    /// Connections opened so far, including reconnects
    pub fn connects(&self) -> u64 {
        self.connects.load(Ordering::SeqCst)
    }

    /// Times a failed exchange was retried on a fresh connection
    pub fn reconnects(&self) -> u64 {
        self.reconnects.load(Ordering::SeqCst)
    }
}
