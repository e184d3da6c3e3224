// Upstream connect module
// TCP connect, optional TLS, then the HTTP/1.1 client handshake

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use super::{LiveConnection, UpstreamError};
use crate::config::ForwardConfig;
use crate::logger;

/// Open a new connection to the configured upstream
pub(super) async fn open(
    target: &ForwardConfig,
    tls: Option<&TlsConnector>,
) -> Result<LiveConnection, UpstreamError> {
    let addr = target.connect_addr();
    let stream = TcpStream::connect(&addr)
        .await
        .map_err(|source| UpstreamError::Connect {
            addr: addr.clone(),
            source,
        })?;
    if let Err(e) = stream.set_nodelay(true) {
        logger::log_warning(&format!("Failed to set TCP_NODELAY on {addr}: {e}"));
    }

    match tls {
        Some(connector) => {
            let server_name = ServerName::try_from(target.host.clone())
                .map_err(|_| UpstreamError::ServerName(target.host.clone()))?;
            let stream = connector
                .connect(server_name, stream)
                .await
                .map_err(|source| UpstreamError::Tls {
                    host: target.host.clone(),
                    source,
                })?;
            handshake(stream).await
        }
        None => handshake(stream).await,
    }
}

/// Run the client handshake and spawn the task that drives the connection
async fn handshake<T>(io: T) -> Result<LiveConnection, UpstreamError>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let mut builder = http1::Builder::new();
    builder.preserve_header_case(true);

    let (sender, conn) = builder
        .handshake::<_, Full<Bytes>>(TokioIo::new(io))
        .await
        .map_err(UpstreamError::Handshake)?;

    let driver = tokio::spawn(async move {
        if let Err(err) = conn.await {
            logger::log_upstream_connection_error(&err);
        }
    });

    Ok(LiveConnection { sender, driver })
}
