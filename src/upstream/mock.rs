// In-process backends for tests

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

#[derive(Debug, Clone, Copy)]
pub struct MockOptions {
    /// `false` makes the backend close every connection after one response
    pub keep_alive: bool,
}

impl Default for MockOptions {
    fn default() -> Self {
        Self { keep_alive: true }
    }
}

pub struct MockUpstream {
    pub addr: SocketAddr,
    accepted: Arc<AtomicUsize>,
}

impl MockUpstream {
    /// TCP connections accepted so far
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

/// Start an echo backend on an ephemeral port.
///
/// Every response reflects what arrived in `x-echo-*` headers and echoes the
/// request body. `/status/<code>` answers with that status code.
pub async fn spawn_upstream(options: MockOptions) -> MockUpstream {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock upstream");
    let addr = listener.local_addr().expect("mock upstream addr");
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&accepted);

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let mut builder = http1::Builder::new();
                builder.keep_alive(options.keep_alive);
                let _ = builder
                    .serve_connection(TokioIo::new(stream), service_fn(echo))
                    .await;
            });
        }
    });

    MockUpstream { addr, accepted }
}

async fn echo(req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    let header = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-")
            .to_string()
    };
    let method = req.method().to_string();
    let uri = req.uri().to_string();
    let host = header("host");
    let forwarded_host = header("x-forwarded-host");
    let content_length = header("content-length");
    let cookie = header("cookie");

    let status = uri
        .strip_prefix("/status/")
        .and_then(|code| code.parse::<u16>().ok())
        .and_then(|code| StatusCode::from_u16(code).ok())
        .unwrap_or(StatusCode::OK);

    let body = req
        .into_body()
        .collect()
        .await
        .map(http_body_util::Collected::to_bytes)
        .unwrap_or_default();

    let response = Response::builder()
        .status(status)
        .header("x-echo-method", method)
        .header("x-echo-uri", uri)
        .header("x-echo-host", host)
        .header("x-echo-forwarded-host", forwarded_host)
        .header("x-echo-content-length", content_length)
        .header("x-echo-cookie", cookie)
        .header("x-echo-body-len", body.len())
        .header("set-cookie", "session=abc; Path=/")
        .body(Full::new(body))
        .expect("valid mock response");
    Ok(response)
}

/// Start a raw TCP backend that answers the n-th connection with the n-th
/// canned reply, written verbatim once the request head has arrived.
///
/// Connections past the end of `replies` are closed without an answer.
pub async fn spawn_scripted_upstream(replies: Vec<&'static [u8]>) -> MockUpstream {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind scripted upstream");
    let addr = listener.local_addr().expect("scripted upstream addr");
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&accepted);

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let index = counter.fetch_add(1, Ordering::SeqCst);
            let reply = replies.get(index).copied();
            tokio::spawn(async move {
                let mut head = Vec::new();
                let mut buf = [0u8; 1024];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => head.extend_from_slice(&buf[..n]),
                    }
                }
                if let Some(reply) = reply {
                    let _ = stream.write_all(reply).await;
                    let _ = stream.flush().await;
                    // hold the connection open until the client is done with it
                    let _ = stream.read(&mut buf).await;
                }
            });
        }
    });

    MockUpstream { addr, accepted }
}
