// Server loop module
// Accepts connections until shutdown is requested

use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;

use super::connection::accept_connection;
use crate::config::AppState;
use crate::logger;

/// Accept connections until `shutdown` resolves.
///
/// The listener is handed back so the caller decides when the port is
/// released.
pub async fn start_server_loop<F>(listener: TcpListener, state: Arc<AppState>, shutdown: F) -> TcpListener
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer_addr)) => accept_connection(stream, peer_addr, &state),
                    Err(e) => logger::log_error(&format!("Failed to accept connection: {e}")),
                }
            }

            () = &mut shutdown => break,
        }
    }

    listener
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, ForwardConfig, Transport};
    use crate::upstream::UpstreamConnection;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_serves_until_shutdown() {
        let mut config = Config::load_from("does-not-exist/serve-locally").expect("defaults");
        config.logging.access_log = false;
        let forward = Arc::new(ForwardConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            transport: Transport::Plain,
            prefix: "/api".to_string(),
            forward_path: String::new(),
        });
        let upstream = UpstreamConnection::new(Arc::clone(&forward)).expect("plain upstream");
        let state = Arc::new(AppState::new(&config, forward, upstream));

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (stop, stopped) = oneshot::channel::<()>();
        let server = tokio::spawn(start_server_loop(listener, state, async move {
            let _ = stopped.await;
        }));

        let mut stream = tokio::net::TcpStream::connect(addr).await.expect("connect");
        stream
            .write_all(b"DELETE /index.html HTTP/1.1\r\nHost: x\r\n\r\n")
            .await
            .expect("write");
        let mut buf = vec![0u8; 64];
        let n = stream.read(&mut buf).await.expect("read");
        assert!(String::from_utf8_lossy(&buf[..n]).starts_with("HTTP/1.1 501"));

        stop.send(()).expect("loop still running");
        let listener = server.await.expect("loop exits");
        assert_eq!(listener.local_addr().expect("addr"), addr);
    }
}
