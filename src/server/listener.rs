// Reusable listener module
// Creates the TCP listener with SO_REUSEADDR so quick restarts can rebind

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::TcpListener;

/// Create a `TcpListener` with `SO_REUSEADDR` enabled.
///
/// Restarting the server right after stopping it would otherwise fail while
/// the old socket sits in `TIME_WAIT`.
pub fn create_reusable_listener(addr: std::net::SocketAddr) -> std::io::Result<TcpListener> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(128)?;

    let std_listener: std::net::TcpListener = socket.into();
    TcpListener::from_std(std_listener)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_port_can_be_rebound_after_close() {
        let listener = create_reusable_listener("127.0.0.1:0".parse().expect("literal")).expect("bind");
        let addr = listener.local_addr().expect("addr");

        // Leave a connection behind so the port has socket state
        let client = tokio::net::TcpStream::connect(addr).await.expect("connect");
        let (server_side, _) = listener.accept().await.expect("accept");
        drop(server_side);
        drop(client);
        drop(listener);

        let rebound = create_reusable_listener(addr).expect("rebind same port");
        assert_eq!(rebound.local_addr().expect("addr"), addr);
    }
}
