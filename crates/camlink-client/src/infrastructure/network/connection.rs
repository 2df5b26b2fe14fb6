//! TCP connection to a camera server.
//!
//! Opening a connection does no protocol work at all; the version
//! handshake happens lazily in the exchange engine on first use.

use std::net::SocketAddr;

use tokio::net::TcpStream;
use tracing::{debug, info};

use super::error::ClientError;

/// An open control connection that has not been handed to an engine yet.
#[derive(Debug)]
pub struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
}

impl Connection {
    /// Connects to `addr` (`"host:port"`, hostnames are resolved).
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ConnectFailed`] if resolution or the TCP
    /// connect fails.
    pub async fn connect(addr: &str) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| ClientError::ConnectFailed {
                addr: addr.to_string(),
                source,
            })?;
        let peer = stream
            .peer_addr()
            .map_err(|source| ClientError::ConnectFailed {
                addr: addr.to_string(),
                source,
            })?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!("set_nodelay failed for {peer}: {e}");
        }
        info!("connected to camera server at {peer}");
        Ok(Self { stream, peer })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn into_stream(self) -> TcpStream {
        self.stream
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::network::error::ErrorKind;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_connect_reports_peer_address() {
        // Arrange
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Act
        let conn = Connection::connect(&addr.to_string()).await.unwrap();

        // Assert
        assert_eq!(conn.peer(), addr);
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_is_transport_error() {
        // Bind then drop to find a port nobody listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = Connection::connect(&addr.to_string()).await.unwrap_err();

        assert!(matches!(err, ClientError::ConnectFailed { .. }));
        assert_eq!(err.kind(), ErrorKind::Transport);
    }
}
