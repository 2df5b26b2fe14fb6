//! TCP control listener and per-connection request loop.
//!
//! ```text
//! serve()
//!  └─ accept loop ──▶ tokio::spawn(handle_connection)   one task per client
//!        handle_connection:
//!          read_message ─▶ dispatch ─▶ write_message ─▶ (repeat)
//! ```
//!
//! A connection ends when the peer closes between messages, when it sends
//! SERVER_END (after the reply), or on any transport fault.  Faults are
//! logged and close only that connection.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use camlink_core::{read_message, write_message, Opcode};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::application::context::{ServerContext, ServerError};
use crate::application::dispatch::dispatch;

/// Pause after a failed `accept` before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Binds the control listener.
///
/// # Errors
///
/// Returns [`ServerError::BindFailed`] if the address cannot be bound.
pub async fn bind_listener(addr: SocketAddr) -> Result<TcpListener, ServerError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::BindFailed { addr, source })?;
    info!("control listener on TCP {addr}");
    Ok(listener)
}

/// Accepts connections forever, one task each.
///
/// Accept errors are logged and the loop continues after a short pause.
pub async fn serve(listener: TcpListener, ctx: Arc<ServerContext>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!("set_nodelay failed for {peer}: {e}");
                }
                let ctx = Arc::clone(&ctx);
                tokio::spawn(async move {
                    handle_connection(stream, peer, ctx).await;
                });
            }
            Err(e) => {
                warn!("accept failed: {e}");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}

/// Serves one client until it disconnects or sends SERVER_END.
pub async fn handle_connection<S>(mut stream: S, peer: SocketAddr, ctx: Arc<ServerContext>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let session = ctx.sessions().open(peer).await;
    let open = ctx.sessions().len().await;
    info!(%session, %peer, open, "client connected");

    let max_payload = ctx.settings().max_payload;
    loop {
        let request = match read_message(&mut stream, max_payload).await {
            Ok(Some(request)) => request,
            Ok(None) => {
                debug!(%session, "peer closed the connection");
                break;
            }
            Err(e) if e.is_disconnect() => {
                info!(%session, "peer dropped mid-message: {e}");
                break;
            }
            Err(e) => {
                warn!(%session, "connection fault: {e}");
                break;
            }
        };

        let reply = dispatch(&ctx, &request).await;
        ctx.sessions().record_request(session).await;

        if let Err(e) = write_message(&mut stream, &reply).await {
            warn!(%session, "failed to send reply: {e}");
            break;
        }

        if request.opcode() == Some(Opcode::ServerEnd) {
            debug!(%session, "SERVER_END received");
            break;
        }
    }

    if let Some(closed) = ctx.sessions().close(session).await {
        info!(
            %session,
            %peer,
            requests = closed.requests_served,
            "client disconnected"
        );
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    use camlink_core::protocol::codec::encode_argument;
    use camlink_core::{encode_header, FrameRing, Message, PROTOCOL_VERSION};
    use tokio_test::io::Builder;

    use crate::application::context::{Hardware, ServerSettings};
    use crate::infrastructure::camera::simulated::SimulatedCamera;
    use crate::infrastructure::trigger::DisabledTrigger;

    fn context() -> Arc<ServerContext> {
        ServerContext::new(
            Hardware::new(Box::new(SimulatedCamera::default()), FrameRing::new(4)),
            Arc::new(DisabledTrigger),
            ServerSettings::default(),
        )
    }

    fn peer() -> SocketAddr {
        "10.0.0.9:40000".parse().unwrap()
    }

    fn wire(message: &Message) -> Vec<u8> {
        let mut bytes = encode_header(&message.header).to_vec();
        bytes.extend_from_slice(&message.payload);
        bytes
    }

    #[tokio::test]
    async fn test_connection_replies_in_order_and_stops_after_server_end() {
        // Arrange – the request arrives in two pieces; nothing is read after SERVER_END
        let version = Message::request(Opcode::QueryVersion, 7);
        let version_reply = Message::reply_to(&version.header).with_rc(PROTOCOL_VERSION as i32);
        let end = Message::request(Opcode::ServerEnd, 8);
        let end_reply = Message::reply_to(&end.header);
        let request = wire(&version);
        let stream = Builder::new()
            .read(&request[..10])
            .read(&request[10..])
            .write(&wire(&version_reply))
            .read(&wire(&end))
            .write(&wire(&end_reply))
            .build();
        let ctx = context();

        // Act
        handle_connection(stream, peer(), Arc::clone(&ctx)).await;

        // Assert
        assert!(ctx.sessions().is_empty().await);
    }

    #[tokio::test]
    async fn test_connection_rejects_bad_argument_and_keeps_serving() {
        // Arrange – RING_SET_SIZE with a two-byte payload, then a valid one
        let short = Message::request(Opcode::RingSetSize, 1).with_payload(vec![0, 3]);
        let short_reply = Message::reply_to(&short.header).with_rc(-1);
        let good = Message::request(Opcode::RingSetSize, 2).with_payload(encode_argument(3));
        let good_reply = Message::reply_to(&good.header).with_rc(3);
        let stream = Builder::new()
            .read(&wire(&short))
            .write(&wire(&short_reply))
            .read(&wire(&good))
            .write(&wire(&good_reply))
            .build();
        let ctx = context();

        // Act – the peer closes cleanly after the second reply
        handle_connection(stream, peer(), Arc::clone(&ctx)).await;

        // Assert
        assert_eq!(ctx.lock_hardware().await.unwrap().ring.size(), 3);
        assert!(ctx.sessions().is_empty().await);
    }
}
