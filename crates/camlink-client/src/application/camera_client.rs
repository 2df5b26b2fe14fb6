//! Typed camera commands on top of an [`Exchange`].
//!
//! Each method builds one request, runs it through the exchange seam, turns
//! a negative `rc` into [`ClientError::Rejected`], and decodes the reply
//! payload into the matching record type.

use std::time::{Duration, Instant};

use camlink_core::protocol::codec::{encode_argument, Record, FRAME_INFO_SIZE};
use camlink_core::protocol::messages::{CameraInfo, ExposureParms, FrameInfo, RingInfo};
use camlink_core::{BurstState, Frame, Message, Opcode, ProtocolError};
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::infrastructure::network::{
    ClientError, Connection, EngineOptions, Exchange, ExchangeEngine,
};

/// The server caps one BURST_WAIT at this many milliseconds.
pub const BURST_WAIT_MAX_MS: u32 = 1000;

/// Camera control commands over one exchange engine.
#[derive(Debug)]
pub struct CameraClient<E = ExchangeEngine<TcpStream>> {
    exchange: E,
}

impl CameraClient<ExchangeEngine<TcpStream>> {
    /// Connects to `addr` and wraps the stream in a fresh engine.
    ///
    /// No traffic is sent until the first command.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ConnectFailed`] if the TCP connect fails.
    pub async fn connect(addr: &str, options: EngineOptions) -> Result<Self, ClientError> {
        let connection = Connection::connect(addr).await?;
        Ok(Self::new(ExchangeEngine::from_connection(connection, options)))
    }
}

impl<E: Exchange> CameraClient<E> {
    pub fn new(exchange: E) -> Self {
        Self { exchange }
    }

    pub fn exchange(&self) -> &E {
        &self.exchange
    }

    async fn call(&self, opcode: Opcode, payload: Vec<u8>) -> Result<Message, ClientError> {
        let request = Message::request(opcode, self.exchange.next_msgid()).with_payload(payload);
        let reply = self.exchange.exchange(request).await?;
        if reply.header.rc < 0 {
            debug!(?opcode, rc = reply.header.rc, "request rejected");
            return Err(ClientError::Rejected {
                opcode,
                rc: reply.header.rc,
            });
        }
        Ok(reply)
    }

    async fn call_empty(&self, opcode: Opcode) -> Result<Message, ClientError> {
        self.call(opcode, Vec::new()).await
    }

    async fn call_arg(&self, opcode: Opcode, arg: u32) -> Result<Message, ClientError> {
        self.call(opcode, encode_argument(arg)).await
    }

    // ── Session ───────────────────────────────────────────────────────────────

    /// Returns the server's protocol version.
    pub async fn query_version(&self) -> Result<u32, ClientError> {
        let reply = self.call_empty(Opcode::QueryVersion).await?;
        Ok(non_negative(reply.header.rc))
    }

    /// Asks the server to close this connection after replying.
    pub async fn end_session(&self) -> Result<(), ClientError> {
        self.call_empty(Opcode::ServerEnd).await.map(drop)
    }

    // ── Camera ────────────────────────────────────────────────────────────────

    pub async fn camera_info(&self) -> Result<CameraInfo, ClientError> {
        let reply = self.call_empty(Opcode::GetCameraInfo).await?;
        Ok(CameraInfo::from_payload(&reply.payload)?)
    }

    /// Captures one frame into the server's ring.
    pub async fn acquire_image(&self) -> Result<(), ClientError> {
        self.call_empty(Opcode::AcquireImage).await.map(drop)
    }

    /// Metadata of the frame currently selected for display.
    pub async fn image_info(&self) -> Result<FrameInfo, ClientError> {
        let reply = self.call_empty(Opcode::GetImageInfo).await?;
        Ok(FrameInfo::from_payload(&reply.payload)?)
    }

    /// Pixels of the frame currently selected for display.
    pub async fn image_data(&self) -> Result<Vec<u8>, ClientError> {
        Ok(self.call_empty(Opcode::GetImageData).await?.payload)
    }

    pub async fn exposure(&self) -> Result<ExposureParms, ClientError> {
        let reply = self.call_empty(Opcode::GetExposureParms).await?;
        Ok(ExposureParms::from_payload(&reply.payload)?)
    }

    /// Requests new exposure settings; returns what the camera applied.
    pub async fn set_exposure(&self, parms: &ExposureParms) -> Result<ExposureParms, ClientError> {
        let reply = self
            .call(Opcode::SetExposureParms, parms.to_payload())
            .await?;
        Ok(ExposureParms::from_payload(&reply.payload)?)
    }

    pub async fn set_led(&self, on: bool) -> Result<(), ClientError> {
        self.call_arg(Opcode::LedSetState, u32::from(on)).await.map(drop)
    }

    pub async fn enable_video(&self, enabled: bool) -> Result<(), ClientError> {
        self.call_arg(Opcode::VideoEnable, u32::from(enabled))
            .await
            .map(drop)
    }

    // ── Ring ──────────────────────────────────────────────────────────────────

    pub async fn ring_info(&self) -> Result<RingInfo, ClientError> {
        let reply = self.call_empty(Opcode::RingGetInfo).await?;
        Ok(RingInfo::from_payload(&reply.payload)?)
    }

    pub async fn ring_size(&self) -> Result<u32, ClientError> {
        let reply = self.call_empty(Opcode::RingGetSize).await?;
        Ok(non_negative(reply.header.rc))
    }

    /// Resizes the ring, discarding its frames.  Returns the size applied
    /// after clamping.
    pub async fn set_ring_size(&self, size: u32) -> Result<u32, ClientError> {
        let reply = self.call_arg(Opcode::RingSetSize, size).await?;
        Ok(non_negative(reply.header.rc))
    }

    pub async fn ring_frame_count(&self) -> Result<u32, ClientError> {
        let reply = self.call_empty(Opcode::RingGetFrameCnt).await?;
        Ok(non_negative(reply.header.rc))
    }

    /// Fetches the frame stored in ring slot `index`.  Slots wrap, so after
    /// more than `size` captures slot 0 holds a newer frame than slot 1.
    ///
    /// # Errors
    ///
    /// [`ClientError::Rejected`] if the index is beyond the valid frames;
    /// [`ClientError::Protocol`] if the pixel count disagrees with the
    /// frame metadata.
    pub async fn ring_frame(&self, index: u32) -> Result<Frame, ClientError> {
        let reply = self.call_arg(Opcode::RingImageNData, index).await?;
        let info = FrameInfo::from_payload(&reply.payload)?;
        let pixels = reply.payload.get(FRAME_INFO_SIZE..).unwrap_or_default();
        if pixels.len() != info.frame_bytes() {
            return Err(ProtocolError::MalformedPayload(format!(
                "frame {index}: {} pixel bytes, metadata says {}",
                pixels.len(),
                info.frame_bytes()
            ))
            .into());
        }
        Ok(Frame::new(info, pixels.to_vec()))
    }

    // ── Burst ─────────────────────────────────────────────────────────────────

    /// Arms a burst; the server waits for its start trigger.
    pub async fn burst_arm(&self) -> Result<(), ClientError> {
        self.call_empty(Opcode::BurstArm).await.map(drop)
    }

    pub async fn burst_abort(&self) -> Result<(), ClientError> {
        self.call_empty(Opcode::BurstAbort).await.map(drop)
    }

    /// Current burst state.  Reading a terminal state of a finished
    /// session resets the server side to `Init`.
    pub async fn burst_status(&self) -> Result<BurstState, ClientError> {
        let reply = self.call_empty(Opcode::BurstStatus).await?;
        BurstState::try_from(reply.header.rc).map_err(|rc| {
            ClientError::from(ProtocolError::MalformedPayload(format!(
                "unknown burst state {rc}"
            )))
        })
    }

    /// Waits up to `ms` (server caps at [`BURST_WAIT_MAX_MS`]) for the burst
    /// session to end.  Returns `true` if it is still running.
    pub async fn burst_wait(&self, ms: u32) -> Result<bool, ClientError> {
        let reply = self.call_arg(Opcode::BurstWait, ms).await?;
        Ok(reply.header.rc != 0)
    }

    /// Waits in capped slices until the burst session ends or `limit`
    /// passes, then returns the final state.
    ///
    /// Returns the last observed state if `limit` runs out first.
    pub async fn wait_for_burst_end(&self, limit: Duration) -> Result<BurstState, ClientError> {
        let started = Instant::now();
        while self.burst_wait(BURST_WAIT_MAX_MS).await? {
            if started.elapsed() >= limit {
                info!("burst still running after {limit:?}");
                break;
            }
        }
        self.burst_status().await
    }
}

fn non_negative(rc: i32) -> u32 {
    u32::try_from(rc).unwrap_or(0)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::network::exchange::MockExchange;
    use crate::infrastructure::network::ErrorKind;
    use camlink_core::protocol::codec::decode_argument;
    use camlink_core::protocol::messages::RC_FAILED;

    /// A mock that answers every request with `reply(request)`.
    fn mock_replying<F>(reply: F) -> MockExchange
    where
        F: Fn(Message) -> Message + Send + 'static,
    {
        let mut mock = MockExchange::new();
        mock.expect_next_msgid().return_const(7u32);
        mock.expect_exchange().returning(move |request| Ok(reply(request)));
        mock
    }

    fn ok_reply(request: &Message) -> Message {
        Message::reply_to(&request.header)
    }

    #[tokio::test]
    async fn test_negative_rc_becomes_rejected() {
        // Arrange
        let client = CameraClient::new(mock_replying(|req| ok_reply(&req).with_rc(RC_FAILED)));

        // Act
        let err = client.image_info().await.unwrap_err();

        // Assert
        assert!(matches!(
            err,
            ClientError::Rejected { opcode: Opcode::GetImageInfo, rc: -1 }
        ));
        assert_eq!(err.kind(), ErrorKind::Application);
    }

    #[tokio::test]
    async fn test_set_ring_size_sends_argument_and_returns_rc() {
        let client = CameraClient::new(mock_replying(|req| {
            assert_eq!(req.opcode(), Some(Opcode::RingSetSize));
            assert_eq!(req.header.msgid, 7);
            let requested = decode_argument(&req.payload).unwrap();
            ok_reply(&req).with_rc(i32::try_from(requested.min(999)).unwrap())
        }));

        assert_eq!(client.set_ring_size(5000).await.unwrap(), 999);
    }

    #[tokio::test]
    async fn test_ring_frame_splits_metadata_and_pixels() {
        // Arrange
        let info = FrameInfo {
            sequence: 9,
            width: 4,
            height: 2,
            pitch: 4,
            ..FrameInfo::default()
        };
        let client = CameraClient::new(mock_replying(move |req| {
            let mut payload = info.to_payload();
            payload.extend_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
            ok_reply(&req).with_payload(payload)
        }));

        // Act
        let frame = client.ring_frame(0).await.unwrap();

        // Assert
        assert_eq!(frame.info, info);
        assert_eq!(frame.pixels, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[tokio::test]
    async fn test_ring_frame_with_short_pixels_is_protocol_error() {
        let info = FrameInfo {
            width: 4,
            height: 2,
            pitch: 4,
            ..FrameInfo::default()
        };
        let client = CameraClient::new(mock_replying(move |req| {
            let mut payload = info.to_payload();
            payload.extend_from_slice(&[0; 3]);
            ok_reply(&req).with_payload(payload)
        }));

        let err = client.ring_frame(0).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    #[tokio::test]
    async fn test_burst_status_decodes_state() {
        let client = CameraClient::new(mock_replying(|req| {
            ok_reply(&req).with_rc(BurstState::Running.code())
        }));

        assert_eq!(client.burst_status().await.unwrap(), BurstState::Running);
    }

    #[tokio::test]
    async fn test_unknown_burst_state_is_protocol_error() {
        let client = CameraClient::new(mock_replying(|req| ok_reply(&req).with_rc(42)));

        let err = client.burst_status().await.unwrap_err();

        assert!(matches!(err, ClientError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_burst_wait_maps_rc_to_still_running() {
        let client = CameraClient::new(mock_replying(|req| {
            let ms = decode_argument(&req.payload).unwrap();
            ok_reply(&req).with_rc(i32::from(ms > 100))
        }));

        assert!(client.burst_wait(500).await.unwrap());
        assert!(!client.burst_wait(50).await.unwrap());
    }

    #[tokio::test]
    async fn test_transport_errors_pass_through_unchanged() {
        // Arrange
        let mut mock = MockExchange::new();
        mock.expect_next_msgid().return_const(1u32);
        mock.expect_exchange()
            .times(1)
            .returning(|_| Err(ClientError::ConnectionClosed));
        let client = CameraClient::new(mock);

        // Act
        let err = client.acquire_image().await.unwrap_err();

        // Assert
        assert!(matches!(err, ClientError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_set_exposure_round_trips_applied_values() {
        let client = CameraClient::new(mock_replying(|req| {
            let mut applied = ExposureParms::from_payload(&req.payload).unwrap();
            applied.fps = applied.fps.min(30.0);
            ok_reply(&req).with_payload(applied.to_payload())
        }));
        let requested = ExposureParms {
            fps: 120.0,
            ..ExposureParms::default()
        };

        let applied = client.set_exposure(&requested).await.unwrap();

        assert_eq!(applied.fps, 30.0);
        assert_eq!(applied.exposure_ms, requested.exposure_ms);
    }
}
