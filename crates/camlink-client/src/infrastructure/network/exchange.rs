//! Single-flight request/reply engine.
//!
//! The camera protocol has no request pipelining: a reply carries no more
//! than the echoed opcode and tag, and the server answers strictly in
//! order.  Two tasks writing to one socket at the same time would therefore
//! read each other's replies.  [`ExchangeEngine`] owns the socket and lets
//! exactly one request/reply pair through at a time, which is what makes a
//! [`CameraClient`](crate::CameraClient) safe to share behind an `Arc`.
//!
//! # How an exchange works
//!
//! ```text
//! exchange(request)
//!  ├─ lock channel (bounded by lock_timeout, else Busy)
//!  ├─ first use only: QUERY_VERSION handshake, exact match on 1002
//!  ├─ write header + payload
//!  ├─ read header, then exactly data_len payload bytes
//!  └─ check reply.msg == request.msg, unlock
//! ```
//!
//! One request is in flight per connection at any moment.  Any number of
//! tasks may share one engine; they queue on the channel lock.
//!
//! # Poisoning
//!
//! After a transport failure, a mismatched reply, a failed handshake, or an
//! exchange whose caller gave up half-way (the future was dropped), the
//! stream can no longer be trusted to be at a message boundary.  The engine
//! drops it and every later call fails fast with [`ClientError::Unusable`].
//! Reconnecting means building a new engine.
//!
//! # Errors the engine does not raise
//!
//! A reply with a negative `rc` is a perfectly good reply: the server
//! processed the command and refused it.  The engine returns it as-is and
//! leaves the typed commands to turn it into
//! [`ClientError::Rejected`].  Lock timeouts, transport faults, and a
//! failed handshake are never retried here; the caller decides.

use std::time::Duration;

use async_trait::async_trait;
use camlink_core::protocol::messages::MAX_PAYLOAD_BYTES;
use camlink_core::protocol::SequenceCounter;
use camlink_core::{read_message, write_message, Message, Opcode, PROTOCOL_VERSION};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, trace, warn};

use super::connection::Connection;
use super::error::{ClientError, PoisonReason};

/// Default bound on waiting for the single-flight lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Tunables for an [`ExchangeEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// How long a caller waits for the channel before giving up with `Busy`.
    pub lock_timeout: Duration,
    /// Largest reply payload accepted; larger replies poison the channel.
    pub max_payload: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            max_payload: MAX_PAYLOAD_BYTES,
        }
    }
}

/// The request/reply seam used by [`CameraClient`](crate::application::camera_client::CameraClient).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Sends `request` and returns the reply that answers it.
    async fn exchange(&self, request: Message) -> Result<Message, ClientError>;

    /// Allocates a `msgid` for the next request.
    fn next_msgid(&self) -> u32;
}

// ── Channel ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChannelState {
    /// Connected, handshake not done yet.
    Fresh,
    /// Handshake succeeded.
    Ready,
    /// No further exchanges; the stream has been dropped.
    Poisoned(PoisonReason),
}

struct Channel<S> {
    stream: Option<S>,
    state: ChannelState,
    /// Set while a request is on the wire; still set at the next lock
    /// means the previous caller was cancelled mid-exchange.
    in_flight: bool,
}

impl<S> Channel<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn poison(&mut self, reason: PoisonReason) {
        if self.stream.take().is_some() {
            warn!("control connection unusable after {reason}");
        }
        self.state = ChannelState::Poisoned(reason);
        self.in_flight = false;
    }

    /// Performs the version handshake if it has not happened yet.
    async fn ensure_ready(&mut self, msgid: u32, max_payload: usize) -> Result<(), ClientError> {
        match self.state {
            ChannelState::Ready => return Ok(()),
            ChannelState::Poisoned(reason) => return Err(ClientError::Unusable(reason)),
            ChannelState::Fresh => {}
        }

        let request = Message::request(Opcode::QueryVersion, msgid);
        let reply = self.round_trip(&request, max_payload).await?;
        let server = reply.header.rc;
        if u32::try_from(server).ok() != Some(PROTOCOL_VERSION) {
            self.poison(PoisonReason::VersionMismatch);
            return Err(ClientError::VersionMismatch {
                server,
                client: PROTOCOL_VERSION,
            });
        }

        debug!(version = server, "protocol handshake complete");
        self.state = ChannelState::Ready;
        Ok(())
    }

    async fn round_trip(
        &mut self,
        request: &Message,
        max_payload: usize,
    ) -> Result<Message, ClientError> {
        if self.in_flight {
            self.poison(PoisonReason::Transport);
        }
        if let ChannelState::Poisoned(reason) = self.state {
            return Err(ClientError::Unusable(reason));
        }
        let Some(stream) = self.stream.as_mut() else {
            return Err(ClientError::Unusable(PoisonReason::Transport));
        };

        self.in_flight = true;
        let result = transfer(stream, request, max_payload).await;
        self.in_flight = false;

        match result {
            Ok(reply) if reply.header.msg != request.header.msg => {
                self.poison(PoisonReason::Transport);
                Err(ClientError::UnexpectedReply {
                    expected: request.header.msg,
                    got: reply.header.msg,
                })
            }
            Ok(reply) => {
                if reply.header.msgid != request.header.msgid {
                    debug!(
                        sent = request.header.msgid,
                        echoed = reply.header.msgid,
                        "server did not echo msgid"
                    );
                }
                Ok(reply)
            }
            Err(e) => {
                self.poison(PoisonReason::Transport);
                Err(e)
            }
        }
    }
}

async fn transfer<S>(stream: &mut S, request: &Message, max_payload: usize) -> Result<Message, ClientError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    write_message(stream, request).await?;
    let reply = read_message(stream, max_payload)
        .await?
        .ok_or(ClientError::ConnectionClosed)?;
    trace!(
        msg = reply.header.msg,
        rc = reply.header.rc,
        data_len = reply.header.data_len,
        "reply received"
    );
    Ok(reply)
}

// ── ExchangeEngine ────────────────────────────────────────────────────────────

/// Owns one control stream and serialises every exchange on it.
pub struct ExchangeEngine<S = TcpStream> {
    channel: Mutex<Channel<S>>,
    tags: SequenceCounter,
    options: EngineOptions,
}

impl ExchangeEngine<TcpStream> {
    /// Wraps an open [`Connection`].
    pub fn from_connection(connection: Connection, options: EngineOptions) -> Self {
        Self::new(connection.into_stream(), options)
    }
}

impl<S> ExchangeEngine<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S, options: EngineOptions) -> Self {
        Self {
            channel: Mutex::new(Channel {
                stream: Some(stream),
                state: ChannelState::Fresh,
                in_flight: false,
            }),
            tags: SequenceCounter::new(),
            options,
        }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Sends one request and waits for its reply.
    ///
    /// The first call on a fresh engine performs the version handshake
    /// before sending `request`.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Busy`] if the lock is not acquired within the timeout.
    /// - [`ClientError::VersionMismatch`] if the handshake fails.
    /// - [`ClientError::ConnectionClosed`] / [`ClientError::Transport`] on
    ///   stream failure.
    /// - [`ClientError::UnexpectedReply`] if the reply answers another opcode.
    /// - [`ClientError::Unusable`] once the engine has been poisoned.
    ///
    /// A negative `rc` is *not* an error here; see the typed commands.
    pub async fn exchange(&self, request: Message) -> Result<Message, ClientError> {
        let mut channel = self.lock().await?;
        channel
            .ensure_ready(self.tags.next(), self.options.max_payload)
            .await?;
        channel.round_trip(&request, self.options.max_payload).await
    }

    /// Runs the version handshake now instead of on first use.
    ///
    /// # Errors
    ///
    /// Same as [`exchange`](Self::exchange) apart from `UnexpectedReply`
    /// for a caller request.
    pub async fn handshake(&self) -> Result<(), ClientError> {
        let mut channel = self.lock().await?;
        channel
            .ensure_ready(self.tags.next(), self.options.max_payload)
            .await
    }

    /// `true` until the engine is poisoned.  `None` if the channel is busy.
    pub fn is_usable(&self) -> Option<bool> {
        self.channel
            .try_lock()
            .ok()
            .map(|channel| !matches!(channel.state, ChannelState::Poisoned(_)))
    }

    async fn lock(&self) -> Result<MutexGuard<'_, Channel<S>>, ClientError> {
        tokio::time::timeout(self.options.lock_timeout, self.channel.lock())
            .await
            .map_err(|_| ClientError::Busy(self.options.lock_timeout))
    }
}

#[async_trait]
impl<S> Exchange for ExchangeEngine<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn exchange(&self, request: Message) -> Result<Message, ClientError> {
        ExchangeEngine::exchange(self, request).await
    }

    fn next_msgid(&self) -> u32 {
        self.tags.next()
    }
}

impl<S> std::fmt::Debug for ExchangeEngine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeEngine")
            .field("options", &self.options)
            .field("next_msgid", &self.tags.current())
            .finish_non_exhaustive()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
