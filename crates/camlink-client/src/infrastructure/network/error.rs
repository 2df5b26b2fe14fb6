//! Client error taxonomy.
//!
//! Every failure a caller can see is a [`ClientError`].  Callers that only
//! need to decide *what to do next* (retry later, reconnect, give up, report
//! to the user) should match on [`ClientError::kind`] instead of on the
//! individual variants.

use std::time::Duration;

use camlink_core::{Opcode, ProtocolError, TransportError};
use thiserror::Error;

/// Coarse classification of a [`ClientError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The connection could not be opened, broke, or was already broken.
    Transport,
    /// Another exchange held the single-flight lock for the whole timeout.
    Busy,
    /// The server sent something this client cannot interpret.
    Protocol,
    /// The server speaks a different protocol version.
    Version,
    /// The server understood the request and refused it (`rc < 0`).
    Application,
}

/// Why an engine stopped accepting requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoisonReason {
    /// The stream failed or desynchronised mid-exchange.
    Transport,
    /// The version handshake failed.
    VersionMismatch,
}

impl std::fmt::Display for PoisonReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoisonReason::Transport => f.write_str("an earlier transport failure"),
            PoisonReason::VersionMismatch => f.write_str("a protocol version mismatch"),
        }
    }
}

/// Errors returned by the connection, the exchange engine and typed commands.
#[derive(Debug, Error)]
pub enum ClientError {
    /// TCP connection to the server failed.
    #[error("failed to connect to {addr}: {source}")]
    ConnectFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The server closed the connection before a full reply arrived.
    #[error("connection closed by server")]
    ConnectionClosed,

    /// Reading or writing the stream failed.
    #[error("transport failure: {0}")]
    Transport(#[source] TransportError),

    /// The single-flight lock was not acquired in time.
    #[error("exchange lock not acquired within {0:?}")]
    Busy(Duration),

    /// The reply answers a different opcode than the request.
    #[error("reply opcode {got} does not match request opcode {expected}")]
    UnexpectedReply { expected: u32, got: u32 },

    /// A reply payload could not be decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The handshake reported a different protocol version.
    #[error("server protocol version {server}, client requires {client}")]
    VersionMismatch { server: i32, client: u32 },

    /// The engine was poisoned by an earlier failure.
    #[error("connection unusable after {0}")]
    Unusable(PoisonReason),

    /// The server answered with a negative return code.
    #[error("{opcode:?} rejected by server (rc {rc})")]
    Rejected { opcode: Opcode, rc: i32 },
}

impl ClientError {
    /// Classifies the error for callers deciding how to react.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::ConnectFailed { .. }
            | ClientError::ConnectionClosed
            | ClientError::Transport(_)
            | ClientError::Unusable(PoisonReason::Transport) => ErrorKind::Transport,
            ClientError::Busy(_) => ErrorKind::Busy,
            ClientError::UnexpectedReply { .. } | ClientError::Protocol(_) => ErrorKind::Protocol,
            ClientError::VersionMismatch { .. }
            | ClientError::Unusable(PoisonReason::VersionMismatch) => ErrorKind::Version,
            ClientError::Rejected { .. } => ErrorKind::Application,
        }
    }
}

impl From<TransportError> for ClientError {
    fn from(e: TransportError) -> Self {
        if e.is_disconnect() {
            ClientError::ConnectionClosed
        } else {
            ClientError::Transport(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_is_application_error() {
        let err = ClientError::Rejected {
            opcode: Opcode::RingImageNData,
            rc: -1,
        };
        assert_eq!(err.kind(), ErrorKind::Application);
    }

    #[test]
    fn test_unusable_keeps_the_original_classification() {
        assert_eq!(
            ClientError::Unusable(PoisonReason::VersionMismatch).kind(),
            ErrorKind::Version
        );
        assert_eq!(
            ClientError::Unusable(PoisonReason::Transport).kind(),
            ErrorKind::Transport
        );
    }

    #[test]
    fn test_truncated_reply_maps_to_connection_closed() {
        // Arrange
        let truncated = TransportError::Truncated {
            received: 3,
            expected: 16,
        };

        // Act
        let err = ClientError::from(truncated);

        // Assert
        assert!(matches!(err, ClientError::ConnectionClosed));
        assert_eq!(err.kind(), ErrorKind::Transport);
    }

    #[test]
    fn test_busy_and_protocol_are_distinct_kinds() {
        assert_eq!(ClientError::Busy(Duration::from_secs(1)).kind(), ErrorKind::Busy);
        assert_eq!(
            ClientError::UnexpectedReply { expected: 1, got: 2 }.kind(),
            ErrorKind::Protocol
        );
    }
}
