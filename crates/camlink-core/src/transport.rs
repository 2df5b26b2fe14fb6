//! Framed message transport over any async byte stream.
//!
//! A message is read in two steps: the fixed 16-byte header, then exactly
//! `data_len` payload bytes.  A stream that ends before the first header
//! byte is an orderly close and yields `Ok(None)`; a stream that ends
//! anywhere later is a truncated message and yields an error.

use std::io;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::protocol::codec::{decode_header, encode_header, ProtocolError};
use crate::protocol::messages::{Message, HEADER_SIZE};

/// Errors raised while moving messages across a stream.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The underlying stream failed.
    #[error("stream I/O error: {0}")]
    Io(#[from] io::Error),

    /// The peer closed the stream in the middle of a message.
    #[error("peer closed mid-message: got {received} of {expected} bytes")]
    Truncated { received: usize, expected: usize },

    /// The header declared an unacceptable payload.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl TransportError {
    /// `true` when the error means the peer is gone (closed, reset, or aborted).
    pub fn is_disconnect(&self) -> bool {
        match self {
            TransportError::Truncated { .. } => true,
            TransportError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            ),
            TransportError::Protocol(_) => false,
        }
    }
}

/// Reads one complete message.
///
/// Returns `Ok(None)` when the peer closed the stream cleanly between
/// messages.
///
/// # Errors
///
/// - [`TransportError::Truncated`] if the stream ends inside a header or payload.
/// - [`TransportError::Protocol`] with [`ProtocolError::PayloadTooLarge`] if
///   `data_len` exceeds `max_payload`; nothing is allocated in that case.
/// - [`TransportError::Io`] for any other stream failure.
pub async fn read_message<R>(
    reader: &mut R,
    max_payload: usize,
) -> Result<Option<Message>, TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut header_buf = [0u8; HEADER_SIZE];
    if read_full(reader, &mut header_buf).await? == 0 {
        return Ok(None);
    }
    let header = decode_header(&header_buf)?;

    let data_len = header.data_len as usize;
    if data_len > max_payload {
        return Err(ProtocolError::PayloadTooLarge {
            declared: data_len,
            limit: max_payload,
        }
        .into());
    }

    let mut payload = vec![0u8; data_len];
    if data_len > 0 {
        let got = read_full(reader, &mut payload).await?;
        if got != data_len {
            return Err(TransportError::Truncated {
                received: got,
                expected: data_len,
            });
        }
    }

    trace!(msg = header.msg, msgid = header.msgid, data_len, "message read");
    Ok(Some(Message { header, payload }))
}

/// Writes a header followed by its payload and flushes the stream.
///
/// The header is written as stored; callers build messages through the
/// [`Message`] constructors, which keep `data_len` consistent.
///
/// # Errors
///
/// Returns [`TransportError::Io`] if the stream rejects the write.
pub async fn write_message<W>(writer: &mut W, message: &Message) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&encode_header(&message.header)).await?;
    if !message.payload.is_empty() {
        writer.write_all(&message.payload).await?;
    }
    writer.flush().await?;
    trace!(
        msg = message.header.msg,
        msgid = message.header.msgid,
        data_len = message.header.data_len,
        "message written"
    );
    Ok(())
}

/// Fills `buf` completely, or reports how far it got.
///
/// Returns 0 if the stream was already at end-of-file, `buf.len()` on
/// success, and [`TransportError::Truncated`] for a partial fill.
async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> Result<usize, TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(0);
            }
            return Err(TransportError::Truncated {
                received: filled,
                expected: buf.len(),
            });
        }
        filled += n;
    }
    Ok(filled)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
