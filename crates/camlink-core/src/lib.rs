//! # camlink-core
//!
//! Shared library for the camlink remote camera control exchange, containing
//! the wire protocol codec, framed transport helpers, and the frame store
//! that acquisition commands manipulate.
//!
//! This crate is used by both the server and client applications.
//! It has no dependencies on OS APIs, camera drivers, or concrete sockets:
//! the transport helpers work over any `AsyncRead`/`AsyncWrite` pair.
//!
//! # Architecture overview
//!
//! A camera server owns the acquisition hardware.  Clients connect over TCP
//! and issue one request at a time; every request receives exactly one reply.
//!
//! - **`protocol`** – How bytes travel over the network.  Every message is a
//!   16-byte big-endian header (`msg`, `msgid`, `rc`, `data_len`) optionally
//!   followed by `data_len` payload bytes.  Structured payloads (camera info,
//!   frame info, exposure parameters, ring info) have fixed field layouts.
//!
//! - **`transport`** – Reads and writes whole messages from a byte stream and
//!   distinguishes an orderly peer close from a truncated message.
//!
//! - **`domain`** – Pure state with no I/O: the ring-buffer frame store that
//!   keeps the last N acquired frames, and the burst-session state machine.

pub mod domain;
pub mod protocol;
pub mod transport;

// Re-export the most-used types at the crate root so callers can write
// `camlink_core::FrameRing` instead of `camlink_core::domain::frame_store::FrameRing`.
pub use domain::burst::{BurstControl, BurstState};
pub use domain::frame_store::{Frame, FrameRing, FrameStoreError, RING_DEFAULT_SIZE, RING_MAX_SIZE};
pub use protocol::codec::{decode_header, encode_header, ProtocolError};
pub use protocol::messages::{Message, MessageHeader, Opcode, HEADER_SIZE, PROTOCOL_VERSION};
pub use transport::{read_message, write_message, TransportError};
