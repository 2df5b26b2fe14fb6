//! Network infrastructure for the client.
//!
//! - `connection` – opens the TCP control stream.
//! - `exchange` – the single-flight engine that owns the stream, performs
//!   the version handshake, and pairs each request with its reply.
//! - `error` – [`ClientError`] and its coarse [`ErrorKind`].

pub mod connection;
pub mod error;
pub mod exchange;

pub use connection::Connection;
pub use error::{ClientError, ErrorKind, PoisonReason};
pub use exchange::{EngineOptions, Exchange, ExchangeEngine, DEFAULT_LOCK_TIMEOUT};
