//! camlink-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does camlink-client do?
//!
//! It talks to a camlink camera server over the TCP control port:
//!
//! 1. [`Connection::connect`] opens the stream.
//! 2. [`ExchangeEngine`] owns it, runs the version handshake on first use,
//!    and lets exactly one request be in flight at a time.
//! 3. [`CameraClient`] turns opcodes into typed calls (`acquire_image`,
//!    `ring_frame`, `burst_arm`, ...) and negative return codes into
//!    [`ClientError::Rejected`].

/// Application layer: typed camera commands.
pub mod application;

/// Infrastructure layer: network engine and configuration.
pub mod infrastructure;

pub use application::camera_client::CameraClient;
pub use infrastructure::network::{
    ClientError, Connection, EngineOptions, ErrorKind, Exchange, ExchangeEngine,
};
