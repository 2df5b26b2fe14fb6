//! Infrastructure layer for the client.
//!
//! - **`network`** – TCP connection to the camera server and the
//!   single-flight exchange engine that runs the protocol over it.
//! - **`storage`** – TOML configuration (server endpoint, lock timeout,
//!   log level).
//!
//! **Dependency rule**: this layer may depend on `camlink_core`, but the
//! `application` layer reaches it only through the
//! [`Exchange`](network::Exchange) seam.

pub mod network;
pub mod storage;
