//! Network infrastructure for the camera server.
//!
//! # Sub-modules
//!
//! - **`listener`** – Binds the TCP control port, accepts clients, and runs
//!   the read → dispatch → reply loop for each connection on its own task.
//!
//! - **`sessions`** – Registry of open connections (id, peer, connect time,
//!   requests served) used for logging.

pub mod listener;
pub mod sessions;
