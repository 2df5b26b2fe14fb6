//! Application layer for the client.
//!
//! - **`camera_client`** – typed camera commands.  Each one is a single
//!   request/reply over the [`Exchange`](crate::infrastructure::network::Exchange)
//!   seam, so tests can drive it with a mock instead of a socket.

pub mod camera_client;
