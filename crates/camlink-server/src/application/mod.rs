//! Application layer for the camera server.
//!
//! - **`context`**  – Shared state: the single-flight dispatch lock, the
//!   hardware lock around the camera and frame ring, and the burst session.
//!
//! - **`dispatch`** – Maps each opcode to its handler and builds the reply.
//!
//! - **`burst`**    – The background task that drives one burst session
//!   through its states.
//!
//! - **`live`**     – The background task that records frames into the ring
//!   while live video is on.

pub mod burst;
pub mod context;
pub mod dispatch;
pub mod live;
