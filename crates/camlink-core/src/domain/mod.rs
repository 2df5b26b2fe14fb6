//! Domain layer: pure acquisition state with no I/O.
//!
//! - **`frame_store`** – the ring buffer holding the last N acquired frames.
//!   The server owns exactly one and mutates it only while holding its
//!   single-flight hardware lock.
//!
//! - **`burst`** – the burst-session state machine.  Its state lives in
//!   atomics because it is the only state shared between the dispatch path
//!   and the background burst task.

pub mod burst;
pub mod frame_store;
