//! Infrastructure layer for the camera server.
//!
//! Contains the OS- and device-facing adapters: the camera capability, the
//! burst trigger sources, the TCP listener, and configuration storage.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `camlink_core`; the `application` layer only sees it through the
//! `Camera` and `TriggerSource` traits and the session registry.

pub mod camera;
pub mod network;
pub mod storage;
pub mod trigger;
