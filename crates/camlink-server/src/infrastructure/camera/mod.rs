//! Camera capability used by the dispatch handlers and the burst task.
//!
//! The vendor driver is not linked here.  Everything the protocol needs from
//! a camera goes through the [`Camera`] trait, so the server can run against
//! [`simulated::SimulatedCamera`] in tests and on machines without hardware.
//!
//! Implementations are owned by the server's `Hardware` record and are only
//! ever called while the hardware lock is held, so they need `Send` but not
//! `Sync`.

use std::time::Duration;

use async_trait::async_trait;
use camlink_core::protocol::messages::{CameraInfo, ExposureParms};
use camlink_core::Frame;
use thiserror::Error;

pub mod simulated;

/// Error type for camera operations.
#[derive(Debug, Error)]
pub enum CameraError {
    /// No camera is attached or it has not finished initialising.
    #[error("camera not ready")]
    NotReady,

    /// The camera did not deliver a frame within its deadline.
    #[error("camera timed out after {0:?}")]
    Timeout(Duration),

    /// A parameter could not be applied.
    #[error("invalid camera parameter: {0}")]
    InvalidParameter(String),
}

/// Narrow interface to the acquisition hardware.
#[async_trait]
pub trait Camera: Send {
    /// Static description of the attached camera.
    fn info(&self) -> CameraInfo;

    /// Captures one frame.  Must return within the camera's own timeout.
    async fn acquire(&mut self) -> Result<Frame, CameraError>;

    /// Exposure parameters currently in effect.
    fn exposure(&self) -> ExposureParms;

    /// Applies `requested` and returns the values the camera actually accepted.
    async fn set_exposure(&mut self, requested: ExposureParms) -> Result<ExposureParms, CameraError>;

    /// Switches the illumination LED.
    async fn set_led(&mut self, on: bool) -> Result<(), CameraError>;

    /// Starts or stops continuous (live video) acquisition.
    async fn set_video(&mut self, enabled: bool) -> Result<(), CameraError>;

    /// Whether continuous acquisition is running.
    fn video_enabled(&self) -> bool;
}
