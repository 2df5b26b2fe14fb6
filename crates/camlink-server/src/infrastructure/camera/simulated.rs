//! Software camera that synthesises frames.
//!
//! Frames are an 8-bit gradient that shifts with the frame sequence, so
//! successive acquisitions are distinguishable.  The simulated exposure is
//! honoured up to `frame_delay`, which keeps tests fast.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use camlink_core::protocol::messages::{CameraInfo, ExposureParms, FrameInfo};
use camlink_core::Frame;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Camera, CameraError};

/// Geometry and identity of the simulated sensor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulatedCameraConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_serial")]
    pub serial: String,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    /// Upper bound on the time one acquisition takes, in milliseconds.
    #[serde(default = "default_frame_delay_ms")]
    pub frame_delay_ms: u64,
}

fn default_model() -> String {
    "camlink-sim".to_string()
}
fn default_serial() -> String {
    "SIM-0001".to_string()
}
fn default_width() -> u32 {
    640
}
fn default_height() -> u32 {
    480
}
fn default_frame_delay_ms() -> u64 {
    5
}

impl Default for SimulatedCameraConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            serial: default_serial(),
            width: default_width(),
            height: default_height(),
            frame_delay_ms: default_frame_delay_ms(),
        }
    }
}

// Accepted parameter ranges.
const EXPOSURE_MS_RANGE: (f64, f64) = (0.01, 10_000.0);
const FPS_RANGE: (f64, f64) = (0.1, 200.0);
const MASTER_GAIN_RANGE: (f64, f64) = (1.0, 100.0);
const COLOR_GAIN_RANGE: (f64, f64) = (0.0, 10.0);

/// A [`Camera`] backed by generated images.
#[derive(Debug)]
pub struct SimulatedCamera {
    config: SimulatedCameraConfig,
    exposure: ExposureParms,
    sequence: u32,
    connected: bool,
    led: bool,
    video: bool,
}

impl SimulatedCamera {
    pub fn new(config: SimulatedCameraConfig) -> Self {
        Self {
            config,
            exposure: ExposureParms::default(),
            sequence: 0,
            connected: true,
            led: false,
            video: false,
        }
    }

    /// A camera that refuses every acquisition, as if unplugged.
    pub fn disconnected(config: SimulatedCameraConfig) -> Self {
        Self {
            connected: false,
            ..Self::new(config)
        }
    }

    /// Drops the camera off the bus; later calls fail with `NotReady`.
    pub fn unplug(&mut self) {
        self.connected = false;
    }

    pub fn led_on(&self) -> bool {
        self.led
    }

    fn render(&self, sequence: u32) -> Vec<u8> {
        let width = self.config.width as usize;
        let height = self.config.height as usize;
        let shift = sequence as usize;
        let mut pixels = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                pixels.push(((x + y + shift) & 0xFF) as u8);
            }
        }
        pixels
    }
}

impl Default for SimulatedCamera {
    fn default() -> Self {
        Self::new(SimulatedCameraConfig::default())
    }
}

#[async_trait]
impl Camera for SimulatedCamera {
    fn info(&self) -> CameraInfo {
        CameraInfo {
            model: self.config.model.clone(),
            serial: self.config.serial.clone(),
            sensor_width: self.config.width,
            sensor_height: self.config.height,
            bits_per_pixel: 8,
            pixel_pitch_um: 5.2,
        }
    }

    async fn acquire(&mut self) -> Result<Frame, CameraError> {
        if !self.connected {
            return Err(CameraError::NotReady);
        }

        let exposure = Duration::from_secs_f64(self.exposure.exposure_ms / 1000.0);
        let delay = exposure.min(Duration::from_millis(self.config.frame_delay_ms));
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.sequence = self.sequence.wrapping_add(1);
        let pixels = self.render(self.sequence);
        let saturated = pixels.iter().filter(|&&p| p == u8::MAX).count() as u32;
        let timestamp_us = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0);

        let info = FrameInfo {
            sequence: self.sequence,
            width: self.config.width,
            height: self.config.height,
            pitch: self.config.width,
            timestamp_us,
            exposure_ms: self.exposure.exposure_ms,
            saturated: [saturated, saturated, saturated],
        };
        debug!(sequence = self.sequence, "simulated frame acquired");
        Ok(Frame::new(info, pixels))
    }

    fn exposure(&self) -> ExposureParms {
        self.exposure
    }

    async fn set_exposure(&mut self, requested: ExposureParms) -> Result<ExposureParms, CameraError> {
        if !self.connected {
            return Err(CameraError::NotReady);
        }
        let fields = [
            ("exposure_ms", requested.exposure_ms),
            ("fps", requested.fps),
            ("master_gain", requested.master_gain),
            ("red_gain", requested.red_gain),
            ("green_gain", requested.green_gain),
            ("blue_gain", requested.blue_gain),
        ];
        if let Some((name, value)) = fields.iter().find(|(_, v)| !v.is_finite()) {
            return Err(CameraError::InvalidParameter(format!("{name} = {value}")));
        }
        let clamp = |value: f64, (lo, hi): (f64, f64)| value.clamp(lo, hi);
        self.exposure = ExposureParms {
            exposure_ms: clamp(requested.exposure_ms, EXPOSURE_MS_RANGE),
            fps: clamp(requested.fps, FPS_RANGE),
            master_gain: clamp(requested.master_gain, MASTER_GAIN_RANGE),
            red_gain: clamp(requested.red_gain, COLOR_GAIN_RANGE),
            green_gain: clamp(requested.green_gain, COLOR_GAIN_RANGE),
            blue_gain: clamp(requested.blue_gain, COLOR_GAIN_RANGE),
        };
        Ok(self.exposure)
    }

    async fn set_led(&mut self, on: bool) -> Result<(), CameraError> {
        if !self.connected {
            return Err(CameraError::NotReady);
        }
        self.led = on;
        Ok(())
    }

    async fn set_video(&mut self, enabled: bool) -> Result<(), CameraError> {
        if !self.connected {
            return Err(CameraError::NotReady);
        }
        self.video = enabled;
        Ok(())
    }

    fn video_enabled(&self) -> bool {
        self.video
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> SimulatedCameraConfig {
        SimulatedCameraConfig {
            width: 16,
            height: 8,
            frame_delay_ms: 0,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_acquire_produces_consistent_frame() {
        // Arrange
        let mut camera = SimulatedCamera::new(small());

        // Act
        let frame = camera.acquire().await.unwrap();

        // Assert
        assert_eq!(frame.info.sequence, 1);
        assert_eq!(frame.info.width, 16);
        assert_eq!(frame.info.pitch, 16);
        assert_eq!(frame.pixels.len(), frame.info.frame_bytes());
    }

    #[tokio::test]
    async fn test_successive_frames_differ() {
        let mut camera = SimulatedCamera::new(small());
        let a = camera.acquire().await.unwrap();
        let b = camera.acquire().await.unwrap();
        assert_eq!(b.info.sequence, 2);
        assert_ne!(a.pixels, b.pixels);
    }

    #[tokio::test]
    async fn test_disconnected_camera_is_not_ready() {
        let mut camera = SimulatedCamera::disconnected(small());
        assert!(matches!(camera.acquire().await, Err(CameraError::NotReady)));
        assert!(matches!(camera.set_led(true).await, Err(CameraError::NotReady)));
    }

    #[tokio::test]
    async fn test_set_exposure_clamps_to_supported_range() {
        let mut camera = SimulatedCamera::new(small());
        let requested = ExposureParms {
            exposure_ms: 0.0,
            fps: 1000.0,
            master_gain: 0.5,
            ..ExposureParms::default()
        };

        let applied = camera.set_exposure(requested).await.unwrap();

        assert_eq!(applied.exposure_ms, 0.01);
        assert_eq!(applied.fps, 200.0);
        assert_eq!(applied.master_gain, 1.0);
        assert_eq!(camera.exposure(), applied);
    }

    #[tokio::test]
    async fn test_set_exposure_rejects_non_finite_values() {
        let mut camera = SimulatedCamera::new(small());
        let before = camera.exposure();
        let requested = ExposureParms {
            fps: f64::NAN,
            ..ExposureParms::default()
        };

        let result = camera.set_exposure(requested).await;

        assert!(matches!(result, Err(CameraError::InvalidParameter(ref m)) if m.starts_with("fps")));
        assert_eq!(camera.exposure(), before);
    }

    #[tokio::test]
    async fn test_led_and_video_switches() {
        let mut camera = SimulatedCamera::new(small());
        camera.set_led(true).await.unwrap();
        camera.set_video(true).await.unwrap();
        assert!(camera.led_on());
        assert!(camera.video_enabled());
    }

    #[test]
    fn test_info_reports_geometry() {
        let camera = SimulatedCamera::new(small());
        let info = camera.info();
        assert_eq!(info.sensor_width, 16);
        assert_eq!(info.sensor_height, 8);
        assert_eq!(info.bits_per_pixel, 8);
    }
}
