//! Live video capture.
//!
//! While the camera's continuous mode is on, one background task records a
//! frame into the ring every frame period (`1 / fps` of the current
//! exposure settings), taking the hardware lock for each frame:
//!
//! ```text
//! VIDEO_ENABLE(1) ──▶ start_live_capture ──▶ run_live
//!                                              loop:
//!                                                lock hardware
//!                                                video off? ─▶ stop
//!                                                capture ─▶ ring
//!                                                sleep one frame period
//! ```
//!
//! The task notices VIDEO_ENABLE(0) on its next frame and exits.  It gives
//! up its claim while still holding the hardware lock, so a VIDEO_ENABLE(1)
//! that races with the shutdown either keeps the old task alive or starts a
//! new one, never neither.  A running burst switches video off before it
//! takes over the ring.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use crate::application::context::ServerContext;

/// Shortest interval between live frames, whatever the frame rate says.
pub const LIVE_MIN_PERIOD: Duration = Duration::from_millis(5);

/// Period used when the frame rate is not a usable number.
const LIVE_FALLBACK_PERIOD: Duration = Duration::from_millis(100);

/// Starts the live capture task unless one is already running.
///
/// Returns `true` if a new task was spawned.
pub fn start_live_capture(ctx: &Arc<ServerContext>) -> bool {
    if !ctx.claim_live() {
        return false;
    }
    tokio::spawn(run_live(Arc::clone(ctx)));
    true
}

/// Records frames until live video is switched off or the camera fails.
///
/// Returns the number of frames recorded.  The caller must have claimed
/// the live slot with [`ServerContext::claim_live`].
pub async fn run_live(ctx: Arc<ServerContext>) -> u64 {
    info!("live capture started");
    let mut recorded = 0u64;

    loop {
        let period = match ctx.lock_hardware().await {
            Ok(mut hardware) => {
                if !hardware.camera.video_enabled() {
                    ctx.release_live();
                    break;
                }
                match hardware.capture().await {
                    Ok(info) => {
                        recorded += 1;
                        trace!(sequence = info.sequence, "live frame");
                    }
                    Err(e) => {
                        warn!("live capture failed, switching video off: {e}");
                        if let Err(e) = hardware.camera.set_video(false).await {
                            debug!("video could not be switched off: {e}");
                        }
                        ctx.release_live();
                        break;
                    }
                }
                frame_period(hardware.camera.exposure().fps)
            }
            Err(e) => {
                debug!("live frame skipped: {e}");
                LIVE_FALLBACK_PERIOD
            }
        };
        tokio::time::sleep(period).await;
    }

    info!(recorded, "live capture stopped");
    recorded
}

fn frame_period(fps: f64) -> Duration {
    if fps.is_finite() && fps > 0.0 {
        Duration::from_secs_f64(1.0 / fps).max(LIVE_MIN_PERIOD)
    } else {
        LIVE_FALLBACK_PERIOD
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    use camlink_core::protocol::messages::ExposureParms;
    use camlink_core::FrameRing;

    use crate::application::context::{Hardware, ServerSettings};
    use crate::infrastructure::camera::simulated::{SimulatedCamera, SimulatedCameraConfig};
    use crate::infrastructure::camera::Camera;
    use crate::infrastructure::trigger::DisabledTrigger;

    fn context(camera: SimulatedCamera) -> Arc<ServerContext> {
        ServerContext::new(
            Hardware::new(Box::new(camera), FrameRing::new(20)),
            Arc::new(DisabledTrigger),
            ServerSettings::default(),
        )
    }

    fn fast_camera() -> SimulatedCamera {
        SimulatedCamera::new(SimulatedCameraConfig {
            width: 8,
            height: 4,
            frame_delay_ms: 1,
            ..Default::default()
        })
    }

    async fn enable_fast_video(ctx: &Arc<ServerContext>) {
        let mut hardware = ctx.lock_hardware().await.unwrap();
        hardware
            .camera
            .set_exposure(ExposureParms {
                exposure_ms: 1.0,
                fps: 200.0,
                ..ExposureParms::default()
            })
            .await
            .unwrap();
        hardware.camera.set_video(true).await.unwrap();
    }

    #[test]
    fn test_frame_period_follows_fps_with_floor() {
        assert_eq!(frame_period(20.0), Duration::from_millis(50));
        assert_eq!(frame_period(1000.0), LIVE_MIN_PERIOD);
        assert_eq!(frame_period(0.0), LIVE_FALLBACK_PERIOD);
        assert_eq!(frame_period(f64::NAN), LIVE_FALLBACK_PERIOD);
    }

    #[tokio::test]
    async fn test_live_video_records_frames_until_switched_off() {
        // Arrange
        let ctx = context(fast_camera());
        enable_fast_video(&ctx).await;

        // Act
        assert!(start_live_capture(&ctx));
        while ctx.lock_hardware().await.unwrap().ring.valid() < 3 {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        ctx.lock_hardware().await.unwrap().camera.set_video(false).await.unwrap();
        for _ in 0..200 {
            if !ctx.live_active() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let settled = ctx.lock_hardware().await.unwrap().ring.valid();
        tokio::time::sleep(Duration::from_millis(30)).await;

        // Assert – no frames after the task stopped
        assert!(!ctx.live_active());
        assert!(settled >= 3);
        assert_eq!(ctx.lock_hardware().await.unwrap().ring.valid(), settled);
    }

    #[tokio::test]
    async fn test_only_one_live_task_runs() {
        let ctx = context(fast_camera());
        enable_fast_video(&ctx).await;

        let first = start_live_capture(&ctx);
        let second = start_live_capture(&ctx);

        assert!(first);
        assert!(!second);
        assert!(ctx.live_active());
    }

    #[tokio::test]
    async fn test_live_task_exits_at_once_when_video_is_off() {
        // Arrange – claim the slot but never switch video on
        let ctx = context(fast_camera());
        assert!(ctx.claim_live());

        // Act
        let recorded = run_live(Arc::clone(&ctx)).await;

        // Assert
        assert_eq!(recorded, 0);
        assert!(!ctx.live_active());
    }

    #[tokio::test]
    async fn test_camera_failure_ends_live_capture() {
        // Arrange – video is on, then the camera drops off the bus
        let mut camera = fast_camera();
        camera.set_video(true).await.unwrap();
        camera.unplug();
        let ctx = context(camera);
        assert!(ctx.claim_live());

        // Act
        let recorded = run_live(Arc::clone(&ctx)).await;

        // Assert
        assert_eq!(recorded, 0);
        assert!(!ctx.live_active());
        assert_eq!(ctx.lock_hardware().await.unwrap().ring.valid(), 0);
    }
}
