//! Shared server state.
//!
//! # Locks
//!
//! ```text
//! request ──▶ single-flight lock ──▶ handler ──▶ hardware lock ──▶ camera / ring
//! burst task ───────────────────────────────────▶ hardware lock ──▶ camera / ring
//! ```
//!
//! - The **single-flight lock** serialises request dispatch across every
//!   connection: at most one handler runs at a time.
//! - The **hardware lock** guards the camera and the frame ring.  Handlers
//!   take it only while they touch hardware, so the burst task can keep
//!   capturing while a handler waits on BURST_WAIT or BURST_ARM.
//!
//! Locks are always taken in that order and both waits are bounded by the
//! configured lock timeout.  The burst session itself lives in
//! [`BurstControl`] atomics and needs neither lock.  The live video task
//! takes only the hardware lock, once per frame.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use camlink_core::protocol::messages::FrameInfo;
use camlink_core::{BurstControl, BurstState, FrameRing, FrameStoreError, ProtocolError};
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::infrastructure::camera::{Camera, CameraError};
use crate::infrastructure::network::sessions::SessionRegistry;
use crate::infrastructure::storage::config::ServerConfig;
use crate::infrastructure::trigger::{TriggerError, TriggerSource};

/// Error type for server operations.  Inside dispatch every variant
/// degrades to `rc = -1`.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("timed out after {0:?} waiting for the {1} lock")]
    LockTimeout(Duration, &'static str),

    #[error("a burst session is active")]
    BurstActive,

    #[error("burst did not arm (state {0})")]
    BurstNotArmed(BurstState),

    #[error("request payload missing or malformed")]
    BadArgument,

    #[error("failed to bind control listener on {addr}: {source}")]
    BindFailed {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Camera(#[from] CameraError),

    #[error(transparent)]
    FrameStore(#[from] FrameStoreError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Trigger(#[from] TriggerError),
}

/// Burst coordinator timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BurstSettings {
    /// Slice length while ARMED and waiting for the start event.
    pub start_poll: Duration,
    /// Wait for the end event between captured frames.
    pub end_poll: Duration,
    /// Longest a RUNNING burst may last.
    pub ceiling: Duration,
    /// How long BURST_ARM waits for the coordinator to leave ARM_REQUEST.
    pub arm_wait: Duration,
}

impl Default for BurstSettings {
    fn default() -> Self {
        Self {
            start_poll: Duration::from_millis(250),
            end_poll: Duration::from_millis(1),
            ceiling: Duration::from_secs(10),
            arm_wait: Duration::from_secs(1),
        }
    }
}

/// Runtime settings for dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerSettings {
    pub lock_timeout: Duration,
    pub max_payload: usize,
    pub burst: BurstSettings,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(30),
            max_payload: camlink_core::protocol::messages::MAX_PAYLOAD_BYTES,
            burst: BurstSettings::default(),
        }
    }
}

impl From<&ServerConfig> for ServerSettings {
    fn from(config: &ServerConfig) -> Self {
        Self {
            lock_timeout: config.server.lock_timeout(),
            max_payload: config.network.max_payload_bytes,
            burst: BurstSettings {
                start_poll: Duration::from_millis(config.burst.start_poll_ms),
                end_poll: Duration::from_millis(config.burst.end_poll_ms),
                ceiling: Duration::from_secs(config.burst.ceiling_secs),
                arm_wait: Duration::from_millis(config.burst.arm_wait_ms),
            },
        }
    }
}

// ── Hardware ──────────────────────────────────────────────────────────────────

/// Slack allowed on top of the exposure time before an acquisition is
/// declared stuck.
pub const ACQUIRE_MARGIN: Duration = Duration::from_secs(2);

/// The camera and the frame ring, mutated only under the hardware lock.
pub struct Hardware {
    pub camera: Box<dyn Camera>,
    pub ring: FrameRing,
    acquire_margin: Duration,
}

impl Hardware {
    pub fn new(camera: Box<dyn Camera>, ring: FrameRing) -> Self {
        Self {
            camera,
            ring,
            acquire_margin: ACQUIRE_MARGIN,
        }
    }

    /// Replaces [`ACQUIRE_MARGIN`].
    pub fn with_acquire_margin(mut self, margin: Duration) -> Self {
        self.acquire_margin = margin;
        self
    }

    /// Acquires one frame and records it in the ring.
    ///
    /// The acquisition may take the current exposure time plus the acquire
    /// margin; past that it is abandoned with [`CameraError::Timeout`].
    ///
    /// # Errors
    ///
    /// Propagates camera failures and frames whose pixel buffer does not
    /// match their metadata.  The ring is unchanged on error.
    pub async fn capture(&mut self) -> Result<FrameInfo, ServerError> {
        let deadline = self.acquire_deadline();
        let frame = tokio::time::timeout(deadline, self.camera.acquire())
            .await
            .map_err(|_| CameraError::Timeout(deadline))??;
        let info = frame.info;
        let slot = self.ring.record_frame(frame)?;
        debug!(sequence = info.sequence, slot, "frame recorded");
        Ok(info)
    }

    fn acquire_deadline(&self) -> Duration {
        let exposure_ms = self.camera.exposure().exposure_ms;
        let exposure = if exposure_ms.is_finite() && exposure_ms > 0.0 {
            Duration::from_secs_f64(exposure_ms / 1000.0)
        } else {
            Duration::ZERO
        };
        exposure + self.acquire_margin
    }

    /// Reallocates the ring, pausing live video for the duration.
    ///
    /// Returns the capacity actually applied.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Camera`] if live video cannot be stopped.  A
    /// failure to restart it is logged; the resize has already happened.
    pub async fn resize_ring(&mut self, requested: usize) -> Result<usize, ServerError> {
        let was_live = self.camera.video_enabled();
        if was_live {
            self.camera.set_video(false).await?;
        }

        let size = self.ring.resize(requested);

        if was_live {
            if let Err(e) = self.camera.set_video(true).await {
                warn!("live video not restored after ring resize: {e}");
            }
        }
        Ok(size)
    }
}

impl std::fmt::Debug for Hardware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hardware")
            .field("camera", &self.camera.info().model)
            .field("ring", &self.ring.info())
            .finish()
    }
}

// ── ServerContext ─────────────────────────────────────────────────────────────

/// Everything a connection task or the burst task needs, shared by `Arc`.
pub struct ServerContext {
    dispatch_lock: Mutex<()>,
    hardware: Mutex<Hardware>,
    burst: BurstControl,
    trigger: Arc<dyn TriggerSource>,
    sessions: SessionRegistry,
    settings: ServerSettings,
    live: AtomicBool,
}

impl ServerContext {
    pub fn new(
        hardware: Hardware,
        trigger: Arc<dyn TriggerSource>,
        settings: ServerSettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            dispatch_lock: Mutex::new(()),
            hardware: Mutex::new(hardware),
            burst: BurstControl::new(),
            trigger,
            sessions: SessionRegistry::new(),
            settings,
            live: AtomicBool::new(false),
        })
    }

    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }

    pub fn burst(&self) -> &BurstControl {
        &self.burst
    }

    pub fn trigger(&self) -> &Arc<dyn TriggerSource> {
        &self.trigger
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Claims the live capture slot.  `false` if a live task already runs.
    pub fn claim_live(&self) -> bool {
        self.live
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn release_live(&self) {
        self.live.store(false, Ordering::Release);
    }

    /// Whether a live capture task is running.
    pub fn live_active(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    /// Waits for the single-flight dispatch lock.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::LockTimeout`] after the configured lock timeout.
    pub async fn lock_dispatch(&self) -> Result<MutexGuard<'_, ()>, ServerError> {
        tokio::time::timeout(self.settings.lock_timeout, self.dispatch_lock.lock())
            .await
            .map_err(|_| ServerError::LockTimeout(self.settings.lock_timeout, "dispatch"))
    }

    /// Waits for the hardware lock.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::LockTimeout`] after the configured lock timeout.
    pub async fn lock_hardware(&self) -> Result<MutexGuard<'_, Hardware>, ServerError> {
        tokio::time::timeout(self.settings.lock_timeout, self.hardware.lock())
            .await
            .map_err(|_| ServerError::LockTimeout(self.settings.lock_timeout, "hardware"))
    }
}

impl std::fmt::Debug for ServerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerContext")
            .field("burst_state", &self.burst.state())
            .field("live", &self.live_active())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
