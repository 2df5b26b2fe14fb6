//! Burst coordinator: drives one burst session from ARM_REQUEST to a
//! terminal state.
//!
//! Spawned by the BURST_ARM handler after [`BurstControl::begin_arm`]
//! succeeded.  Trigger waits are blocking calls and run on the blocking
//! pool in short slices; between slices the coordinator checks the abort
//! flag, so an abort is honoured within one poll interval.
//!
//! When the burst starts, live video is switched off and the ring is
//! emptied, so frames `0..valid` are exactly the frames of this burst.
//!
//! [`BurstControl::begin_arm`]: camlink_core::BurstControl::begin_arm

use std::sync::Arc;
use std::time::Instant;

use camlink_core::BurstState;
use tracing::{debug, error, info, warn};

use crate::application::context::ServerContext;
use crate::infrastructure::trigger::{TriggerError, TriggerSource, WaitOutcome};

/// Runs the session to completion and returns its terminal state.
///
/// Always unregisters the trigger and clears the session's active flag.
pub async fn run_burst(ctx: Arc<ServerContext>) -> BurstState {
    let trigger = Arc::clone(ctx.trigger());

    let target = coordinate(&ctx, &trigger).await;
    let state = ctx.burst().advance(target);

    trigger.unregister();
    ctx.burst().finish();

    info!(
        state = %state,
        frames = ctx.burst().frames_captured(),
        "burst finished"
    );
    state
}

async fn coordinate(ctx: &ServerContext, trigger: &Arc<dyn TriggerSource>) -> BurstState {
    let control = ctx.burst();
    let settings = ctx.settings().burst;

    if let Err(e) = trigger.register() {
        warn!("burst arm failed: {e}");
        return BurstState::Fail;
    }
    if control.advance(BurstState::Armed) != BurstState::Armed {
        return BurstState::Abort;
    }
    info!("burst armed");

    // ── ARMED: wait for the start event ─────────────────────────────────────
    loop {
        if control.abort_requested() {
            return BurstState::Abort;
        }
        let poll = settings.start_poll;
        match wait_blocking(trigger, move |t| t.wait_for_start(poll)).await {
            Some(WaitOutcome::Signaled) => break,
            Some(WaitOutcome::TimedOut) => continue,
            None => return BurstState::Fail,
        }
    }
    if control.advance(BurstState::Running) != BurstState::Running {
        return BurstState::Abort;
    }

    match ctx.lock_hardware().await {
        Ok(mut hardware) => {
            if hardware.camera.video_enabled() {
                info!("switching live video off for the burst");
                if let Err(e) = hardware.camera.set_video(false).await {
                    error!("live video could not be stopped: {e}");
                    return BurstState::Fail;
                }
            }
            hardware.ring.release();
        }
        Err(e) => {
            error!("burst could not reach the hardware: {e}");
            return BurstState::Fail;
        }
    }
    info!("burst running");

    // ── RUNNING: capture until the end event ────────────────────────────────
    let started = Instant::now();
    loop {
        if control.abort_requested() {
            return BurstState::Abort;
        }
        if started.elapsed() >= settings.ceiling {
            warn!(
                "burst hit the {:?} ceiling without an end event; completing",
                settings.ceiling
            );
            return BurstState::Complete;
        }

        let captured = match ctx.lock_hardware().await {
            Ok(mut hardware) => hardware.capture().await,
            Err(e) => Err(e),
        };
        match captured {
            Ok(info) => {
                let n = control.record_frame();
                debug!(sequence = info.sequence, n, "burst frame");
            }
            Err(e) => {
                error!("burst capture failed: {e}");
                return BurstState::Fail;
            }
        }

        let poll = settings.end_poll;
        match wait_blocking(trigger, move |t| t.wait_for_end(poll)).await {
            Some(WaitOutcome::Signaled) => return BurstState::Complete,
            Some(WaitOutcome::TimedOut) => continue,
            None => return BurstState::Fail,
        }
    }
}

/// Runs one trigger wait on the blocking pool.  `None` means the wait failed.
async fn wait_blocking<F>(trigger: &Arc<dyn TriggerSource>, wait: F) -> Option<WaitOutcome>
where
    F: FnOnce(&dyn TriggerSource) -> Result<WaitOutcome, TriggerError> + Send + 'static,
{
    let trigger = Arc::clone(trigger);
    match tokio::task::spawn_blocking(move || wait(trigger.as_ref())).await {
        Ok(Ok(outcome)) => Some(outcome),
        Ok(Err(e)) => {
            warn!("trigger wait failed: {e}");
            None
        }
        Err(e) => {
            error!("trigger wait task failed: {e}");
            None
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
