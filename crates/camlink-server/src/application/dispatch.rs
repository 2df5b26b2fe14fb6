//! Request dispatch: turns one request into exactly one reply.
//!
//! This is the heart of the server.  Every connection task hands each
//! decoded request to [`dispatch`], which takes the single-flight lock,
//! looks the opcode up, runs its handler, and returns the reply for the
//! connection task to write back.  Because the lock is shared by all
//! connections, a client never sees the effects of two commands
//! interleaved, even when several clients drive the same camera.
//!
//! # Reply rules
//!
//! Every reply echoes the request's `msg` and `msgid` and starts out as
//! `rc = 0` with no payload.  Handlers set `rc` (a version, a size, a
//! count, a burst state) and an optional payload record.  Any handler
//! error, an unknown opcode, or a lock timeout degrades the reply to
//! `rc = -1` with no payload.  Nothing a handler does closes the
//! connection; only SERVER_END and transport faults do that, in the
//! listener.
//!
//! # Architecture
//!
//! ```text
//! dispatch(request)
//!  ├─ lock_dispatch()            single-flight, bounded by lock_timeout
//!  ├─ Opcode::try_from(msg)      unknown ─▶ rc = -1
//!  └─ handle(opcode)
//!       ├─ hardware commands     lock_hardware() ─▶ camera / ring
//!       ├─ BURST_ARM             spawn run_burst, wait for ARMED (≤ arm_wait)
//!       ├─ BURST_WAIT            poll BurstControl, never holds hardware
//!       └─ VIDEO_ENABLE          switch camera, start the live task
//! ```
//!
//! Handlers that only read or steer the burst session touch
//! [`BurstControl`](camlink_core::BurstControl) atomics and never take the
//! hardware lock, so a BURST_WAIT that holds the dispatch lock for up to a
//! second does not stall the burst task's captures.

use std::sync::Arc;
use std::time::{Duration, Instant};

use camlink_core::protocol::codec::{decode_argument, Record};
use camlink_core::protocol::messages::{ExposureParms, RC_FAILED};
use camlink_core::{BurstState, Message, Opcode, PROTOCOL_VERSION};
use tracing::{debug, info, warn};

use crate::application::burst::run_burst;
use crate::application::context::{ServerContext, ServerError};
use crate::application::live::start_live_capture;

/// Longest a single BURST_WAIT may block, whatever the client asked for.
pub const BURST_WAIT_CAP: Duration = Duration::from_millis(1000);

/// Poll slice used by BURST_WAIT.
const BURST_WAIT_SLICE: Duration = Duration::from_millis(100);

/// Poll slice used while BURST_ARM waits for the coordinator.
const ARM_POLL_SLICE: Duration = Duration::from_millis(5);

/// Handles one request under the single-flight lock and builds its reply.
pub async fn dispatch(ctx: &Arc<ServerContext>, request: &Message) -> Message {
    let mut reply = Message::reply_to(&request.header);

    let _flight = match ctx.lock_dispatch().await {
        Ok(guard) => guard,
        Err(e) => {
            warn!(msg = request.header.msg, "request skipped: {e}");
            reply.fail(RC_FAILED);
            return reply;
        }
    };

    let opcode = match Opcode::try_from(request.header.msg) {
        Ok(opcode) => opcode,
        Err(e) => {
            warn!(msgid = request.header.msgid, "request rejected: {e}");
            reply.fail(RC_FAILED);
            return reply;
        }
    };

    if let Err(e) = handle(ctx, opcode, &request.payload, &mut reply).await {
        debug!(?opcode, "request failed: {e}");
        reply.fail(RC_FAILED);
    }
    reply
}

async fn handle(
    ctx: &Arc<ServerContext>,
    opcode: Opcode,
    payload: &[u8],
    reply: &mut Message,
) -> Result<(), ServerError> {
    match opcode {
        Opcode::ServerEnd => {}

        Opcode::QueryVersion => reply.header.rc = PROTOCOL_VERSION as i32,

        Opcode::GetCameraInfo => {
            let hardware = ctx.lock_hardware().await?;
            reply.set_payload(hardware.camera.info().to_payload());
        }

        Opcode::AcquireImage => {
            ensure_no_burst(ctx)?;
            ctx.lock_hardware().await?.capture().await?;
        }

        Opcode::GetImageInfo => {
            let hardware = ctx.lock_hardware().await?;
            let frame = hardware.ring.current()?;
            reply.set_payload(frame.info.to_payload());
        }

        Opcode::GetImageData => {
            let hardware = ctx.lock_hardware().await?;
            let frame = hardware.ring.current()?;
            reply.set_payload(frame.pixels.clone());
        }

        Opcode::GetExposureParms => {
            let hardware = ctx.lock_hardware().await?;
            reply.set_payload(hardware.camera.exposure().to_payload());
        }

        Opcode::SetExposureParms => {
            let requested = ExposureParms::from_payload(payload)?;
            let applied = ctx
                .lock_hardware()
                .await?
                .camera
                .set_exposure(requested)
                .await?;
            reply.set_payload(applied.to_payload());
        }

        Opcode::RingGetInfo => {
            let hardware = ctx.lock_hardware().await?;
            reply.set_payload(hardware.ring.info().to_payload());
        }

        Opcode::RingGetSize => {
            reply.header.rc = ctx.lock_hardware().await?.ring.size() as i32;
        }

        Opcode::RingSetSize => {
            let requested = argument(payload)?;
            ensure_no_burst(ctx)?;
            let size = ctx
                .lock_hardware()
                .await?
                .resize_ring(requested as usize)
                .await?;
            info!(requested, size, "ring resized");
            reply.header.rc = size as i32;
        }

        Opcode::RingGetFrameCnt => {
            reply.header.rc = ctx.lock_hardware().await?.ring.valid() as i32;
        }

        Opcode::RingImageNData => {
            let index = argument(payload)?;
            let hardware = ctx.lock_hardware().await?;
            let frame = hardware.ring.get(index as usize)?;
            let mut data = frame.info.to_payload();
            data.extend_from_slice(&frame.pixels);
            reply.set_payload(data);
        }

        Opcode::BurstArm => arm_burst(ctx).await?,

        Opcode::BurstAbort => {
            if ctx.burst().is_active() {
                ctx.burst().request_abort();
                info!("burst abort requested");
            }
        }

        Opcode::BurstStatus => reply.header.rc = ctx.burst().acknowledge().code(),

        Opcode::BurstWait => {
            let ms = argument(payload)?;
            let still_active = wait_for_burst(ctx, Duration::from_millis(u64::from(ms))).await;
            reply.header.rc = i32::from(still_active);
        }

        Opcode::LedSetState => {
            let on = argument(payload)? != 0;
            ctx.lock_hardware().await?.camera.set_led(on).await?;
        }

        Opcode::VideoEnable => {
            let enabled = argument(payload)? != 0;
            ctx.lock_hardware().await?.camera.set_video(enabled).await?;
            if enabled && start_live_capture(ctx) {
                debug!("live capture task spawned");
            }
        }
    }
    Ok(())
}

fn argument(payload: &[u8]) -> Result<u32, ServerError> {
    decode_argument(payload).map_err(|_| ServerError::BadArgument)
}

fn ensure_no_burst(ctx: &ServerContext) -> Result<(), ServerError> {
    if ctx.burst().is_active() {
        Err(ServerError::BurstActive)
    } else {
        Ok(())
    }
}

/// Starts a burst session and waits (bounded) for it to arm.
async fn arm_burst(ctx: &Arc<ServerContext>) -> Result<(), ServerError> {
    let control = ctx.burst();
    if !control.begin_arm() {
        return Err(ServerError::BurstActive);
    }
    tokio::spawn(run_burst(Arc::clone(ctx)));

    let deadline = Instant::now() + ctx.settings().burst.arm_wait;
    let state = loop {
        let state = control.state();
        if state != BurstState::ArmRequest || Instant::now() >= deadline {
            break state;
        }
        tokio::time::sleep(ARM_POLL_SLICE).await;
    };

    match state {
        BurstState::Armed | BurstState::Running | BurstState::Complete => Ok(()),
        BurstState::ArmRequest => {
            control.request_abort();
            Err(ServerError::BurstNotArmed(state))
        }
        other => Err(ServerError::BurstNotArmed(other)),
    }
}

/// Polls until the session is no longer active or `requested` (capped) has
/// elapsed.  Returns `true` if it is still active.
async fn wait_for_burst(ctx: &ServerContext, requested: Duration) -> bool {
    let limit = requested.min(BURST_WAIT_CAP);
    let started = Instant::now();
    while ctx.burst().is_active() {
        let elapsed = started.elapsed();
        if elapsed >= limit {
            return true;
        }
        tokio::time::sleep(BURST_WAIT_SLICE.min(limit - elapsed)).await;
    }
    false
}

// ── Tests ─────────────────────────────────────────────────────────────────────
