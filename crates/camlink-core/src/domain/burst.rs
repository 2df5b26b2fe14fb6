//! Burst-session state machine.
//!
//! ```text
//! INIT ──arm──▶ ARM_REQUEST ──registered──▶ ARMED ──start──▶ RUNNING
//!                   │                          │                │
//!                   └──fail──▶ FAIL            ├──abort──▶ ABORT ◀──abort
//!                                              └──fail───▶ FAIL  ◀──fail
//!                                                         COMPLETE ◀──end
//! ```
//!
//! A terminal state (`COMPLETE`, `ABORT`, `FAIL`) stays visible until a
//! status query acknowledges it, which returns the session to `INIT`.
//!
//! [`BurstControl`] is the only state shared between the request dispatch
//! path and the background burst task, so every field is an atomic.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

/// Lifecycle state of the single burst session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum BurstState {
    #[default]
    Init = 0,
    ArmRequest = 1,
    Armed = 2,
    Running = 3,
    Complete = 4,
    Abort = 5,
    Fail = 6,
}

impl BurstState {
    /// `true` for the states that end a session.
    pub fn is_terminal(self) -> bool {
        matches!(self, BurstState::Complete | BurstState::Abort | BurstState::Fail)
    }

    /// Whether the coordinator may move from `self` to `next`.
    pub fn can_transition_to(self, next: BurstState) -> bool {
        use BurstState::*;
        match (self, next) {
            (Init, ArmRequest) => true,
            (ArmRequest, Armed | Fail | Abort) => true,
            (Armed, Running | Abort | Fail) => true,
            (Running, Complete | Abort | Fail) => true,
            (from, Init) => from.is_terminal(),
            _ => false,
        }
    }

    /// Status code reported in the reply `rc`.
    pub fn code(self) -> i32 {
        self as u8 as i32
    }
}

impl TryFrom<u8> for BurstState {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => BurstState::Init,
            1 => BurstState::ArmRequest,
            2 => BurstState::Armed,
            3 => BurstState::Running,
            4 => BurstState::Complete,
            5 => BurstState::Abort,
            6 => BurstState::Fail,
            other => return Err(other),
        })
    }
}

impl TryFrom<i32> for BurstState {
    type Error = i32;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .ok()
            .and_then(|v| BurstState::try_from(v).ok())
            .ok_or(value)
    }
}

impl std::fmt::Display for BurstState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BurstState::Init => "INIT",
            BurstState::ArmRequest => "ARM_REQUEST",
            BurstState::Armed => "ARMED",
            BurstState::Running => "RUNNING",
            BurstState::Complete => "COMPLETE",
            BurstState::Abort => "ABORT",
            BurstState::Fail => "FAIL",
        };
        f.write_str(name)
    }
}

/// Shared, lock-free burst session record.
///
/// - `active` is set from a successful [`begin_arm`](Self::begin_arm) until
///   the coordinator calls [`finish`](Self::finish).
/// - `abort` is a cooperative request; the coordinator polls it.
#[derive(Debug, Default)]
pub struct BurstControl {
    state: AtomicU8,
    active: AtomicBool,
    abort: AtomicBool,
    frames: AtomicU32,
}

impl BurstControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> BurstState {
        // Only valid discriminants are ever stored.
        BurstState::try_from(self.state.load(Ordering::Acquire)).unwrap_or(BurstState::Fail)
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Claims the session for a new burst.
    ///
    /// Returns `false` without touching anything if a session is already
    /// active.  On success the counters and abort flag are cleared and the
    /// state is `ARM_REQUEST`.
    pub fn begin_arm(&self) -> bool {
        if self
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        self.abort.store(false, Ordering::Release);
        self.frames.store(0, Ordering::Release);
        self.state.store(BurstState::ArmRequest as u8, Ordering::Release);
        true
    }

    /// Moves to `next` if the transition is legal from the current state.
    ///
    /// Returns the state actually in effect afterwards.
    pub fn advance(&self, next: BurstState) -> BurstState {
        let mut current = self.state();
        loop {
            if !current.can_transition_to(next) {
                return current;
            }
            match self.state.compare_exchange(
                current as u8,
                next as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return next,
                Err(actual) => {
                    current = BurstState::try_from(actual).unwrap_or(BurstState::Fail);
                }
            }
        }
    }

    /// Asks the coordinator to stop at its next poll.
    pub fn request_abort(&self) {
        self.abort.store(true, Ordering::Release);
    }

    pub fn abort_requested(&self) -> bool {
        self.abort.load(Ordering::Acquire)
    }

    /// Counts one captured frame and returns the new total.
    pub fn record_frame(&self) -> u32 {
        self.frames.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn frames_captured(&self) -> u32 {
        self.frames.load(Ordering::Acquire)
    }

    /// Marks the coordinator as gone.  The terminal state stays visible.
    pub fn finish(&self) {
        self.active.store(false, Ordering::Release);
    }

    /// Reads the state for a status query.
    ///
    /// A terminal state is returned once and the session goes back to
    /// `INIT`, provided the coordinator has already finished.
    pub fn acknowledge(&self) -> BurstState {
        let state = self.state();
        if state.is_terminal() && !self.is_active() {
            self.advance(BurstState::Init);
        }
        state
    }

    /// Forces the session back to `INIT`, e.g. before a new arm.
    pub fn reset(&self) {
        self.state.store(BurstState::Init as u8, Ordering::Release);
        self.abort.store(false, Ordering::Release);
        self.frames.store(0, Ordering::Release);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_state_codes_are_stable() {
        assert_eq!(BurstState::Init.code(), 0);
        assert_eq!(BurstState::ArmRequest.code(), 1);
        assert_eq!(BurstState::Armed.code(), 2);
        assert_eq!(BurstState::Running.code(), 3);
        assert_eq!(BurstState::Complete.code(), 4);
        assert_eq!(BurstState::Abort.code(), 5);
        assert_eq!(BurstState::Fail.code(), 6);
        assert_eq!(BurstState::try_from(7u8), Err(7));
        assert_eq!(BurstState::try_from(-1i32), Err(-1));
        assert_eq!(BurstState::try_from(4i32), Ok(BurstState::Complete));
    }

    #[test]
    fn test_transition_table() {
        use BurstState::*;
        assert!(Init.can_transition_to(ArmRequest));
        assert!(ArmRequest.can_transition_to(Armed));
        assert!(Armed.can_transition_to(Running));
        assert!(Running.can_transition_to(Complete));
        assert!(Running.can_transition_to(Abort));
        assert!(Complete.can_transition_to(Init));

        assert!(!Init.can_transition_to(Running));
        assert!(!Armed.can_transition_to(Complete));
        assert!(!Running.can_transition_to(Init));
        assert!(!Complete.can_transition_to(Running));
    }

    #[test]
    fn test_begin_arm_rejects_second_session() {
        // Arrange
        let control = BurstControl::new();

        // Act
        let first = control.begin_arm();
        let second = control.begin_arm();

        // Assert
        assert!(first);
        assert!(!second);
        assert_eq!(control.state(), BurstState::ArmRequest);
        assert!(control.is_active());
    }

    #[test]
    fn test_begin_arm_clears_previous_abort_and_frames() {
        let control = BurstControl::new();
        control.request_abort();
        control.record_frame();

        assert!(control.begin_arm());

        assert!(!control.abort_requested());
        assert_eq!(control.frames_captured(), 0);
    }

    #[test]
    fn test_advance_ignores_illegal_transition() {
        let control = BurstControl::new();
        assert_eq!(control.advance(BurstState::Running), BurstState::Init);
        assert!(control.begin_arm());
        assert_eq!(control.advance(BurstState::Armed), BurstState::Armed);
        assert_eq!(control.advance(BurstState::Running), BurstState::Running);
        assert_eq!(control.advance(BurstState::Armed), BurstState::Running);
    }

    #[test]
    fn test_acknowledge_resets_terminal_state_once() {
        // Arrange – run a session to completion
        let control = BurstControl::new();
        control.begin_arm();
        control.advance(BurstState::Armed);
        control.advance(BurstState::Running);
        control.advance(BurstState::Complete);
        control.finish();

        // Act
        let first = control.acknowledge();
        let second = control.acknowledge();

        // Assert
        assert_eq!(first, BurstState::Complete);
        assert_eq!(second, BurstState::Init);
    }

    #[test]
    fn test_acknowledge_keeps_state_while_coordinator_active() {
        let control = BurstControl::new();
        control.begin_arm();
        control.advance(BurstState::Fail);

        assert_eq!(control.acknowledge(), BurstState::Fail);
        assert_eq!(control.state(), BurstState::Fail);
    }

    #[test]
    fn test_record_frame_counts_across_threads() {
        let control = Arc::new(BurstControl::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let c = Arc::clone(&control);
                thread::spawn(move || {
                    for _ in 0..100 {
                        c.record_frame();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().expect("thread panicked");
        }
        assert_eq!(control.frames_captured(), 400);
    }

    #[test]
    fn test_display_names() {
        assert_eq!(BurstState::ArmRequest.to_string(), "ARM_REQUEST");
        assert_eq!(BurstState::Complete.to_string(), "COMPLETE");
    }
}
