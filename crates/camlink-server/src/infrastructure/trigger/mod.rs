//! External start/end trigger sources for burst acquisition.
//!
//! A burst is armed by a client but started and stopped by an outside event
//! (a shutter controller, a DAQ line, an operator).  The burst coordinator
//! only sees the [`TriggerSource`] trait:
//!
//! ```text
//! register ──▶ wait_for_start (polled) ──▶ wait_for_end (polled) ──▶ unregister
//! ```
//!
//! Waits are blocking calls with a timeout.  The coordinator runs them on the
//! blocking thread pool and re-checks its abort flag between slices.
//!
//! # Implementations
//!
//! - [`SignalTrigger`]: in-process events on a `parking_lot` `Mutex` + `Condvar`.  Used in
//!   tests and as the latch behind [`udp::UdpTrigger`].
//! - [`udp::UdpTrigger`]: `START` / `END` datagrams on the trigger port.
//! - [`DisabledTrigger`]: no source configured; every arm fails.

use std::net::SocketAddr;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use thiserror::Error;
use tracing::debug;

pub mod udp;

/// Result of one bounded wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Signaled,
    TimedOut,
}

/// Error type for trigger operations.
#[derive(Debug, Error)]
pub enum TriggerError {
    /// No trigger source can be registered.
    #[error("trigger source unavailable: {0}")]
    Unavailable(String),

    /// A wait was attempted without a prior successful `register`.
    #[error("trigger source not registered")]
    NotRegistered,

    /// The trigger socket could not be bound.
    #[error("failed to bind trigger socket on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The listener thread could not be started.
    #[error("failed to start trigger listener: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Source of the external start and end events for one burst.
pub trait TriggerSource: Send + Sync {
    /// Prepares for a new burst.  Clears any event seen before this call.
    fn register(&self) -> Result<(), TriggerError>;

    /// Blocks up to `timeout` for the start event.
    fn wait_for_start(&self, timeout: Duration) -> Result<WaitOutcome, TriggerError>;

    /// Blocks up to `timeout` for the end event.
    fn wait_for_end(&self, timeout: Duration) -> Result<WaitOutcome, TriggerError>;

    /// Releases the registration.  Safe to call when not registered.
    fn unregister(&self);
}

// ── SignalTrigger ─────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct SignalState {
    registered: bool,
    started: bool,
    ended: bool,
}

/// Latching start/end events raised from inside the process.
///
/// Events are only recorded while registered; both stay latched until the
/// next `register` or `unregister`.
#[derive(Debug, Default)]
pub struct SignalTrigger {
    state: Mutex<SignalState>,
    changed: Condvar,
}

impl SignalTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the start event.
    pub fn signal_start(&self) {
        let mut state = self.state.lock();
        if state.registered {
            state.started = true;
            self.changed.notify_all();
        } else {
            debug!("start signal ignored: no burst registered");
        }
    }

    /// Raises the end event.
    pub fn signal_end(&self) {
        let mut state = self.state.lock();
        if state.registered {
            state.ended = true;
            self.changed.notify_all();
        } else {
            debug!("end signal ignored: no burst registered");
        }
    }

    pub fn is_registered(&self) -> bool {
        self.state.lock().registered
    }

    fn wait_for(
        &self,
        timeout: Duration,
        pending: impl Fn(&SignalState) -> bool,
    ) -> Result<WaitOutcome, TriggerError> {
        let mut state = self.state.lock();
        if !state.registered {
            return Err(TriggerError::NotRegistered);
        }
        self.changed
            .wait_while_for(&mut state, |s| s.registered && pending(s), timeout);
        if !state.registered {
            return Err(TriggerError::NotRegistered);
        }
        Ok(if pending(&state) {
            WaitOutcome::TimedOut
        } else {
            WaitOutcome::Signaled
        })
    }
}

impl TriggerSource for SignalTrigger {
    fn register(&self) -> Result<(), TriggerError> {
        let mut state = self.state.lock();
        *state = SignalState {
            registered: true,
            ..SignalState::default()
        };
        Ok(())
    }

    fn wait_for_start(&self, timeout: Duration) -> Result<WaitOutcome, TriggerError> {
        self.wait_for(timeout, |s| !s.started)
    }

    fn wait_for_end(&self, timeout: Duration) -> Result<WaitOutcome, TriggerError> {
        self.wait_for(timeout, |s| !s.ended)
    }

    fn unregister(&self) {
        let mut state = self.state.lock();
        *state = SignalState::default();
        self.changed.notify_all();
    }
}

// ── DisabledTrigger ───────────────────────────────────────────────────────────

/// Trigger source used when none is configured.  Registration always fails.
#[derive(Debug, Default)]
pub struct DisabledTrigger;

impl TriggerSource for DisabledTrigger {
    fn register(&self) -> Result<(), TriggerError> {
        Err(TriggerError::Unavailable("no trigger source configured".to_string()))
    }

    fn wait_for_start(&self, _timeout: Duration) -> Result<WaitOutcome, TriggerError> {
        Err(TriggerError::NotRegistered)
    }

    fn wait_for_end(&self, _timeout: Duration) -> Result<WaitOutcome, TriggerError> {
        Err(TriggerError::NotRegistered)
    }

    fn unregister(&self) {}
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    const SHORT: Duration = Duration::from_millis(20);

    #[test]
    fn test_wait_without_register_fails() {
        let trigger = SignalTrigger::new();
        assert!(matches!(
            trigger.wait_for_start(SHORT),
            Err(TriggerError::NotRegistered)
        ));
    }

    #[test]
    fn test_wait_times_out_without_signal() {
        // Arrange
        let trigger = SignalTrigger::new();
        trigger.register().unwrap();

        // Act
        let started = Instant::now();
        let outcome = trigger.wait_for_start(SHORT).unwrap();

        // Assert
        assert_eq!(outcome, WaitOutcome::TimedOut);
        assert!(started.elapsed() >= SHORT);
    }

    #[test]
    fn test_signal_from_other_thread_wakes_waiter() {
        // Arrange
        let trigger = Arc::new(SignalTrigger::new());
        trigger.register().unwrap();
        let raiser = Arc::clone(&trigger);

        // Act
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            raiser.signal_start();
        });
        let outcome = trigger.wait_for_start(Duration::from_secs(5)).unwrap();
        handle.join().expect("thread panicked");

        // Assert
        assert_eq!(outcome, WaitOutcome::Signaled);
    }

    #[test]
    fn test_events_stay_latched_until_reregister() {
        let trigger = SignalTrigger::new();
        trigger.register().unwrap();
        trigger.signal_start();
        trigger.signal_end();

        assert_eq!(trigger.wait_for_start(SHORT).unwrap(), WaitOutcome::Signaled);
        assert_eq!(trigger.wait_for_end(SHORT).unwrap(), WaitOutcome::Signaled);

        trigger.register().unwrap();
        assert_eq!(trigger.wait_for_start(SHORT).unwrap(), WaitOutcome::TimedOut);
    }

    #[test]
    fn test_signal_before_register_is_ignored() {
        let trigger = SignalTrigger::new();
        trigger.signal_start();
        trigger.register().unwrap();
        assert_eq!(trigger.wait_for_start(SHORT).unwrap(), WaitOutcome::TimedOut);
    }

    #[test]
    fn test_unregister_releases_waiter() {
        let trigger = Arc::new(SignalTrigger::new());
        trigger.register().unwrap();
        let other = Arc::clone(&trigger);

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            other.unregister();
        });
        let result = trigger.wait_for_end(Duration::from_secs(5));
        handle.join().expect("thread panicked");

        assert!(matches!(result, Err(TriggerError::NotRegistered)));
        assert!(!trigger.is_registered());
    }

    #[test]
    fn test_disabled_trigger_refuses_registration() {
        let trigger = DisabledTrigger;
        assert!(matches!(trigger.register(), Err(TriggerError::Unavailable(_))));
    }
}
