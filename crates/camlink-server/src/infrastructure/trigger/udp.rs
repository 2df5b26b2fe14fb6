//! UDP trigger listener.
//!
//! External controllers send a datagram containing `START` or `END`
//! (ASCII, case-insensitive, surrounding whitespace ignored) to the trigger
//! port, default 1911.  Anything else is logged and dropped.
//!
//! The socket is serviced by a dedicated thread so the blocking `recv_from`
//! never runs on the Tokio runtime.  The socket has a short read timeout;
//! on each timeout the thread checks its `running` flag and exits once the
//! trigger is dropped.

use std::net::{SocketAddr, UdpSocket};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::{SignalTrigger, TriggerError, TriggerSource, WaitOutcome};

/// How long one `recv_from` may block before the running flag is re-checked.
const RECV_TIMEOUT: Duration = Duration::from_millis(250);

/// A datagram the listener understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerCommand {
    Start,
    End,
}

impl TriggerCommand {
    /// Parses a datagram body.
    pub fn parse(datagram: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(datagram).ok()?.trim();
        if text.eq_ignore_ascii_case("START") {
            Some(TriggerCommand::Start)
        } else if text.eq_ignore_ascii_case("END") {
            Some(TriggerCommand::End)
        } else {
            None
        }
    }
}

/// [`TriggerSource`] fed by `START` / `END` datagrams.
#[derive(Debug)]
pub struct UdpTrigger {
    signals: Arc<SignalTrigger>,
    running: Arc<AtomicBool>,
    local_addr: SocketAddr,
}

impl UdpTrigger {
    /// Binds `addr` and starts the listener thread.
    ///
    /// # Errors
    ///
    /// - [`TriggerError::BindFailed`] if the socket cannot be bound.
    /// - [`TriggerError::Spawn`] if the thread cannot be started.
    pub fn bind(addr: SocketAddr) -> Result<Self, TriggerError> {
        let socket = UdpSocket::bind(addr).map_err(|source| TriggerError::BindFailed { addr, source })?;
        socket
            .set_read_timeout(Some(RECV_TIMEOUT))
            .map_err(|source| TriggerError::BindFailed { addr, source })?;
        let local_addr = socket
            .local_addr()
            .map_err(|source| TriggerError::BindFailed { addr, source })?;

        let signals = Arc::new(SignalTrigger::new());
        let running = Arc::new(AtomicBool::new(true));

        let thread_signals = Arc::clone(&signals);
        let thread_running = Arc::clone(&running);
        std::thread::Builder::new()
            .name("camlink-trigger".to_string())
            .spawn(move || trigger_loop(socket, thread_signals, thread_running))
            .map_err(TriggerError::Spawn)?;

        info!("trigger listener on UDP {local_addr}");
        Ok(Self {
            signals,
            running,
            local_addr,
        })
    }

    /// Address the socket is actually bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Drop for UdpTrigger {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

impl TriggerSource for UdpTrigger {
    fn register(&self) -> Result<(), TriggerError> {
        self.signals.register()
    }

    fn wait_for_start(&self, timeout: Duration) -> Result<WaitOutcome, TriggerError> {
        self.signals.wait_for_start(timeout)
    }

    fn wait_for_end(&self, timeout: Duration) -> Result<WaitOutcome, TriggerError> {
        self.signals.wait_for_end(timeout)
    }

    fn unregister(&self) {
        self.signals.unregister();
    }
}

/// Receive loop executed on the trigger thread.
fn trigger_loop(socket: UdpSocket, signals: Arc<SignalTrigger>, running: Arc<AtomicBool>) {
    let mut buf = [0u8; 64];

    while running.load(Ordering::Relaxed) {
        let (len, src) = match socket.recv_from(&mut buf) {
            Ok(pair) => pair,
            Err(e) if is_timeout_error(&e) => continue,
            Err(e) => {
                error!("trigger recv error: {e}");
                continue;
            }
        };

        match TriggerCommand::parse(&buf[..len]) {
            Some(TriggerCommand::Start) => {
                debug!("START trigger from {src}");
                signals.signal_start();
            }
            Some(TriggerCommand::End) => {
                debug!("END trigger from {src}");
                signals.signal_end();
            }
            None => warn!("unrecognised trigger datagram from {src} ({len} bytes)"),
        }
    }

    info!("trigger listener stopped");
}

fn is_timeout_error(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_known_commands() {
        assert_eq!(TriggerCommand::parse(b"START"), Some(TriggerCommand::Start));
        assert_eq!(TriggerCommand::parse(b"end\n"), Some(TriggerCommand::End));
        assert_eq!(TriggerCommand::parse(b"  Start  "), Some(TriggerCommand::Start));
    }

    #[test]
    fn test_parse_rejects_other_datagrams() {
        assert_eq!(TriggerCommand::parse(b"STOP"), None);
        assert_eq!(TriggerCommand::parse(&[0xFF, 0xFE]), None);
        assert_eq!(TriggerCommand::parse(b""), None);
    }

    #[test]
    fn test_datagrams_drive_registered_trigger() {
        // Arrange
        let trigger = UdpTrigger::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        trigger.register().unwrap();
        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();

        // Act
        sender.send_to(b"START", trigger.local_addr()).unwrap();
        let start = trigger.wait_for_start(Duration::from_secs(5)).unwrap();
        sender.send_to(b"END", trigger.local_addr()).unwrap();
        let end = trigger.wait_for_end(Duration::from_secs(5)).unwrap();

        // Assert
        assert_eq!(start, WaitOutcome::Signaled);
        assert_eq!(end, WaitOutcome::Signaled);
        trigger.unregister();
    }
}
