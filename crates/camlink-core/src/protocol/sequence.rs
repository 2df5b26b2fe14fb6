//! Thread-safe allocator for the `msgid` correlation tag.
//!
//! The server never matches replies by `msgid`; it only echoes the value.
//! Clients still stamp every request with a fresh tag so a captured trace can
//! pair each reply with the request that caused it.
//!
//! The counter uses `AtomicU32` internally, so any number of tasks sharing
//! one engine can draw tags without holding the exchange lock.

use std::sync::atomic::{AtomicU32, Ordering};

/// A thread-safe, monotonically increasing `msgid` source.
///
/// Tags start at 1 so that 0 can mean "untagged" in logs.  The counter wraps
/// from `u32::MAX` back to 0 without panicking.
///
/// # Examples
///
/// ```rust
/// use camlink_core::protocol::SequenceCounter;
///
/// let counter = SequenceCounter::new();
/// assert_eq!(counter.next(), 1);
/// assert_eq!(counter.next(), 2);
/// ```
#[derive(Debug)]
pub struct SequenceCounter {
    inner: AtomicU32,
}

impl SequenceCounter {
    /// Creates a new counter whose first tag is 1.
    pub fn new() -> Self {
        Self {
            inner: AtomicU32::new(1),
        }
    }

    /// Returns the next tag and atomically advances the counter.
    ///
    /// `Ordering::Relaxed` is enough: tags carry no memory-synchronisation
    /// meaning, only uniqueness.
    pub fn next(&self) -> u32 {
        self.inner.fetch_add(1, Ordering::Relaxed)
    }

    /// Returns the tag the next call to [`next`](Self::next) would hand out.
    pub fn current(&self) -> u32 {
        self.inner.load(Ordering::Relaxed)
    }
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self::new()
    }
}
