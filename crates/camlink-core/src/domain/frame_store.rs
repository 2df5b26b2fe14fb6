//! Ring-buffer frame store.
//!
//! Holds the last `size` acquired frames so single-shot and burst
//! acquisitions can be retrieved by index without touching the camera again.
//!
//! # Index model
//!
//! ```text
//!            last ─┐        show ─┐
//! slots: [ f5 ][ f6 ][ f2 ][ f3 ][ f4 ]     size = 5, valid = 5
//!          0     1     2     3     4
//! ```
//!
//! - `valid` counts slots that hold real data; it grows by one per recorded
//!   frame and saturates at `size`.
//! - Slots fill from 0 upward after every reset, so `0..valid` are exactly
//!   the written slots.  Once full, `last` wraps modulo `size` and the oldest
//!   frame is overwritten.
//! - `show` follows `last` unless a caller pinned a display index.
//!
//! Protocol callers get strict bounds checks from [`FrameRing::get`]; the
//! wrapping convenience of the legacy display code is kept separately in
//! [`FrameRing::select_display_wrapped`].

use thiserror::Error;

use crate::protocol::messages::{FrameInfo, RingInfo};

/// Largest ring the store accepts; larger requests are clamped.
pub const RING_MAX_SIZE: usize = 999;

/// Ring size used before any client sets one.
pub const RING_DEFAULT_SIZE: usize = 10;

/// Errors reported by [`FrameRing`] operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameStoreError {
    /// The requested index is not a written slot.
    #[error("frame index {index} out of range: {valid} frame(s) held")]
    IndexOutOfRange { index: usize, valid: usize },

    /// No frame has been recorded since the last reset.
    #[error("no image captured yet")]
    Empty,

    /// The pixel buffer does not match `pitch * height` from its metadata.
    #[error("frame holds {actual} pixel bytes but metadata describes {expected}")]
    SizeMismatch { expected: usize, actual: usize },
}

/// One acquired image: metadata plus an owned pixel buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub info: FrameInfo,
    pub pixels: Vec<u8>,
}

impl Frame {
    /// Pairs metadata with its pixel buffer.
    pub fn new(info: FrameInfo, pixels: Vec<u8>) -> Self {
        Self { info, pixels }
    }
}

/// Fixed-capacity circular store of the most recent frames.
#[derive(Debug)]
pub struct FrameRing {
    slots: Vec<Option<Frame>>,
    valid: usize,
    last: usize,
    show: usize,
    pinned: bool,
}

impl FrameRing {
    /// Creates an empty ring with `size` slots (clamped to `1..=RING_MAX_SIZE`).
    pub fn new(size: usize) -> Self {
        let mut ring = Self {
            slots: Vec::new(),
            valid: 0,
            last: 0,
            show: 0,
            pinned: false,
        };
        ring.resize(size);
        ring
    }

    /// Clamps a requested ring size to the supported range.
    pub fn clamp_size(requested: usize) -> usize {
        requested.clamp(1, RING_MAX_SIZE)
    }

    /// Releases every slot and reallocates the ring with a new capacity.
    ///
    /// Returns the capacity actually applied.  All indices reset to 0 and any
    /// pinned display index is dropped.
    pub fn resize(&mut self, requested: usize) -> usize {
        let size = Self::clamp_size(requested);
        self.release();
        self.slots = Vec::with_capacity(size);
        self.slots.resize_with(size, || None);
        size
    }

    /// Stores a frame in the next slot and returns that slot's index.
    ///
    /// # Errors
    ///
    /// Returns [`FrameStoreError::SizeMismatch`] if the pixel buffer length
    /// differs from `info.frame_bytes()`; the ring is left unchanged.
    pub fn record_frame(&mut self, frame: Frame) -> Result<usize, FrameStoreError> {
        let expected = frame.info.frame_bytes();
        if frame.pixels.len() != expected {
            return Err(FrameStoreError::SizeMismatch {
                expected,
                actual: frame.pixels.len(),
            });
        }

        let slot = if self.valid == 0 {
            0
        } else {
            (self.last + 1) % self.slots.len()
        };
        self.slots[slot] = Some(frame);
        self.last = slot;
        if self.valid < self.slots.len() {
            self.valid += 1;
        }
        if !self.pinned {
            self.show = slot;
        }
        Ok(slot)
    }

    /// Returns the frame in slot `index`.
    ///
    /// # Errors
    ///
    /// Returns [`FrameStoreError::IndexOutOfRange`] unless `index < valid`.
    pub fn get(&self, index: usize) -> Result<&Frame, FrameStoreError> {
        if index >= self.valid {
            return Err(FrameStoreError::IndexOutOfRange {
                index,
                valid: self.valid,
            });
        }
        self.slots
            .get(index)
            .and_then(Option::as_ref)
            .ok_or(FrameStoreError::IndexOutOfRange {
                index,
                valid: self.valid,
            })
    }

    /// The most recently recorded frame.
    ///
    /// # Errors
    ///
    /// Returns [`FrameStoreError::Empty`] if nothing has been recorded.
    pub fn latest(&self) -> Result<&Frame, FrameStoreError> {
        if self.valid == 0 {
            return Err(FrameStoreError::Empty);
        }
        self.get(self.last)
    }

    /// The frame selected for display and retrieval (`show`).
    ///
    /// # Errors
    ///
    /// Returns [`FrameStoreError::Empty`] if nothing has been recorded.
    pub fn current(&self) -> Result<&Frame, FrameStoreError> {
        if self.valid == 0 {
            return Err(FrameStoreError::Empty);
        }
        self.get(self.show)
    }

    /// Pins the display index so new frames no longer move `show`.
    ///
    /// # Errors
    ///
    /// Returns [`FrameStoreError::IndexOutOfRange`] unless `index < valid`.
    pub fn pin_show(&mut self, index: usize) -> Result<(), FrameStoreError> {
        if index >= self.valid {
            return Err(FrameStoreError::IndexOutOfRange {
                index,
                valid: self.valid,
            });
        }
        self.show = index;
        self.pinned = true;
        Ok(())
    }

    /// Releases a pinned display index; `show` jumps back to `last`.
    pub fn unpin_show(&mut self) {
        self.pinned = false;
        self.show = self.last;
    }

    /// Display-side selection that wraps any index into `0..valid`.
    ///
    /// Mirrors the interactive viewer, where stepping past either end of the
    /// ring wraps around.  Pins the result.  Returns `None` on an empty ring.
    pub fn select_display_wrapped(&mut self, index: i64) -> Option<usize> {
        if self.valid == 0 {
            return None;
        }
        let wrapped = index.rem_euclid(self.valid as i64) as usize;
        self.show = wrapped;
        self.pinned = true;
        Some(wrapped)
    }

    /// Frees all slot storage and resets the indices.  Safe to call repeatedly.
    pub fn release(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.valid = 0;
        self.last = 0;
        self.show = 0;
        self.pinned = false;
    }

    /// Total pixel bytes currently held.
    pub fn bytes_held(&self) -> usize {
        self.slots
            .iter()
            .flatten()
            .map(|frame| frame.pixels.len())
            .sum()
    }

    /// Capacity in frames.
    pub fn size(&self) -> usize {
        self.slots.len()
    }

    /// Number of written slots.
    pub fn valid(&self) -> usize {
        self.valid
    }

    /// Index of the most recently written slot.
    pub fn last(&self) -> usize {
        self.last
    }

    /// Index selected for display.
    pub fn show(&self) -> usize {
        self.show
    }

    /// Whether a caller pinned the display index.
    pub fn is_pinned(&self) -> bool {
        self.pinned
    }

    /// `true` until the first frame is recorded.
    pub fn is_empty(&self) -> bool {
        self.valid == 0
    }

    /// Snapshot of the indices in wire form.
    pub fn info(&self) -> RingInfo {
        RingInfo {
            size: self.size() as u32,
            valid: self.valid as u32,
            last: self.last as u32,
            show: self.show as u32,
        }
    }
}

impl Default for FrameRing {
    fn default() -> Self {
        Self::new(RING_DEFAULT_SIZE)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// A 4x2 mono frame whose pixels are all `fill`.
    fn frame(sequence: u32, fill: u8) -> Frame {
        let info = FrameInfo {
            sequence,
            width: 4,
            height: 2,
            pitch: 4,
            ..Default::default()
        };
        Frame::new(info, vec![fill; 8])
    }

    fn assert_invariants(ring: &FrameRing) {
        assert!(ring.valid() <= ring.size(), "valid must never exceed size");
        if ring.valid() > 0 {
            assert!(ring.last() < ring.valid(), "last must be a written slot");
            assert!(ring.show() < ring.valid(), "show must be a written slot");
        }
    }

    // ── Construction / resize ────────────────────────────────────────────────

    #[test]
    fn test_new_ring_is_empty() {
        let ring = FrameRing::new(5);
        assert_eq!(ring.size(), 5);
        assert_eq!(ring.valid(), 0);
        assert!(ring.is_empty());
        assert_eq!(ring.latest(), Err(FrameStoreError::Empty));
        assert_eq!(ring.current(), Err(FrameStoreError::Empty));
    }

    #[test]
    fn test_resize_clamps_to_supported_range() {
        let mut ring = FrameRing::default();
        assert_eq!(ring.resize(0), 1);
        assert_eq!(ring.size(), 1);
        assert_eq!(ring.resize(5000), RING_MAX_SIZE);
        assert_eq!(ring.size(), RING_MAX_SIZE);
        assert_eq!(ring.resize(42), 42);
    }

    #[test]
    fn test_resize_discards_frames_and_resets_indices() {
        // Arrange
        let mut ring = FrameRing::new(4);
        for i in 0..3 {
            ring.record_frame(frame(i, i as u8)).unwrap();
        }
        ring.pin_show(1).unwrap();

        // Act
        let size = ring.resize(7);

        // Assert
        assert_eq!(size, 7);
        assert_eq!(ring.size(), 7);
        assert_eq!(ring.valid(), 0);
        assert_eq!(ring.last(), 0);
        assert_eq!(ring.show(), 0);
        assert!(!ring.is_pinned());
        assert_eq!(ring.bytes_held(), 0);
    }

    // ── Recording ────────────────────────────────────────────────────────────

    #[test]
    fn test_first_frame_lands_in_slot_zero() {
        let mut ring = FrameRing::new(3);
        let slot = ring.record_frame(frame(1, 0xAA)).unwrap();
        assert_eq!(slot, 0);
        assert_eq!(ring.last(), 0);
        assert_eq!(ring.show(), 0);
        assert_eq!(ring.valid(), 1);
    }

    #[test]
    fn test_invariants_hold_across_many_records() {
        let mut ring = FrameRing::new(4);
        for i in 0..25u32 {
            ring.record_frame(frame(i, i as u8)).unwrap();
            assert_invariants(&ring);
            assert_eq!(ring.valid(), (i as usize + 1).min(4));
            assert_eq!(ring.latest().unwrap().info.sequence, i);
        }
    }

    #[test]
    fn test_sixth_frame_in_ring_of_five_wraps_and_keeps_valid() {
        // Arrange
        let mut ring = FrameRing::new(5);
        for i in 0..5 {
            ring.record_frame(frame(i, i as u8)).unwrap();
        }
        assert_eq!(ring.valid(), 5);
        assert_eq!(ring.last(), 4);

        // Act
        ring.record_frame(frame(5, 5)).unwrap();

        // Assert
        assert_eq!(ring.valid(), 5);
        assert_eq!(ring.last(), 0);
        assert_eq!(ring.get(0).unwrap().info.sequence, 5);
        assert_eq!(ring.get(1).unwrap().info.sequence, 1);
    }

    #[test]
    fn test_get_returns_most_recent_data_for_each_slot() {
        let mut ring = FrameRing::new(3);
        for i in 0..7u32 {
            ring.record_frame(frame(i, i as u8)).unwrap();
        }
        // Slots were written with sequences 6, 4, 5 after wrapping twice.
        assert_eq!(ring.get(0).unwrap().info.sequence, 6);
        assert_eq!(ring.get(1).unwrap().info.sequence, 4);
        assert_eq!(ring.get(2).unwrap().info.sequence, 5);
        assert_eq!(ring.get(0).unwrap().pixels, vec![6; 8]);
    }

    #[test]
    fn test_get_rejects_unwritten_slots() {
        let mut ring = FrameRing::new(5);
        ring.record_frame(frame(0, 0)).unwrap();
        ring.record_frame(frame(1, 1)).unwrap();
        assert_eq!(
            ring.get(2),
            Err(FrameStoreError::IndexOutOfRange { index: 2, valid: 2 })
        );
        assert!(ring.get(usize::MAX).is_err());
    }

    #[test]
    fn test_record_rejects_mismatched_pixel_buffer() {
        let mut ring = FrameRing::new(2);
        let mut bad = frame(0, 0);
        bad.pixels.pop();
        assert_eq!(
            ring.record_frame(bad),
            Err(FrameStoreError::SizeMismatch { expected: 8, actual: 7 })
        );
        assert!(ring.is_empty());
    }

    #[test]
    fn test_bytes_held_bounded_by_size_times_frame_bytes() {
        let mut ring = FrameRing::new(3);
        for i in 0..10 {
            ring.record_frame(frame(i, 0)).unwrap();
            assert!(ring.bytes_held() <= ring.size() * 8);
        }
        assert_eq!(ring.bytes_held(), 24);
    }

    // ── Display index ────────────────────────────────────────────────────────

    #[test]
    fn test_pinned_show_is_not_moved_by_new_frames() {
        let mut ring = FrameRing::new(4);
        ring.record_frame(frame(0, 0)).unwrap();
        ring.record_frame(frame(1, 1)).unwrap();
        ring.pin_show(0).unwrap();

        ring.record_frame(frame(2, 2)).unwrap();

        assert_eq!(ring.show(), 0);
        assert_eq!(ring.current().unwrap().info.sequence, 0);
        ring.unpin_show();
        assert_eq!(ring.show(), 2);
    }

    #[test]
    fn test_pin_show_rejects_out_of_range() {
        let mut ring = FrameRing::new(4);
        assert!(ring.pin_show(0).is_err());
    }

    #[test]
    fn test_select_display_wrapped_wraps_both_directions() {
        let mut ring = FrameRing::new(5);
        assert_eq!(ring.select_display_wrapped(3), None);
        for i in 0..3 {
            ring.record_frame(frame(i, 0)).unwrap();
        }
        assert_eq!(ring.select_display_wrapped(4), Some(1));
        assert_eq!(ring.select_display_wrapped(-1), Some(2));
        assert!(ring.is_pinned());
    }

    // ── Release ──────────────────────────────────────────────────────────────

    #[test]
    fn test_release_is_idempotent() {
        let mut ring = FrameRing::new(3);
        ring.record_frame(frame(0, 1)).unwrap();
        ring.release();
        ring.release();
        assert!(ring.is_empty());
        assert_eq!(ring.size(), 3);
        assert_eq!(ring.bytes_held(), 0);
    }

    #[test]
    fn test_info_reflects_indices() {
        let mut ring = FrameRing::new(5);
        for i in 0..3 {
            ring.record_frame(frame(i, 0)).unwrap();
        }
        assert_eq!(
            ring.info(),
            RingInfo { size: 5, valid: 3, last: 2, show: 2 }
        );
    }
}
