//! Lock-free single-producer/single-consumer snapshot cell.
//!
//! A triple buffer: the publisher always has a private back buffer, the
//! reader a private front buffer, and the third sits in the middle. Publishing
//! swaps back and middle; reading swaps front and middle if something new was
//! published. Neither side ever waits on the other, and the reader only sees
//! complete frames.

use core::cell::UnsafeCell;

use portable_atomic::{AtomicBool, AtomicU8, Ordering};

const INDEX_MASK: u8 = 0b011;
/// Set in `middle` when it holds a frame the reader has not seen.
const FRESH: u8 = 0b100;

pub struct SnapshotCell<T: Copy> {
    buffers: [UnsafeCell<T>; 3],
    middle: AtomicU8,
    split: AtomicBool,
}

// SAFETY: each buffer is only accessed by the side that currently owns its
// index; ownership moves through the atomic `middle` swap.
unsafe impl<T: Copy + Send> Sync for SnapshotCell<T> {}

impl<T: Copy> SnapshotCell<T> {
    /// Create a cell whose every buffer starts as `value`.
    pub const fn new(value: T) -> Self {
        Self {
            buffers: [
                UnsafeCell::new(value),
                UnsafeCell::new(value),
                UnsafeCell::new(value),
            ],
            middle: AtomicU8::new(1),
            split: AtomicBool::new(false),
        }
    }

    /// Hand out the publisher and reader halves. Returns `None` after the
    /// first call.
    pub fn split(&self) -> Option<(Publisher<'_, T>, Reader<'_, T>)> {
        if self.split.swap(true, Ordering::AcqRel) {
            return None;
        }
        Some((
            Publisher { cell: self, back: 0 },
            Reader { cell: self, front: 2 },
        ))
    }
}

/// Writing half of a [`SnapshotCell`].
pub struct Publisher<'a, T: Copy> {
    cell: &'a SnapshotCell<T>,
    back: u8,
}

impl<T: Copy> Publisher<'_, T> {
    /// Make `value` the latest frame.
    pub fn publish(&mut self, value: T) {
        // SAFETY: `back` is owned exclusively by this publisher.
        unsafe {
            *self.cell.buffers[usize::from(self.back)].get() = value;
        }
        let previous = self.cell.middle.swap(self.back | FRESH, Ordering::AcqRel);
        self.back = previous & INDEX_MASK;
    }
}

/// Reading half of a [`SnapshotCell`].
pub struct Reader<'a, T: Copy> {
    cell: &'a SnapshotCell<T>,
    front: u8,
}

impl<T: Copy> Reader<'_, T> {
    /// Whether a frame newer than the last one read is waiting.
    pub fn has_update(&self) -> bool {
        self.cell.middle.load(Ordering::Relaxed) & FRESH != 0
    }

    /// Most recently published frame (or the last one read if nothing new).
    pub fn latest(&mut self) -> T {
        if self.has_update() {
            let previous = self.cell.middle.swap(self.front, Ordering::AcqRel);
            self.front = previous & INDEX_MASK;
        }
        // SAFETY: `front` is owned exclusively by this reader.
        unsafe { *self.cell.buffers[usize::from(self.front)].get() }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use std::boxed::Box;
    use std::thread;

    #[test]
    fn test_reader_sees_initial_value() {
        let cell = SnapshotCell::new(7u32);
        let (_publisher, mut reader) = cell.split().unwrap();
        assert!(!reader.has_update());
        assert_eq!(reader.latest(), 7);
    }

    #[test]
    fn test_split_only_once() {
        let cell = SnapshotCell::new(0u8);
        assert!(cell.split().is_some());
        assert!(cell.split().is_none());
    }

    #[test]
    fn test_latest_wins() {
        let cell = SnapshotCell::new(0u32);
        let (mut publisher, mut reader) = cell.split().unwrap();
        publisher.publish(1);
        publisher.publish(2);
        publisher.publish(3);
        assert!(reader.has_update());
        assert_eq!(reader.latest(), 3);
        assert_eq!(reader.latest(), 3);

        publisher.publish(4);
        assert_eq!(reader.latest(), 4);
    }

    #[test]
    fn test_no_torn_frames_across_threads() {
        #[derive(Clone, Copy)]
        struct Frame([u64; 8]);

        let cell: &'static SnapshotCell<Frame> = Box::leak(Box::new(SnapshotCell::new(Frame([0; 8]))));
        let (mut publisher, mut reader) = cell.split().unwrap();

        let writer = thread::spawn(move || {
            for n in 1..=20_000u64 {
                publisher.publish(Frame([n; 8]));
            }
        });

        let mut last = 0;
        while last < 20_000 {
            let frame = reader.latest();
            assert!(frame.0.iter().all(|&v| v == frame.0[0]), "torn frame");
            assert!(frame.0[0] >= last, "went backwards");
            last = frame.0[0];
        }
        writer.join().unwrap();
    }
}
