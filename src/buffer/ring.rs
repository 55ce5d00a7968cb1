//! Lock-free SPSC ring buffer for `f64` samples
//!
//! The ingestion queue between the producer thread (calling `process`) and
//! the consumer thread (running the dispatch loop). Capacity is a power of
//! two so position-to-index reduction is a single mask; `head` and `tail`
//! are unbounded sequence counters so full/empty never suffers the ABA
//! problem. One slot stays unused: `head - tail <= capacity - 1`
//! disambiguates full from empty without a separate flag.
//!
//! ## Memory ordering protocol
//!
//! Producer: load own `head` Relaxed, load `tail` Acquire, write the slot,
//! store `head` Release (publishes the slot write).
//! Consumer: load own `tail` Relaxed, load `head` Acquire (synchronises
//! with the producer's Release), read the slot, store `tail` Release
//! (releases the slot back to the producer).
//!
//! Single-element operations are wait-free; batch operations split into
//! two contiguous copies when the range wraps the end of storage.

use std::cell::UnsafeCell;
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering};

use static_assertions::const_assert_eq;

use crate::constants::SEQUENCE_ALIGNMENT;
use crate::error::{Result, RippleError};

/// Sequence counter padded to its own prefetch region to prevent false
/// sharing between the producer and consumer counters.
#[repr(align(128))]
pub(crate) struct PaddedSequence {
    value: AtomicU64,
}

const_assert_eq!(std::mem::size_of::<PaddedSequence>(), SEQUENCE_ALIGNMENT);
const_assert_eq!(std::mem::align_of::<PaddedSequence>(), SEQUENCE_ALIGNMENT);

impl PaddedSequence {
    pub(crate) fn new(initial: u64) -> Self {
        Self {
            value: AtomicU64::new(initial),
        }
    }

    #[inline(always)]
    pub(crate) fn load(&self, ordering: Ordering) -> u64 {
        self.value.load(ordering)
    }

    #[inline(always)]
    pub(crate) fn store(&self, value: u64, ordering: Ordering) {
        self.value.store(value, ordering);
    }
}

/// Lock-free single-producer single-consumer ring buffer of `f64` samples.
///
/// At most one thread may write and one thread may read concurrently.
/// Multiple producers require external synchronisation, which this type
/// does not provide.
pub struct RingBuffer {
    /// Sample storage; slots are only ever touched by the side that owns
    /// them under the head/tail protocol
    storage: Box<[UnsafeCell<f64>]>,
    /// Number of slots (power of two)
    capacity: usize,
    /// Mask for fast index calculation: `position & mask == position % capacity`
    mask: usize,
    /// Producer sequence: total samples ever written
    head: PaddedSequence,
    /// Consumer sequence: total samples ever read
    tail: PaddedSequence,
}

// SAFETY: slot access is partitioned by the head/tail protocol. The
// producer only writes slots in [head, tail + capacity - 1) and publishes
// them with a Release store; the consumer only reads slots in [tail, head)
// after an Acquire load of head. No slot is ever accessed by both sides at
// the same time.
unsafe impl Send for RingBuffer {}
unsafe impl Sync for RingBuffer {}

impl RingBuffer {
    /// Create a ring buffer with `capacity` slots.
    ///
    /// `capacity` must be a power of two and at least 2; one slot is
    /// reserved, so `capacity - 1` samples are usable.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity < 2 || !capacity.is_power_of_two() {
            return Err(RippleError::config(
                "ring capacity must be a power of 2 and >= 2",
            ));
        }

        let storage: Box<[UnsafeCell<f64>]> =
            (0..capacity).map(|_| UnsafeCell::new(0.0)).collect();

        Ok(Self {
            storage,
            capacity,
            mask: capacity - 1,
            head: PaddedSequence::new(0),
            tail: PaddedSequence::new(0),
        })
    }

    /// Total number of slots
    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples currently buffered and readable
    #[inline]
    pub fn available(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        (head - tail) as usize
    }

    /// Free slots the producer can still fill
    #[inline]
    pub fn remaining(&self) -> usize {
        self.capacity - 1 - self.available()
    }

    #[inline(always)]
    fn slot_ptr(&self, sequence: u64) -> *mut f64 {
        let idx = (sequence as usize) & self.mask;
        self.storage[idx].get()
    }

    /// Write a single sample. Returns `false` when the buffer is full.
    /// Wait-free; safe to call from a real-time producer.
    #[inline]
    pub fn write(&self, value: f64) -> bool {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);

        if (head - tail) as usize >= self.capacity - 1 {
            return false;
        }

        // SAFETY: the slot at `head` is unpublished, so only the producer
        // touches it until the Release store below.
        unsafe {
            ptr::write(self.slot_ptr(head), value);
        }
        self.head.store(head + 1, Ordering::Release);
        true
    }

    /// Write up to `data.len()` samples, limited by free space. Returns
    /// the number written. The copy splits in two when the range wraps.
    pub fn write_batch(&self, data: &[f64]) -> usize {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);

        let free = self.capacity - 1 - (head - tail) as usize;
        let count = data.len().min(free);
        if count == 0 {
            return 0;
        }

        let start = (head as usize) & self.mask;
        let first = count.min(self.capacity - start);

        // SAFETY: slots [head, head + count) are unpublished and owned by
        // the producer; the two copies cover the wrapped range.
        unsafe {
            ptr::copy_nonoverlapping(data.as_ptr(), self.storage[start].get(), first);
            if count > first {
                ptr::copy_nonoverlapping(
                    data.as_ptr().add(first),
                    self.storage[0].get(),
                    count - first,
                );
            }
        }

        self.head.store(head + count as u64, Ordering::Release);
        count
    }

    /// Read a single sample. Returns `None` when the buffer is empty.
    #[inline]
    pub fn read(&self) -> Option<f64> {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);

        if tail == head {
            return None;
        }

        // SAFETY: the slot at `tail` was published by the producer's
        // Release store observed via the Acquire load of head.
        let value = unsafe { ptr::read(self.slot_ptr(tail)) };
        self.tail.store(tail + 1, Ordering::Release);
        Some(value)
    }

    /// Read up to `buf.len()` samples into `buf`, advancing the read
    /// cursor. Returns the number read.
    pub fn read_into(&self, buf: &mut [f64]) -> usize {
        let count = self.copy_out(buf, buf.len());
        if count > 0 {
            let tail = self.tail.load(Ordering::Relaxed);
            self.tail.store(tail + count as u64, Ordering::Release);
        }
        count
    }

    /// Copy up to `n` samples into `buf` without advancing the read
    /// cursor. Returns the number copied.
    pub fn peek_into(&self, buf: &mut [f64], n: usize) -> usize {
        self.copy_out(buf, n.min(buf.len()))
    }

    fn copy_out(&self, buf: &mut [f64], limit: usize) -> usize {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);

        let count = limit.min((head - tail) as usize);
        if count == 0 {
            return 0;
        }

        let start = (tail as usize) & self.mask;
        let first = count.min(self.capacity - start);

        // SAFETY: slots [tail, tail + count) are published and owned by
        // the consumer until tail advances.
        unsafe {
            ptr::copy_nonoverlapping(self.storage[start].get(), buf.as_mut_ptr(), first);
            if count > first {
                ptr::copy_nonoverlapping(
                    self.storage[0].get(),
                    buf.as_mut_ptr().add(first),
                    count - first,
                );
            }
        }
        count
    }

    /// Discard up to `n` samples. Returns the number discarded.
    pub fn skip(&self, n: usize) -> usize {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);

        let count = n.min((head - tail) as usize);
        if count > 0 {
            self.tail.store(tail + count as u64, Ordering::Release);
        }
        count
    }

    /// Discard all buffered samples. Consumer-side operation.
    pub fn clear(&self) {
        self.skip(self.available());
    }

    /// Borrow the next `len` readable samples as one contiguous slice.
    ///
    /// Returns `None` when fewer than `len` samples are buffered or the
    /// range wraps the end of storage (callers then materialise via
    /// [`peek_into`](Self::peek_into)). Consumer-side only: the slice is
    /// valid until the read cursor advances; the producer cannot touch
    /// these slots because they are not yet released.
    pub fn view(&self, len: usize) -> Option<&[f64]> {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);

        if ((head - tail) as usize) < len {
            return None;
        }

        let start = (tail as usize) & self.mask;
        if start + len > self.capacity {
            return None; // wrapped
        }

        // SAFETY: slots [tail, tail + len) are published, contiguous, and
        // owned by the consumer until tail advances.
        Some(unsafe { std::slice::from_raw_parts(self.storage[start].get(), len) })
    }
}
