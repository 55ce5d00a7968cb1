//! Resizable wrapper around the SPSC ring buffer
//!
//! Grows or shrinks the ring to a new power-of-two capacity while
//! preserving pending samples. Fast-path operations go through an
//! uncontended shared lock (a single CAS in parking_lot); only the
//! copy-and-swap of a resize takes the exclusive lock, which is the brief
//! mutual-exclusion section around the swap. After a swap the drained
//! samples sit at offset 0 of the new buffer with fresh head/tail
//! counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::buffer::ring::RingBuffer;
use crate::error::{Result, RippleError};

/// Ring buffer whose capacity adapts between `min_capacity` and
/// `max_capacity` under supervisor control.
pub struct ResizableRing {
    ring: RwLock<RingBuffer>,
    min_capacity: usize,
    max_capacity: usize,
    grow_utilization: f64,
    shrink_utilization: f64,
    cooldown: Duration,
    last_resize: Mutex<Option<Instant>>,
    resizes: AtomicU64,
}

impl ResizableRing {
    /// Create a resizable ring. All capacities must be powers of two with
    /// `min_capacity <= initial_capacity <= max_capacity`.
    pub fn new(
        initial_capacity: usize,
        min_capacity: usize,
        max_capacity: usize,
        cooldown: Duration,
        grow_utilization: f64,
        shrink_utilization: f64,
    ) -> Result<Self> {
        if !min_capacity.is_power_of_two() || !max_capacity.is_power_of_two() {
            return Err(RippleError::config(
                "ring capacity bounds must be powers of 2",
            ));
        }
        if min_capacity > max_capacity {
            return Err(RippleError::config(
                "min ring capacity exceeds max ring capacity",
            ));
        }
        if initial_capacity < min_capacity || initial_capacity > max_capacity {
            return Err(RippleError::config(
                "initial ring capacity outside [min, max]",
            ));
        }
        if !(0.0..=1.0).contains(&shrink_utilization)
            || !(0.0..=1.0).contains(&grow_utilization)
            || shrink_utilization >= grow_utilization
        {
            return Err(RippleError::config(
                "utilization thresholds must satisfy 0 <= shrink < grow <= 1",
            ));
        }

        Ok(Self {
            ring: RwLock::new(RingBuffer::new(initial_capacity)?),
            min_capacity,
            max_capacity,
            grow_utilization,
            shrink_utilization,
            cooldown,
            last_resize: Mutex::new(None),
            resizes: AtomicU64::new(0),
        })
    }

    pub fn capacity(&self) -> usize {
        self.ring.read().capacity()
    }

    pub fn available(&self) -> usize {
        self.ring.read().available()
    }

    pub fn remaining(&self) -> usize {
        self.ring.read().remaining()
    }

    /// Fraction of slots currently occupied
    pub fn utilization(&self) -> f64 {
        let ring = self.ring.read();
        ring.available() as f64 / ring.capacity() as f64
    }

    /// Number of completed resizes
    pub fn resize_count(&self) -> u64 {
        self.resizes.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn write(&self, value: f64) -> bool {
        self.ring.read().write(value)
    }

    #[inline]
    pub fn write_batch(&self, data: &[f64]) -> usize {
        self.ring.read().write_batch(data)
    }

    #[inline]
    pub fn read(&self) -> Option<f64> {
        self.ring.read().read()
    }

    #[inline]
    pub fn read_into(&self, buf: &mut [f64]) -> usize {
        self.ring.read().read_into(buf)
    }

    #[inline]
    pub fn peek_into(&self, buf: &mut [f64], n: usize) -> usize {
        self.ring.read().peek_into(buf, n)
    }

    #[inline]
    pub fn skip(&self, n: usize) -> usize {
        self.ring.read().skip(n)
    }

    pub fn clear(&self) {
        self.ring.read().clear();
    }

    /// Run `f` against the underlying ring while holding the shared lock.
    /// Consumer-side read access (window views, scratch copies).
    pub(crate) fn with_ring<R>(&self, f: impl FnOnce(&RingBuffer) -> R) -> R {
        f(&self.ring.read())
    }

    fn cooldown_elapsed(&self) -> bool {
        match *self.last_resize.lock() {
            None => true,
            Some(at) => at.elapsed() >= self.cooldown,
        }
    }

    /// Resize to `new_capacity` rounded up to the next power of two.
    ///
    /// Returns `Ok(false)` without resizing when the rounded capacity
    /// equals the current one or the cooldown has not elapsed. A rounded
    /// capacity outside `[min, max]` is an error.
    pub fn resize(&self, new_capacity: usize) -> Result<bool> {
        if !self.cooldown_elapsed() {
            return Ok(false);
        }
        self.force_resize(new_capacity)
    }

    /// Resize ignoring the cooldown. Same rounding and bounds rules as
    /// [`resize`](Self::resize).
    pub fn force_resize(&self, new_capacity: usize) -> Result<bool> {
        let rounded = new_capacity.next_power_of_two();
        if rounded < self.min_capacity || rounded > self.max_capacity {
            return Err(RippleError::config(format!(
                "requested capacity {rounded} outside [{}, {}]",
                self.min_capacity, self.max_capacity
            )));
        }
        if rounded == self.capacity() {
            return Ok(false);
        }
        self.swap_to(rounded)?;
        Ok(true)
    }

    /// Apply the automatic resize policy for the observed utilisation.
    ///
    /// Grows when `utilization > grow_utilization` and the ring is below
    /// `max_capacity`; shrinks when below `shrink_utilization` and above
    /// `min_capacity`; at most once per cooldown. Returns whether a
    /// resize happened.
    pub fn resize_based_on_utilization(&self, utilization: f64) -> bool {
        if !self.cooldown_elapsed() {
            return false;
        }

        let current = self.capacity();
        let target = if utilization > self.grow_utilization && current < self.max_capacity {
            (current * 2).min(self.max_capacity)
        } else if utilization < self.shrink_utilization && current > self.min_capacity {
            (current / 2).max(self.min_capacity)
        } else {
            return false;
        };

        // Shrinking below the pending sample count would lose data.
        if target <= self.available() {
            return false;
        }

        match self.swap_to(target) {
            Ok(()) => true,
            Err(_) => false,
        }
    }

    fn swap_to(&self, capacity: usize) -> Result<()> {
        let mut guard = self.ring.write();

        let pending = guard.available();
        if pending >= capacity {
            return Err(RippleError::config(
                "new capacity cannot hold pending samples",
            ));
        }

        let replacement = RingBuffer::new(capacity)?;
        let mut drained = vec![0.0; pending];
        let moved = guard.read_into(&mut drained);
        debug_assert_eq!(moved, pending);
        let written = replacement.write_batch(&drained);
        debug_assert_eq!(written, pending);

        let old_capacity = guard.capacity();
        *guard = replacement;
        drop(guard);

        *self.last_resize.lock() = Some(Instant::now());
        self.resizes.fetch_add(1, Ordering::Relaxed);
        debug!(old_capacity, new_capacity = capacity, pending, "ring resized");
        Ok(())
    }
}
