//! Sliding window view over the ingestion ring
//!
//! Yields overlapping fixed-length windows at a configured hop size.
//! Window access is zero-copy when the read region does not wrap the ring;
//! a wrapped window is materialised into a thread-local scratch buffer so
//! the copy path allocates once per consumer thread, not per window.

use std::cell::RefCell;
use std::sync::Arc;

use crate::buffer::resizable::ResizableRing;
use crate::error::{Result, RippleError};

thread_local! {
    static WINDOW_SCRATCH: RefCell<Vec<f64>> = const { RefCell::new(Vec::new()) };
}

/// Release the calling thread's window scratch buffer.
///
/// Call on consumer thread shutdown to avoid residual retention; the
/// buffer is recreated lazily if the thread processes windows again.
pub fn cleanup_thread() {
    WINDOW_SCRATCH.with(|scratch| {
        let mut scratch = scratch.borrow_mut();
        scratch.clear();
        scratch.shrink_to_fit();
    });
}

/// Overlapping-window reader layered on a [`ResizableRing`].
pub struct StreamingWindow {
    ring: Arc<ResizableRing>,
    window_size: usize,
    hop_size: usize,
}

impl StreamingWindow {
    /// Create a window reader. Requires `1 <= hop <= window` and a window
    /// no larger than the ring.
    pub fn new(ring: Arc<ResizableRing>, window_size: usize, hop_size: usize) -> Result<Self> {
        if window_size == 0 {
            return Err(RippleError::config("window size must be positive"));
        }
        if hop_size == 0 || hop_size > window_size {
            return Err(RippleError::config("hop must satisfy 1 <= hop <= window"));
        }
        if window_size > ring.capacity() {
            return Err(RippleError::config("window exceeds ring capacity"));
        }

        Ok(Self {
            ring,
            window_size,
            hop_size,
        })
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    /// Samples shared between consecutive windows
    pub fn overlap_size(&self) -> usize {
        self.window_size - self.hop_size
    }

    /// Whether a full window is buffered and ready
    pub fn has_window(&self) -> bool {
        self.ring.available() >= self.window_size
    }

    /// Run `f` over the current window.
    ///
    /// The closure receives the in-place ring slice when the window does
    /// not wrap, otherwise a thread-local scratch copy. Fails with
    /// `InvalidState` when no full window is buffered.
    pub fn process_window<R>(&self, f: impl FnOnce(&[f64]) -> R) -> Result<R> {
        let size = self.window_size;
        self.ring.with_ring(|ring| {
            if ring.available() < size {
                return Err(RippleError::state("no full window buffered"));
            }
            match ring.view(size) {
                Some(view) => Ok(f(view)),
                None => WINDOW_SCRATCH.with(|scratch| {
                    let mut scratch = scratch.borrow_mut();
                    scratch.resize(size, 0.0);
                    let copied = ring.peek_into(&mut scratch[..size], size);
                    debug_assert_eq!(copied, size);
                    Ok(f(&scratch[..size]))
                }),
            }
        })
    }

    /// Copy the current window into `dst` without advancing.
    pub fn window_copy(&self, dst: &mut [f64]) -> Result<()> {
        if dst.len() < self.window_size {
            return Err(RippleError::config("destination smaller than window"));
        }
        self.ring.with_ring(|ring| {
            if ring.available() < self.window_size {
                return Err(RippleError::state("no full window buffered"));
            }
            let copied = ring.peek_into(&mut dst[..self.window_size], self.window_size);
            debug_assert_eq!(copied, self.window_size);
            Ok(())
        })
    }

    /// Advance the read cursor by one hop, releasing `hop` ring slots.
    /// Advancing without a full window is an error.
    pub fn advance(&self) -> Result<()> {
        self.ring.with_ring(|ring| {
            if ring.available() < self.window_size {
                return Err(RippleError::state("advance without a full window"));
            }
            let skipped = ring.skip(self.hop_size);
            debug_assert_eq!(skipped, self.hop_size);
            Ok(())
        })
    }

    /// Feed `data` into the ring; returns whether a full window is now
    /// available. Fails with `CapacityExceeded` when the ring cannot take
    /// every sample.
    pub fn fill_for_streaming(&self, data: &[f64]) -> Result<bool> {
        let written = self.ring.write_batch(data);
        if written < data.len() {
            return Err(RippleError::CapacityExceeded { accepted: written });
        }
        Ok(self.has_window())
    }
}
