//! Overlap-add reconstruction of processed blocks
//!
//! Stitches consecutive equal-length denoised blocks back into one
//! continuous stream. Each block is multiplied by a window function; the
//! first `overlap` windowed samples are summed with the tail carried from
//! the previous block, and the stream advances by `hop` samples per block.
//! The tail stores only `overlap` samples, not a full block.
//!
//! Window coefficient arrays are cached process-wide in a bounded LRU map
//! keyed by `(block_size, overlap_factor, function)`.

use std::collections::{HashMap, VecDeque};
use std::f64::consts::PI;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::constants::WINDOW_CACHE_CAPACITY;
use crate::error::{Result, RippleError};

/// Analysis window applied to each processed block before overlap-add
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WindowFunction {
    Rectangular,
    /// Periodic Hann; sums to unity at 50% overlap
    Hann,
    /// Periodic Hamming
    Hamming,
    /// Tukey with taper ratio 0.5
    Tukey,
}

impl WindowFunction {
    /// Compute the `size` coefficients of this window.
    pub fn coefficients(&self, size: usize) -> Vec<f64> {
        let n = size as f64;
        match self {
            Self::Rectangular => vec![1.0; size],
            Self::Hann => (0..size)
                .map(|k| 0.5 * (1.0 - (2.0 * PI * k as f64 / n).cos()))
                .collect(),
            Self::Hamming => (0..size)
                .map(|k| 0.54 - 0.46 * (2.0 * PI * k as f64 / n).cos())
                .collect(),
            Self::Tukey => {
                // Taper ratio 0.5: cosine ramps over the outer quarters.
                let taper = 0.5;
                let edge = (taper * (n - 1.0) / 2.0).floor();
                (0..size)
                    .map(|k| {
                        let k = k as f64;
                        if k < edge {
                            0.5 * (1.0 + (PI * (2.0 * k / (taper * (n - 1.0)) - 1.0)).cos())
                        } else if k > (n - 1.0) - edge {
                            0.5 * (1.0
                                + (PI * (2.0 * k / (taper * (n - 1.0)) - 2.0 / taper + 1.0))
                                    .cos())
                        } else {
                            1.0
                        }
                    })
                    .collect()
            }
        }
    }
}

type CacheKey = (usize, u64, WindowFunction);

struct WindowCache {
    entries: HashMap<CacheKey, Arc<[f64]>>,
    order: VecDeque<CacheKey>,
    capacity: usize,
}

impl WindowCache {
    fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    fn get_or_insert(&mut self, key: CacheKey, build: impl FnOnce() -> Vec<f64>) -> Arc<[f64]> {
        if let Some(found) = self.entries.get(&key) {
            let found = Arc::clone(found);
            // Touch: move to most-recently-used.
            if let Some(pos) = self.order.iter().position(|k| *k == key) {
                self.order.remove(pos);
            }
            self.order.push_back(key);
            return found;
        }

        let built: Arc<[f64]> = build().into();
        self.entries.insert(key, Arc::clone(&built));
        self.order.push_back(key);
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.entries.remove(&evicted);
            }
        }
        built
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

static WINDOW_CACHE: Lazy<Mutex<WindowCache>> =
    Lazy::new(|| Mutex::new(WindowCache::new(WINDOW_CACHE_CAPACITY)));

/// Fetch (or compute and cache) the window coefficients for a block shape.
pub fn cached_window(
    block_size: usize,
    overlap_factor: f64,
    function: WindowFunction,
) -> Arc<[f64]> {
    let key = (block_size, overlap_factor.to_bits(), function);
    WINDOW_CACHE
        .lock()
        .get_or_insert(key, || function.coefficients(block_size))
}

/// Drop all cached window coefficient arrays.
pub fn clear_window_cache() {
    WINDOW_CACHE.lock().clear();
}

/// Overlap-add state machine.
///
/// The first processed block is emitted whole (`block_size` samples);
/// every subsequent block yields `hop = block_size - overlap` samples,
/// so after N blocks the emitted length is `block_size + (N-1) * hop`.
pub struct OverlapBuffer {
    block_size: usize,
    overlap: usize,
    hop: usize,
    window: Arc<[f64]>,
    /// Carried partial sums for the next `overlap` output samples
    tail: Vec<f64>,
    first_emitted: bool,
}

impl OverlapBuffer {
    pub fn new(
        block_size: usize,
        overlap_factor: f64,
        function: WindowFunction,
    ) -> Result<Self> {
        if block_size == 0 {
            return Err(RippleError::config("block size must be positive"));
        }
        if !(0.0..1.0).contains(&overlap_factor) {
            return Err(RippleError::config("overlap factor must be in [0, 1)"));
        }

        let overlap = (block_size as f64 * overlap_factor).floor() as usize;
        Ok(Self {
            block_size,
            overlap,
            hop: block_size - overlap,
            window: cached_window(block_size, overlap_factor, function),
            tail: vec![0.0; overlap],
            first_emitted: false,
        })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    pub fn hop(&self) -> usize {
        self.hop
    }

    /// Stitch the next processed block into the output stream.
    ///
    /// Returns the emitted fragment: the full windowed block on the first
    /// call, `hop` samples afterwards.
    pub fn process(&mut self, block: &[f64]) -> Result<Vec<f64>> {
        if block.len() != self.block_size {
            return Err(RippleError::signal(format!(
                "block length {} does not match configured {}",
                block.len(),
                self.block_size
            )));
        }

        let windowed: Vec<f64> = block
            .iter()
            .zip(self.window.iter())
            .map(|(x, w)| x * w)
            .collect();

        if self.overlap == 0 {
            return Ok(windowed);
        }

        if !self.first_emitted {
            self.first_emitted = true;
            self.tail.copy_from_slice(&windowed[self.hop..]);
            return Ok(windowed);
        }

        // Combined stream for this block: summed overlap region, then the
        // untouched middle of the windowed block.
        let mut combined = windowed;
        for (c, t) in combined.iter_mut().zip(&self.tail) {
            *c += t;
        }

        let fragment = combined[..self.hop].to_vec();
        self.tail.copy_from_slice(&combined[self.hop..]);
        Ok(fragment)
    }

    /// Emit the carried tail and clear it. The pipeline publishes this as
    /// the final fragment on flush.
    pub fn take_tail(&mut self) -> Vec<f64> {
        let tail = std::mem::take(&mut self.tail);
        self.tail = vec![0.0; self.overlap];
        tail
    }

    /// Whether any block has been processed since the last reset
    pub fn started(&self) -> bool {
        self.first_emitted
    }

    /// Clear the tail and the first-block flag.
    pub fn reset(&mut self) {
        self.tail.fill(0.0);
        self.first_emitted = false;
    }
}
