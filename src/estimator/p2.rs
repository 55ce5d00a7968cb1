//! P-squared online quantile estimation
//!
//! Jain/Chlamtac five-marker algorithm: O(1) memory and O(1) update,
//! tracking a single quantile of an unbounded stream. The five marker
//! heights stay ordered; a violated ordering is an internal invariant
//! failure and is fatal to the owning pipeline.

use parking_lot::Mutex;

use crate::error::{Result, RippleError};

const MARKERS: usize = 5;

/// Online estimator of the `p`-quantile of a stream.
///
/// Single-threaded; see [`SyncP2Quantile`] for the mutex-guarded variant.
#[derive(Debug, Clone)]
pub struct P2Quantile {
    p: f64,
    count: u64,
    heights: [f64; MARKERS],
    positions: [f64; MARKERS],
    desired: [f64; MARKERS],
    increments: [f64; MARKERS],
}

impl P2Quantile {
    /// Create an estimator for the `p`-quantile, `p` in `[0, 1]`.
    pub fn new(p: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&p) || !p.is_finite() {
            return Err(RippleError::config("quantile p must be in [0, 1]"));
        }
        Ok(Self {
            p,
            count: 0,
            heights: [0.0; MARKERS],
            positions: [0.0; MARKERS],
            desired: [0.0; MARKERS],
            increments: [0.0, p / 2.0, p, (1.0 + p) / 2.0, 1.0],
        })
    }

    /// Target quantile
    pub fn p(&self) -> f64 {
        self.p
    }

    /// Number of samples observed
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Discard all state, keeping the target quantile.
    pub fn reset(&mut self) {
        let p = self.p;
        *self = Self::new(p).expect("p was already validated");
    }

    /// Observe one sample.
    pub fn update(&mut self, x: f64) -> Result<()> {
        if !x.is_finite() {
            return Err(RippleError::signal("non-finite sample in quantile update"));
        }

        // Warm-up: store the first five samples verbatim, sorted.
        if self.count < MARKERS as u64 {
            let n = self.count as usize;
            let mut i = n;
            while i > 0 && self.heights[i - 1] > x {
                self.heights[i] = self.heights[i - 1];
                i -= 1;
            }
            self.heights[i] = x;
            self.count += 1;

            if self.count == MARKERS as u64 {
                self.positions = [1.0, 2.0, 3.0, 4.0, 5.0];
                let p = self.p;
                self.desired = [
                    1.0,
                    1.0 + 2.0 * p,
                    1.0 + 4.0 * p,
                    3.0 + 2.0 * p,
                    5.0,
                ];
            }
            return Ok(());
        }

        // Locate the cell and stretch the extreme markers.
        let cell = if x < self.heights[0] {
            self.heights[0] = x;
            0
        } else if x >= self.heights[4] {
            self.heights[4] = x;
            3
        } else {
            let mut cell = 0;
            for i in 1..MARKERS {
                if x < self.heights[i] {
                    cell = i - 1;
                    break;
                }
            }
            cell
        };

        for position in &mut self.positions[cell + 1..] {
            *position += 1.0;
        }
        for (desired, increment) in self.desired.iter_mut().zip(&self.increments) {
            *desired += increment;
        }
        self.count += 1;

        // Adjust the interior markers toward their desired positions.
        for i in 1..MARKERS - 1 {
            let offset = self.desired[i] - self.positions[i];
            let room_right = self.positions[i + 1] - self.positions[i] > 1.0;
            let room_left = self.positions[i - 1] - self.positions[i] < -1.0;

            if (offset >= 1.0 && room_right) || (offset <= -1.0 && room_left) {
                let step = offset.signum();
                let parabolic = self.parabolic(i, step);
                if self.heights[i - 1] < parabolic && parabolic < self.heights[i + 1] {
                    self.heights[i] = parabolic;
                } else {
                    self.heights[i] = self.linear(i, step);
                }
                self.positions[i] += step;
            }
        }

        // Marker heights must stay ordered; anything else is corruption.
        for i in 1..MARKERS {
            if self.heights[i] < self.heights[i - 1] {
                return Err(RippleError::internal("quantile marker order violated"));
            }
        }
        Ok(())
    }

    /// Piecewise-parabolic prediction for marker `i` moved by `step`.
    fn parabolic(&self, i: usize, step: f64) -> f64 {
        let q = &self.heights;
        let n = &self.positions;
        q[i]
            + step / (n[i + 1] - n[i - 1])
                * ((n[i] - n[i - 1] + step) * (q[i + 1] - q[i]) / (n[i + 1] - n[i])
                    + (n[i + 1] - n[i] - step) * (q[i] - q[i - 1]) / (n[i] - n[i - 1]))
    }

    /// Linear fallback when the parabola would break marker ordering.
    fn linear(&self, i: usize, step: f64) -> f64 {
        let q = &self.heights;
        let n = &self.positions;
        let j = if step > 0.0 { i + 1 } else { i - 1 };
        q[i] + step * (q[j] - q[i]) / (n[j] - n[i])
    }

    /// Current estimate: the middle marker height after warm-up, the
    /// empirical quantile of the stored samples before.
    pub fn quantile(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        if self.count >= MARKERS as u64 {
            return self.heights[2];
        }
        let n = self.count as usize;
        let rank = (self.p * (n - 1) as f64).round() as usize;
        self.heights[rank.min(n - 1)]
    }
}

/// Mutex-guarded P2 estimator for shared-thread use.
///
/// `quantile()` copies the middle marker under the lock so readers always
/// observe a consistent snapshot of the marker state.
pub struct SyncP2Quantile {
    inner: Mutex<P2Quantile>,
}

impl SyncP2Quantile {
    pub fn new(p: f64) -> Result<Self> {
        Ok(Self {
            inner: Mutex::new(P2Quantile::new(p)?),
        })
    }

    pub fn update(&self, x: f64) -> Result<()> {
        self.inner.lock().update(x)
    }

    pub fn quantile(&self) -> f64 {
        self.inner.lock().quantile()
    }

    pub fn count(&self) -> u64 {
        self.inner.lock().count()
    }

    pub fn reset(&self) {
        self.inner.lock().reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::sync::Arc;

    #[test]
    fn test_invalid_p_rejected() {
        assert!(P2Quantile::new(-0.1).is_err());
        assert!(P2Quantile::new(1.1).is_err());
        assert!(P2Quantile::new(f64::NAN).is_err());
        assert!(P2Quantile::new(0.0).is_ok());
        assert!(P2Quantile::new(1.0).is_ok());
    }

    #[test]
    fn test_small_sample_empirical_quantile() {
        let mut q = P2Quantile::new(0.5).unwrap();
        assert_eq!(q.quantile(), 0.0);
        for x in [5.0, 1.0, 3.0] {
            q.update(x).unwrap();
        }
        assert_eq!(q.count(), 3);
        assert_eq!(q.quantile(), 3.0);
    }

    #[test]
    fn test_non_finite_rejected() {
        let mut q = P2Quantile::new(0.5).unwrap();
        assert!(q.update(f64::NAN).is_err());
        assert!(q.update(f64::INFINITY).is_err());
        assert_eq!(q.count(), 0);
    }

    #[test]
    fn test_median_of_uniform_stream() {
        let mut q = P2Quantile::new(0.5).unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..5000 {
            q.update(rng.gen::<f64>()).unwrap();
        }
        let estimate = q.quantile();
        assert!(
            (estimate - 0.5).abs() < 0.025,
            "median estimate {estimate} too far from 0.5"
        );
    }

    #[test]
    fn test_tail_quantile_accuracy() {
        let mut q = P2Quantile::new(0.9).unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..5000 {
            q.update(rng.gen::<f64>()).unwrap();
        }
        let estimate = q.quantile();
        assert!(
            (estimate - 0.9).abs() < 0.9 * 0.05,
            "p90 estimate {estimate} outside 5% of 0.9"
        );
    }

    #[test]
    fn test_markers_stay_ordered_under_adversarial_input() {
        let mut q = P2Quantile::new(0.5).unwrap();
        // Alternating extremes, ramps, and repeats.
        for i in 0..2000 {
            let x = match i % 4 {
                0 => -1000.0,
                1 => 1000.0,
                2 => (i as f64).sin(),
                _ => 0.0,
            };
            q.update(x).unwrap();
        }
    }

    #[test]
    fn test_reset_clears_state() {
        let mut q = P2Quantile::new(0.25).unwrap();
        for i in 0..100 {
            q.update(i as f64).unwrap();
        }
        q.reset();
        assert_eq!(q.count(), 0);
        assert_eq!(q.quantile(), 0.0);
        assert_eq!(q.p(), 0.25);
    }

    #[test]
    fn test_sync_variant_across_threads() {
        let q = Arc::new(SyncP2Quantile::new(0.5).unwrap());
        let writers: Vec<_> = (0..4)
            .map(|t| {
                let q = Arc::clone(&q);
                std::thread::spawn(move || {
                    let mut rng = StdRng::seed_from_u64(42 + t);
                    for _ in 0..2000 {
                        q.update(rng.gen::<f64>()).unwrap();
                        let snapshot = q.quantile();
                        assert!(snapshot.is_finite());
                    }
                })
            })
            .collect();
        for handle in writers {
            handle.join().unwrap();
        }
        assert_eq!(q.count(), 8000);
        assert!((q.quantile() - 0.5).abs() < 0.05);
    }
}
