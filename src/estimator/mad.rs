//! Online MAD noise estimation and threshold selection
//!
//! Estimates the noise standard deviation of a coefficient stream from
//! the median absolute deviation: one P2 estimator tracks the running
//! median, a second tracks the median of |x - median|. `sigma ~= 1.4826 *
//! MAD` for Gaussian noise, smoothed exponentially across batches. MAD's
//! 50% breakdown point keeps outliers from dominating the estimate.

use serde::{Deserialize, Serialize};

use crate::constants::{
    MAD_SCALE, MINIMAX_INTERCEPT, MINIMAX_MIN_SAMPLES, MINIMAX_SLOPE, SURE_STREAMING_FACTOR,
};
use crate::error::{Result, RippleError};

use super::p2::P2Quantile;

/// Threshold selection rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThresholdMethod {
    /// `sigma * sqrt(2 ln n)`
    Universal,
    /// Universal scaled by the streaming SURE factor (always >= Universal)
    Sure,
    /// `sigma * (0.3936 + 0.1829 log2 n)` for n >= 32, else `sigma`
    Minimax,
    /// BayesShrink; computed per detail band by the engine, falls back to
    /// Universal at the estimator level
    Bayes,
}

/// Streaming noise-level estimator.
pub struct MadEstimator {
    median: P2Quantile,
    deviation: P2Quantile,
    alpha: f64,
    level: f64,
    samples: u64,
}

impl MadEstimator {
    /// Create an estimator with smoothing coefficient `alpha` in `[0, 1]`
    /// (0 = no memory, 1 = frozen).
    pub fn new(alpha: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&alpha) || !alpha.is_finite() {
            return Err(RippleError::config("smoothing alpha must be in [0, 1]"));
        }
        Ok(Self {
            median: P2Quantile::new(0.5)?,
            deviation: P2Quantile::new(0.5)?,
            alpha,
            level: 0.0,
            samples: 0,
        })
    }

    /// Smoothed noise standard deviation estimate
    pub fn current_level(&self) -> f64 {
        self.level
    }

    /// Total samples observed
    pub fn sample_count(&self) -> u64 {
        self.samples
    }

    /// Discard all state.
    pub fn reset(&mut self) {
        self.median.reset();
        self.deviation.reset();
        self.level = 0.0;
        self.samples = 0;
    }

    /// Observe a batch of coefficients. An empty batch leaves the state
    /// untouched; a non-finite sample rejects the whole batch before any
    /// mutation.
    pub fn update(&mut self, batch: &[f64]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        if let Some(bad) = batch.iter().find(|x| !x.is_finite()) {
            return Err(RippleError::signal(format!(
                "non-finite coefficient {bad} in noise update"
            )));
        }

        for &x in batch {
            self.median.update(x)?;
            let median = self.median.quantile();
            self.deviation.update((x - median).abs())?;
        }

        let fresh = MAD_SCALE * self.deviation.quantile();
        self.level = if self.samples == 0 {
            fresh
        } else {
            self.alpha * self.level + (1.0 - self.alpha) * fresh
        };
        self.samples += batch.len() as u64;
        Ok(())
    }

    /// Observe a batch and return the updated noise level. Empty input
    /// returns 0 and does not touch state.
    pub fn estimate(&mut self, batch: &[f64]) -> Result<f64> {
        if batch.is_empty() {
            return Ok(0.0);
        }
        self.update(batch)?;
        Ok(self.level)
    }

    /// Dimensionless threshold factor: `threshold(method) / sigma`.
    ///
    /// Split out so an adaptive controller can substitute its own smoothed
    /// sigma while keeping the sample-count-dependent part.
    pub fn threshold_factor(&self, method: ThresholdMethod) -> f64 {
        let n = self.samples.max(1) as f64;
        let universal = (2.0 * n.ln()).sqrt();
        match method {
            ThresholdMethod::Universal => universal,
            ThresholdMethod::Sure => universal * SURE_STREAMING_FACTOR,
            ThresholdMethod::Minimax => {
                if self.samples >= MINIMAX_MIN_SAMPLES {
                    MINIMAX_INTERCEPT + MINIMAX_SLOPE * n.log2()
                } else {
                    1.0
                }
            }
            ThresholdMethod::Bayes => universal,
        }
    }

    /// Denoising threshold for the selected rule.
    pub fn threshold(&self, method: ThresholdMethod) -> f64 {
        self.level * self.threshold_factor(method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn gaussian_batch(rng: &mut StdRng, n: usize, sigma: f64) -> Vec<f64> {
        // Box-Muller over uniform pairs.
        (0..n)
            .map(|_| {
                let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
                let u2: f64 = rng.gen::<f64>();
                sigma
                    * (-2.0 * u1.ln()).sqrt()
                    * (2.0 * std::f64::consts::PI * u2).cos()
            })
            .collect()
    }

    #[test]
    fn test_invalid_alpha_rejected() {
        assert!(MadEstimator::new(-0.5).is_err());
        assert!(MadEstimator::new(1.5).is_err());
        assert!(MadEstimator::new(0.9).is_ok());
    }

    #[test]
    fn test_empty_batch_is_noop() {
        let mut est = MadEstimator::new(0.5).unwrap();
        assert_eq!(est.estimate(&[]).unwrap(), 0.0);
        assert_eq!(est.sample_count(), 0);
        assert_eq!(est.current_level(), 0.0);
    }

    #[test]
    fn test_nan_rejected_without_mutation() {
        let mut est = MadEstimator::new(0.5).unwrap();
        est.update(&[1.0, -1.0, 2.0]).unwrap();
        let before = (est.current_level(), est.sample_count());
        assert!(est.update(&[0.5, f64::NAN]).is_err());
        assert_eq!((est.current_level(), est.sample_count()), before);
    }

    #[test]
    fn test_gaussian_sigma_recovery() {
        let mut est = MadEstimator::new(0.0).unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        let batch = gaussian_batch(&mut rng, 1000, 0.3);
        let level = est.estimate(&batch).unwrap();
        assert!(
            (level - 0.3).abs() < 0.3 * 0.3,
            "estimated sigma {level} outside 30% of 0.3"
        );
    }

    #[test]
    fn test_outliers_do_not_dominate() {
        let mut est = MadEstimator::new(0.0).unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        let sigma = 0.2;
        let mut batch = gaussian_batch(&mut rng, 900, sigma);
        // 10% contamination at 50x the true sigma.
        batch.extend(gaussian_batch(&mut rng, 100, 50.0 * sigma));
        let level = est.estimate(&batch).unwrap();
        assert!(
            level < 5.0 * sigma,
            "contaminated estimate {level} exceeds 5x sigma"
        );
    }

    #[test]
    fn test_threshold_orderings() {
        let mut est = MadEstimator::new(0.5).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        est.update(&gaussian_batch(&mut rng, 500, 1.0)).unwrap();

        let universal = est.threshold(ThresholdMethod::Universal);
        let sure = est.threshold(ThresholdMethod::Sure);
        let minimax = est.threshold(ThresholdMethod::Minimax);
        assert!(universal > 0.0);
        assert!(sure >= universal, "SURE {sure} < Universal {universal}");
        assert!(minimax > 0.0 && minimax < universal);
    }

    #[test]
    fn test_minimax_small_sample_degenerates_to_sigma() {
        let mut est = MadEstimator::new(0.0).unwrap();
        est.update(&[1.0, -2.0, 0.5, 1.5, -0.7]).unwrap();
        assert!(est.sample_count() < MINIMAX_MIN_SAMPLES);
        let factor = est.threshold_factor(ThresholdMethod::Minimax);
        assert_eq!(factor, 1.0);
    }

    #[test]
    fn test_smoothing_tracks_slowly() {
        let mut est = MadEstimator::new(0.9).unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        est.update(&gaussian_batch(&mut rng, 500, 0.1)).unwrap();
        let low = est.current_level();
        est.update(&gaussian_batch(&mut rng, 500, 1.0)).unwrap();
        let after = est.current_level();
        assert!(after > low, "level should rise toward the louder noise");
        assert!(after < 1.0, "smoothing should damp the jump");
    }

    #[test]
    fn test_reset() {
        let mut est = MadEstimator::new(0.5).unwrap();
        est.update(&[3.0, -1.0, 2.0]).unwrap();
        est.reset();
        assert_eq!(est.sample_count(), 0);
        assert_eq!(est.current_level(), 0.0);
    }
}
