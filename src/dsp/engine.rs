//! Per-window denoising
//!
//! Stateless operation over one window: decompose through the configured
//! number of levels, feed the finest detail band into the noise
//! estimator, derive the threshold, shrink every detail band, and
//! reconstruct. The engine owns no signal state; the estimator and
//! adapter are passed in per call so the pipeline controls their
//! lifetime.

use std::sync::Arc;

use crate::config::ThresholdType;
use crate::error::{Result, RippleError};
use crate::estimator::adapter::ThresholdAdapter;
use crate::estimator::mad::{MadEstimator, ThresholdMethod};
use crate::pool::{ScratchBuf, SharedPool};
use crate::wavelet::{BoundaryMode, Wavelet, WaveletTransform};

/// Result of denoising one window
#[derive(Debug, Clone)]
pub struct DenoiseOutcome {
    /// Reconstructed block, same length as the input window
    pub samples: Vec<f64>,
    /// Threshold applied to the detail bands
    pub threshold: f64,
    /// Smoothed noise level after this window
    pub noise_level: f64,
}

pub struct DenoiseEngine {
    wavelet: Wavelet,
    mode: BoundaryMode,
    levels: usize,
    threshold_type: ThresholdType,
    method: ThresholdMethod,
    multiplier: f64,
    transform: Box<dyn WaveletTransform>,
    pool: Option<Arc<SharedPool>>,
}

impl DenoiseEngine {
    pub fn new(
        wavelet: Wavelet,
        mode: BoundaryMode,
        levels: usize,
        threshold_type: ThresholdType,
        method: ThresholdMethod,
        multiplier: f64,
        transform: Box<dyn WaveletTransform>,
        pool: Option<Arc<SharedPool>>,
    ) -> Result<Self> {
        if levels == 0 {
            return Err(RippleError::config("levels must be at least 1"));
        }
        if !(multiplier > 0.0) || !multiplier.is_finite() {
            return Err(RippleError::config("threshold multiplier must be > 0"));
        }
        Ok(Self {
            wavelet,
            mode,
            levels,
            threshold_type,
            method,
            multiplier,
            transform,
            pool,
        })
    }

    /// Denoise one window.
    ///
    /// When `adapter` is provided, the noise level drives its target and
    /// the smoothed adapter output scales the threshold; otherwise the
    /// estimator's threshold applies directly.
    pub fn denoise(
        &self,
        input: &[f64],
        estimator: &mut MadEstimator,
        mut adapter: Option<&mut ThresholdAdapter>,
    ) -> Result<DenoiseOutcome> {
        if input.is_empty() {
            return Err(RippleError::signal("denoise input is empty"));
        }
        if let Some(bad) = input.iter().find(|x| !x.is_finite()) {
            return Err(RippleError::signal(format!(
                "non-finite sample {bad} in denoise input"
            )));
        }

        // A single sample carries no detail band to shrink.
        if input.len() == 1 {
            return Ok(DenoiseOutcome {
                samples: input.to_vec(),
                threshold: 0.0,
                noise_level: estimator.current_level(),
            });
        }

        // Decompose, recursing on the approximation. Stops early when a
        // level would be odd-length (non power-of-two blocks).
        let mut details: Vec<ScratchBuf> = Vec::with_capacity(self.levels);
        let mut current = ScratchBuf::alloc(self.pool.as_ref(), input.len());
        current.copy_from_slice(input);

        for _ in 0..self.levels {
            let n = current.len();
            if n < 2 || n % 2 != 0 {
                break;
            }
            let mut approx = ScratchBuf::alloc(self.pool.as_ref(), n / 2);
            let mut detail = ScratchBuf::alloc(self.pool.as_ref(), n / 2);
            self.transform
                .forward(&self.wavelet, self.mode, &current, &mut approx, &mut detail)?;
            details.push(detail);
            current = approx;
        }

        // Odd-length input admits no decomposition level; nothing to shrink.
        if details.is_empty() {
            return Ok(DenoiseOutcome {
                samples: input.to_vec(),
                threshold: 0.0,
                noise_level: estimator.current_level(),
            });
        }

        // Finest detail band calibrates the noise estimator.
        estimator.update(&details[0])?;
        let sigma = estimator.current_level();

        let factor = estimator.threshold_factor(self.method);
        let (sigma_eff, threshold) = match adapter.as_deref_mut() {
            Some(adapter) => {
                adapter.set_target(sigma);
                adapter.tick();
                let smoothed = adapter.current();
                (smoothed, smoothed * factor * self.multiplier)
            }
            None => (sigma, sigma * factor * self.multiplier),
        };

        for band in &mut details {
            let lambda = match self.method {
                ThresholdMethod::Bayes => bayes_threshold(band, sigma_eff) * self.multiplier,
                _ => threshold,
            };
            apply_threshold(self.threshold_type, band, lambda);
        }

        // Reconstruct from the deepest approximation back up.
        for detail in details.iter().rev() {
            let mut output = ScratchBuf::alloc(self.pool.as_ref(), detail.len() * 2);
            self.transform
                .inverse(&self.wavelet, self.mode, &current, detail, &mut output)?;
            current = output;
        }

        Ok(DenoiseOutcome {
            samples: current.to_vec(),
            threshold,
            noise_level: sigma,
        })
    }
}

#[inline]
fn apply_threshold(kind: ThresholdType, band: &mut [f64], lambda: f64) {
    match kind {
        ThresholdType::Soft => {
            for x in band {
                *x = x.signum() * (x.abs() - lambda).max(0.0);
            }
        }
        ThresholdType::Hard => {
            for x in band {
                if x.abs() <= lambda {
                    *x = 0.0;
                }
            }
        }
    }
}

/// BayesShrink: `lambda = sigma^2 / sigma_x` with the signal deviation
/// `sigma_x = sqrt(max(E[d^2] - sigma^2, 0))`. A vanishing signal
/// deviation kills the band.
fn bayes_threshold(band: &[f64], sigma: f64) -> f64 {
    let energy = band.iter().map(|d| d * d).sum::<f64>() / band.len() as f64;
    let signal_var = (energy - sigma * sigma).max(0.0);
    if signal_var <= f64::EPSILON {
        return band.iter().fold(0.0, |m, d| m.max(d.abs()));
    }
    sigma * sigma / signal_var.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wavelet::transform::{FastTransform, QualityTransform};
    use crate::wavelet::WaveletFamily;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn engine(
        family: WaveletFamily,
        levels: usize,
        kind: ThresholdType,
        method: ThresholdMethod,
    ) -> DenoiseEngine {
        DenoiseEngine::new(
            Wavelet::new(family),
            BoundaryMode::Periodic,
            levels,
            kind,
            method,
            1.0,
            Box::new(FastTransform),
            None,
        )
        .unwrap()
    }

    fn noisy_sine(rng: &mut StdRng, n: usize, sigma: f64) -> (Vec<f64>, Vec<f64>) {
        let clean: Vec<f64> = (0..n)
            .map(|i| (2.0 * std::f64::consts::PI * 4.0 * i as f64 / n as f64).sin())
            .collect();
        let noisy: Vec<f64> = clean
            .iter()
            .map(|c| {
                let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
                let u2: f64 = rng.gen::<f64>();
                c + sigma
                    * (-2.0 * u1.ln()).sqrt()
                    * (2.0 * std::f64::consts::PI * u2).cos()
            })
            .collect();
        (clean, noisy)
    }

    #[test]
    fn test_single_sample_passes_through() {
        let eng = engine(WaveletFamily::Haar, 1, ThresholdType::Soft, ThresholdMethod::Universal);
        let mut est = MadEstimator::new(0.5).unwrap();
        let out = eng.denoise(&[3.25], &mut est, None).unwrap();
        assert_eq!(out.samples, vec![3.25]);
        assert_eq!(out.threshold, 0.0);
    }

    #[test]
    fn test_non_finite_rejected() {
        let eng = engine(WaveletFamily::Haar, 1, ThresholdType::Soft, ThresholdMethod::Universal);
        let mut est = MadEstimator::new(0.5).unwrap();
        assert!(eng.denoise(&[1.0, f64::NAN], &mut est, None).is_err());
        assert!(eng.denoise(&[], &mut est, None).is_err());
    }

    #[test]
    fn test_constant_input_is_preserved() {
        let eng = engine(WaveletFamily::Haar, 1, ThresholdType::Soft, ThresholdMethod::Universal);
        let mut est = MadEstimator::new(0.5).unwrap();
        let input = vec![1.0; 128];
        let out = eng.denoise(&input, &mut est, None).unwrap();
        // Zero detail -> zero noise estimate -> zero threshold.
        assert_eq!(out.threshold, 0.0);
        for (x, y) in input.iter().zip(&out.samples) {
            assert!((x - y).abs() <= f64::EPSILON, "{x} became {y}");
        }
    }

    #[test]
    fn test_noise_energy_is_reduced() {
        let eng = engine(WaveletFamily::Db4, 1, ThresholdType::Soft, ThresholdMethod::Universal);
        let mut est = MadEstimator::new(0.0).unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        let (clean, noisy) = noisy_sine(&mut rng, 256, 0.3);

        let out = eng.denoise(&noisy, &mut est, None).unwrap();
        assert!(out.threshold > 0.0);

        let err_before: f64 = clean
            .iter()
            .zip(&noisy)
            .map(|(c, n)| (c - n) * (c - n))
            .sum();
        let err_after: f64 = clean
            .iter()
            .zip(&out.samples)
            .map(|(c, d)| (c - d) * (c - d))
            .sum();
        assert!(
            err_after < err_before,
            "denoising increased error: {err_after} >= {err_before}"
        );
    }

    #[test]
    fn test_multi_level_reconstruction_length() {
        let eng = engine(WaveletFamily::Haar, 3, ThresholdType::Hard, ThresholdMethod::Minimax);
        let mut est = MadEstimator::new(0.5).unwrap();
        let input: Vec<f64> = (0..64).map(|i| (i as f64 * 0.2).sin()).collect();
        let out = eng.denoise(&input, &mut est, None).unwrap();
        assert_eq!(out.samples.len(), 64);
    }

    #[test]
    fn test_adapter_smooths_threshold_jumps() {
        let eng = engine(WaveletFamily::Db2, 1, ThresholdType::Soft, ThresholdMethod::Universal);
        let mut est = MadEstimator::new(0.0).unwrap();
        let mut adapter = ThresholdAdapter::new(5.0, 50.0, 1.0, 0.0, 1e9).unwrap();
        let mut rng = StdRng::seed_from_u64(42);

        let (_, quiet) = noisy_sine(&mut rng, 128, 0.05);
        let (_, loud) = noisy_sine(&mut rng, 128, 0.8);

        let first = eng.denoise(&quiet, &mut est, Some(&mut adapter)).unwrap();
        let second = eng.denoise(&loud, &mut est, Some(&mut adapter)).unwrap();
        let third = eng.denoise(&loud, &mut est, Some(&mut adapter)).unwrap();

        assert!(second.threshold > first.threshold);
        assert!(third.threshold > second.threshold, "adapter keeps rising toward the louder target");
    }

    #[test]
    fn test_hard_threshold_zeroes_small_coefficients() {
        let mut band = [0.1, -0.5, 2.0, -3.0];
        apply_threshold(ThresholdType::Hard, &mut band, 1.0);
        assert_eq!(band, [0.0, 0.0, 2.0, -3.0]);
    }

    #[test]
    fn test_soft_threshold_shrinks_toward_zero() {
        let mut band = [0.5, -2.0, 3.0];
        apply_threshold(ThresholdType::Soft, &mut band, 1.0);
        assert_eq!(band, [0.0, -1.0, 2.0]);
    }

    #[test]
    fn test_bayes_kills_pure_noise_band() {
        // Energy at the noise floor leaves no signal variance.
        let band = [0.1, -0.1, 0.1, -0.1];
        let lambda = bayes_threshold(&band, 0.5);
        assert!(lambda >= 0.1, "band should be killed, got lambda {lambda}");
    }

    #[test]
    fn test_quality_variant_matches_fast() {
        let make = |transform: Box<dyn WaveletTransform>| {
            DenoiseEngine::new(
                Wavelet::new(WaveletFamily::Db4),
                BoundaryMode::Periodic,
                2,
                ThresholdType::Soft,
                ThresholdMethod::Universal,
                1.0,
                transform,
                None,
            )
            .unwrap()
        };
        let mut rng = StdRng::seed_from_u64(42);
        let (_, noisy) = noisy_sine(&mut rng, 256, 0.2);

        let mut est_a = MadEstimator::new(0.5).unwrap();
        let mut est_b = MadEstimator::new(0.5).unwrap();
        let fast = make(Box::new(FastTransform)).denoise(&noisy, &mut est_a, None).unwrap();
        let quality = make(Box::new(QualityTransform)).denoise(&noisy, &mut est_b, None).unwrap();

        for (a, b) in fast.samples.iter().zip(&quality.samples) {
            assert!((a - b).abs() < 1e-9, "variants diverge: {a} vs {b}");
        }
    }
}
