//! Pipeline configuration
//!
//! Validated, builder-style configuration record for the streaming
//! denoiser. Constructors return `Result` so invalid combinations are
//! rejected before a pipeline is built; `validate()` re-checks the full
//! record at build time.

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_ATTACK_MS, DEFAULT_BLOCK_SIZE, DEFAULT_BUFFER_MULTIPLIER, DEFAULT_GROW_UTILIZATION,
    DEFAULT_NOISE_BUFFER_FACTOR, DEFAULT_RELEASE_MS, DEFAULT_RESIZE_COOLDOWN_MS,
    DEFAULT_SAMPLE_RATE_HZ, DEFAULT_SHRINK_UTILIZATION, DEFAULT_THRESHOLD_MULTIPLIER,
    MAX_RING_CAPACITY, MIN_BLOCK_SIZE, MIN_RING_CAPACITY,
};
use crate::dsp::overlap::WindowFunction;
use crate::error::{Result, RippleError};
use crate::estimator::mad::ThresholdMethod;
use crate::wavelet::{BoundaryMode, WaveletFamily};

/// Thresholding rule applied to detail coefficients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThresholdType {
    /// `sign(x) * max(|x| - lambda, 0)`
    Soft,
    /// `x` when `|x| > lambda`, else 0
    Hard,
}

/// Which transform variant the pipeline instantiates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImplStrategy {
    /// Fast for small blocks or adaptive-overlap configurations, quality
    /// otherwise
    Auto,
    Fast,
    Quality,
}

/// Full configuration of a [`StreamingPipeline`](crate::StreamingPipeline).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenoiseConfig {
    /// Wavelet filter pair passed to the transform
    pub wavelet: WaveletFamily,
    pub boundary_mode: BoundaryMode,
    /// Window length in samples; even, at least 16
    pub block_size: usize,
    /// Fraction of each window shared with the next, in `[0, 1)`
    pub overlap_factor: f64,
    /// Decomposition depth
    pub levels: usize,
    pub threshold_method: ThresholdMethod,
    pub threshold_type: ThresholdType,
    /// Drive the threshold through the attack/release adapter
    pub adaptive_threshold: bool,
    /// Scalar applied to the selected threshold, > 0
    pub threshold_multiplier: f64,
    pub attack_time_ms: f64,
    pub release_time_ms: f64,
    /// Noise-estimator history factor, >= 1; maps to the smoothing
    /// coefficient `alpha = 1 - 1/factor`
    pub noise_buffer_factor: f64,
    /// Share work buffers through the process-wide slab pool
    pub use_shared_pool: bool,
    pub window_function: WindowFunction,
    pub strategy: ImplStrategy,
    /// Time base for the adapter's per-block period
    pub sample_rate_hz: f64,
    /// Let the supervisor grow/shrink the ingestion ring
    pub adaptive_resize: bool,
    pub resize_cooldown_ms: u64,
    pub grow_utilization: f64,
    pub shrink_utilization: f64,
    /// Initial ring capacity = block_size * buffer_multiplier, rounded up
    pub buffer_multiplier: usize,
    pub min_ring_capacity: usize,
    pub max_ring_capacity: usize,
}

impl Default for DenoiseConfig {
    fn default() -> Self {
        Self {
            wavelet: WaveletFamily::Db4,
            boundary_mode: BoundaryMode::Periodic,
            block_size: DEFAULT_BLOCK_SIZE,
            overlap_factor: 0.0,
            levels: 1,
            threshold_method: ThresholdMethod::Universal,
            threshold_type: ThresholdType::Soft,
            adaptive_threshold: false,
            threshold_multiplier: DEFAULT_THRESHOLD_MULTIPLIER,
            attack_time_ms: DEFAULT_ATTACK_MS,
            release_time_ms: DEFAULT_RELEASE_MS,
            noise_buffer_factor: DEFAULT_NOISE_BUFFER_FACTOR,
            use_shared_pool: false,
            window_function: WindowFunction::Rectangular,
            strategy: ImplStrategy::Auto,
            sample_rate_hz: DEFAULT_SAMPLE_RATE_HZ,
            adaptive_resize: true,
            resize_cooldown_ms: DEFAULT_RESIZE_COOLDOWN_MS,
            grow_utilization: DEFAULT_GROW_UTILIZATION,
            shrink_utilization: DEFAULT_SHRINK_UTILIZATION,
            buffer_multiplier: DEFAULT_BUFFER_MULTIPLIER,
            min_ring_capacity: MIN_RING_CAPACITY,
            max_ring_capacity: MAX_RING_CAPACITY,
        }
    }
}

impl DenoiseConfig {
    /// Start from defaults with the given window length.
    pub fn new(block_size: usize) -> Result<Self> {
        let config = Self {
            block_size,
            ..Default::default()
        };
        config.check_block_size()?;
        Ok(config)
    }

    pub fn with_wavelet(mut self, wavelet: WaveletFamily) -> Self {
        self.wavelet = wavelet;
        self
    }

    pub fn with_boundary_mode(mut self, mode: BoundaryMode) -> Self {
        self.boundary_mode = mode;
        self
    }

    pub fn with_overlap(mut self, factor: f64) -> Result<Self> {
        if !(0.0..1.0).contains(&factor) {
            return Err(RippleError::config("overlap factor must be in [0, 1)"));
        }
        self.overlap_factor = factor;
        Ok(self)
    }

    pub fn with_levels(mut self, levels: usize) -> Result<Self> {
        if levels == 0 {
            return Err(RippleError::config("levels must be at least 1"));
        }
        self.levels = levels;
        Ok(self)
    }

    pub fn with_threshold(mut self, method: ThresholdMethod, kind: ThresholdType) -> Self {
        self.threshold_method = method;
        self.threshold_type = kind;
        self
    }

    pub fn with_threshold_multiplier(mut self, multiplier: f64) -> Result<Self> {
        if !(multiplier > 0.0) || !multiplier.is_finite() {
            return Err(RippleError::config("threshold multiplier must be > 0"));
        }
        self.threshold_multiplier = multiplier;
        Ok(self)
    }

    pub fn with_adaptive_threshold(mut self, enabled: bool) -> Self {
        self.adaptive_threshold = enabled;
        self
    }

    pub fn with_attack_release(mut self, attack_ms: f64, release_ms: f64) -> Result<Self> {
        if attack_ms <= 0.0 || release_ms <= 0.0 {
            return Err(RippleError::config("time constants must be positive"));
        }
        self.attack_time_ms = attack_ms;
        self.release_time_ms = release_ms;
        Ok(self)
    }

    pub fn with_noise_buffer_factor(mut self, factor: f64) -> Result<Self> {
        if !(factor >= 1.0) {
            return Err(RippleError::config("noise buffer factor must be >= 1"));
        }
        self.noise_buffer_factor = factor;
        Ok(self)
    }

    pub fn with_window_function(mut self, function: WindowFunction) -> Self {
        self.window_function = function;
        self
    }

    pub fn with_shared_pool(mut self, enabled: bool) -> Self {
        self.use_shared_pool = enabled;
        self
    }

    pub fn with_strategy(mut self, strategy: ImplStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_sample_rate(mut self, hz: f64) -> Result<Self> {
        if !(hz > 0.0) || !hz.is_finite() {
            return Err(RippleError::config("sample rate must be positive"));
        }
        self.sample_rate_hz = hz;
        Ok(self)
    }

    pub fn with_adaptive_resize(mut self, enabled: bool) -> Self {
        self.adaptive_resize = enabled;
        self
    }

    pub fn with_ring_bounds(mut self, min: usize, max: usize) -> Result<Self> {
        if min < 2 || min > max {
            return Err(RippleError::config("ring bounds must satisfy 2 <= min <= max"));
        }
        self.min_ring_capacity = min;
        self.max_ring_capacity = max;
        Ok(self)
    }

    fn check_block_size(&self) -> Result<()> {
        if self.block_size < MIN_BLOCK_SIZE {
            return Err(RippleError::config(format!(
                "block size must be at least {MIN_BLOCK_SIZE}"
            )));
        }
        if self.block_size % 2 != 0 {
            return Err(RippleError::config(
                "block size must be even for the convolution transform",
            ));
        }
        Ok(())
    }

    /// Samples shared between consecutive windows
    pub fn overlap_samples(&self) -> usize {
        (self.block_size as f64 * self.overlap_factor).floor() as usize
    }

    /// Producer advance between windows
    pub fn hop_size(&self) -> usize {
        self.block_size - self.overlap_samples()
    }

    /// Deepest decomposition the block and filter lengths allow
    pub fn max_levels(&self) -> usize {
        let ratio = self.block_size / self.wavelet.filter_length();
        if ratio < 2 {
            1
        } else {
            (ratio as f64).log2().floor() as usize
        }
    }

    /// Noise-estimator smoothing coefficient derived from the history
    /// factor
    pub fn smoothing_alpha(&self) -> f64 {
        1.0 - 1.0 / self.noise_buffer_factor
    }

    /// Expected wall-clock milliseconds between blocks
    pub fn block_period_ms(&self) -> f64 {
        self.hop_size() as f64 / self.sample_rate_hz * 1000.0
    }

    /// Check the complete record.
    pub fn validate(&self) -> Result<()> {
        self.check_block_size()?;
        if !(0.0..1.0).contains(&self.overlap_factor) {
            return Err(RippleError::config("overlap factor must be in [0, 1)"));
        }
        if self.levels == 0 || self.levels > self.max_levels() {
            return Err(RippleError::config(format!(
                "levels must be in [1, {}] for block {} and {}",
                self.max_levels(),
                self.block_size,
                self.wavelet.name()
            )));
        }
        if !(self.threshold_multiplier > 0.0) || !self.threshold_multiplier.is_finite() {
            return Err(RippleError::config("threshold multiplier must be > 0"));
        }
        if self.attack_time_ms <= 0.0 || self.release_time_ms <= 0.0 {
            return Err(RippleError::config("time constants must be positive"));
        }
        if !(self.noise_buffer_factor >= 1.0) {
            return Err(RippleError::config("noise buffer factor must be >= 1"));
        }
        if !(self.sample_rate_hz > 0.0) || !self.sample_rate_hz.is_finite() {
            return Err(RippleError::config("sample rate must be positive"));
        }
        if self.buffer_multiplier == 0 {
            return Err(RippleError::config("buffer multiplier must be >= 1"));
        }
        if self.min_ring_capacity < 2 || self.min_ring_capacity > self.max_ring_capacity {
            return Err(RippleError::config("ring bounds must satisfy 2 <= min <= max"));
        }
        if !(0.0..=1.0).contains(&self.shrink_utilization)
            || !(0.0..=1.0).contains(&self.grow_utilization)
            || self.shrink_utilization >= self.grow_utilization
        {
            return Err(RippleError::config(
                "utilization thresholds must satisfy 0 <= shrink < grow <= 1",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_validates() {
        DenoiseConfig::default().validate().unwrap();
    }

    #[test]
    fn test_block_size_constraints() {
        assert!(DenoiseConfig::new(8).is_err());
        assert!(DenoiseConfig::new(129).is_err()); // odd
        assert!(DenoiseConfig::new(128).is_ok());
        assert!(DenoiseConfig::new(250).is_ok()); // even, non power of two
    }

    #[test]
    fn test_builder_validation() {
        let base = DenoiseConfig::new(256).unwrap();
        assert!(base.clone().with_overlap(1.0).is_err());
        assert!(base.clone().with_overlap(-0.1).is_err());
        assert!(base.clone().with_threshold_multiplier(0.0).is_err());
        assert!(base.clone().with_attack_release(0.0, 1.0).is_err());
        assert!(base.clone().with_noise_buffer_factor(0.5).is_err());
        assert!(base.clone().with_sample_rate(-1.0).is_err());
        assert!(base.with_overlap(0.5).is_ok());
    }

    #[test]
    fn test_levels_bounded_by_block_and_filter() {
        // block 256 with db4 (8 taps): floor(log2(256 / 8)) = 5
        let config = DenoiseConfig::new(256).unwrap();
        assert_eq!(config.max_levels(), 5);
        assert!(config.clone().with_levels(5).unwrap().validate().is_ok());
        assert!(config.with_levels(6).unwrap().validate().is_err());
    }

    #[test]
    fn test_hop_and_overlap_geometry() {
        let config = DenoiseConfig::new(256)
            .unwrap()
            .with_overlap(0.5)
            .unwrap();
        assert_eq!(config.overlap_samples(), 128);
        assert_eq!(config.hop_size(), 128);

        let config = DenoiseConfig::new(250).unwrap().with_overlap(0.3).unwrap();
        assert_eq!(config.overlap_samples(), 75);
        assert_eq!(config.hop_size(), 175);
    }

    #[test]
    fn test_smoothing_alpha_mapping() {
        let config = DenoiseConfig::new(256).unwrap();
        let config = config.with_noise_buffer_factor(1.0).unwrap();
        assert_eq!(config.smoothing_alpha(), 0.0);
        let config = config.with_noise_buffer_factor(8.0).unwrap();
        assert!((config.smoothing_alpha() - 0.875).abs() < 1e-12);
    }

    #[test]
    fn test_serde_roundtrip() {
        let config = DenoiseConfig::new(128)
            .unwrap()
            .with_wavelet(WaveletFamily::Haar)
            .with_overlap(0.25)
            .unwrap()
            .with_window_function(WindowFunction::Hann);
        let json = serde_json::to_string(&config).unwrap();
        let back: DenoiseConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.wavelet, WaveletFamily::Haar);
        assert_eq!(back.block_size, 128);
        assert_eq!(back.overlap_factor, 0.25);
        assert_eq!(back.window_function, WindowFunction::Hann);
    }
}
