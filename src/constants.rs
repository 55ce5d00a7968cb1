//! Ripple tuning constants and configuration defaults
//!
//! This module contains the tuning constants and default configuration
//! values used throughout the Ripple library.

/// Default denoising window length in samples
pub const DEFAULT_BLOCK_SIZE: usize = 256;

/// Minimum accepted window length
pub const MIN_BLOCK_SIZE: usize = 16;

/// Initial ring capacity = block_size * DEFAULT_BUFFER_MULTIPLIER (rounded up to a power of 2)
pub const DEFAULT_BUFFER_MULTIPLIER: usize = 8;

/// A ring may never shrink below block_size * BUFFER_MULTIPLIER_MIN
pub const BUFFER_MULTIPLIER_MIN: usize = 2;

/// Smallest ring capacity the pipeline will configure (power of 2)
pub const MIN_RING_CAPACITY: usize = 64;

/// Largest ring capacity the pipeline will configure (power of 2)
pub const MAX_RING_CAPACITY: usize = 4 * 1024 * 1024;

/// Cache line size for alignment optimizations (64 bytes on most modern CPUs)
pub const CACHE_LINE_SIZE: usize = 64;

/// Sequence counter alignment. 128 bytes covers CPUs that prefetch two
/// adjacent cache lines, preventing false sharing between producer and
/// consumer counters.
pub const SEQUENCE_ALIGNMENT: usize = 128;

/// Utilisation above which the adaptive supervisor grows the ring
pub const DEFAULT_GROW_UTILIZATION: f64 = 0.85;

/// Utilisation below which the adaptive supervisor shrinks the ring
pub const DEFAULT_SHRINK_UTILIZATION: f64 = 0.25;

/// Minimum time between automatic resizes
pub const DEFAULT_RESIZE_COOLDOWN_MS: u64 = 1000;

/// How often the consumer-side supervisor samples ring utilisation
pub const RESIZE_CHECK_INTERVAL_MS: u64 = 100;

/// Gaussian consistency constant: sigma ~= 1.4826 * MAD for normal data
pub const MAD_SCALE: f64 = 1.4826;

/// Streaming SURE correction applied on top of the universal threshold.
/// Greater than 1 so that SURE >= Universal always holds; the exact value
/// is a tuning constant, not derived.
pub const SURE_STREAMING_FACTOR: f64 = 1.2;

/// Minimax threshold intercept (valid for n >= MINIMAX_MIN_SAMPLES)
pub const MINIMAX_INTERCEPT: f64 = 0.3936;

/// Minimax threshold slope per log2(n)
pub const MINIMAX_SLOPE: f64 = 0.1829;

/// Below this sample count the minimax rule degenerates to sigma
pub const MINIMAX_MIN_SAMPLES: u64 = 32;

/// Default sample rate used to convert attack/release time constants into
/// per-block smoothing coefficients
pub const DEFAULT_SAMPLE_RATE_HZ: f64 = 48_000.0;

/// Default threshold adapter attack time constant
pub const DEFAULT_ATTACK_MS: f64 = 10.0;

/// Default threshold adapter release time constant
pub const DEFAULT_RELEASE_MS: f64 = 100.0;

/// Lower clamp of the adaptive threshold
pub const THRESHOLD_FLOOR: f64 = 0.0;

/// Upper clamp of the adaptive threshold
pub const THRESHOLD_CEILING: f64 = 1.0e9;

/// Default exponential-smoothing history factor for the noise estimator
pub const DEFAULT_NOISE_BUFFER_FACTOR: f64 = 8.0;

/// Default scalar applied to the selected threshold
pub const DEFAULT_THRESHOLD_MULTIPLIER: f64 = 1.0;

/// Capacity of the process-wide window-coefficient cache (LRU entries)
pub const WINDOW_CACHE_CAPACITY: usize = 32;

/// Retention cap per size bucket in the shared slab pool
pub const DEFAULT_MAX_ARRAYS_PER_SIZE: usize = 16;

/// Consecutive subscriber `on_next` failures before the pipeline gives up
pub const MAX_CONSECUTIVE_SUBSCRIBER_ERRORS: u32 = 3;

/// Grace period `close()` waits for a parked fragment to find demand
pub const DEFAULT_CLOSE_GRACE_MS: u64 = 100;

/// AUTO strategy picks the fast transform at or below this window length
pub const AUTO_FAST_BLOCK_LIMIT: usize = 256;

/// Nanoseconds per second for throughput calculations
pub const NANOS_PER_SEC: f64 = 1_000_000_000.0;

/// Significant figures kept by the processing-time histogram
pub const LATENCY_HISTOGRAM_SIGFIGS: u8 = 3;

/// Validate that all constants are consistently configured
pub fn validate_constants() -> Result<(), &'static str> {
    if !MIN_RING_CAPACITY.is_power_of_two() {
        return Err("MIN_RING_CAPACITY must be a power of 2");
    }
    if !MAX_RING_CAPACITY.is_power_of_two() {
        return Err("MAX_RING_CAPACITY must be a power of 2");
    }
    if MIN_RING_CAPACITY >= MAX_RING_CAPACITY {
        return Err("MIN_RING_CAPACITY must be below MAX_RING_CAPACITY");
    }
    if MIN_BLOCK_SIZE == 0 || MIN_BLOCK_SIZE % 2 != 0 {
        return Err("MIN_BLOCK_SIZE must be positive and even");
    }
    if !(SURE_STREAMING_FACTOR >= 1.0) {
        return Err("SURE_STREAMING_FACTOR must be >= 1 so SURE >= Universal");
    }
    if DEFAULT_SHRINK_UTILIZATION >= DEFAULT_GROW_UTILIZATION {
        return Err("shrink threshold must be below grow threshold");
    }
    if !CACHE_LINE_SIZE.is_power_of_two() || !SEQUENCE_ALIGNMENT.is_power_of_two() {
        return Err("alignment constants must be powers of 2");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants_validation() {
        assert!(validate_constants().is_ok());
    }

    #[test]
    fn test_ring_bounds_are_powers_of_two() {
        assert!(MIN_RING_CAPACITY.is_power_of_two());
        assert!(MAX_RING_CAPACITY.is_power_of_two());
    }

    #[test]
    fn test_sure_dominates_universal() {
        assert!(SURE_STREAMING_FACTOR >= 1.0);
    }

    #[test]
    fn test_utilization_thresholds_ordered() {
        assert!(DEFAULT_SHRINK_UTILIZATION < DEFAULT_GROW_UTILIZATION);
    }
}
