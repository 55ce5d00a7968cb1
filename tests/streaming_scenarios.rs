//! End-to-end pipeline scenarios
//!
//! Single-threaded cooperative runs of the full pipeline: passthrough,
//! overlap-add reconstruction, noise reduction, adaptive thresholds, and
//! lifecycle laws.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use ripple::{
    DenoiseConfig, ResizableRing, Result, RippleError, StreamingPipeline, Subscriber,
    Subscription, ThresholdMethod, ThresholdType, WaveletFamily, WindowFunction, UNBOUNDED,
};

#[derive(Default)]
struct SinkState {
    samples: Vec<f64>,
    fragments: usize,
    completions: usize,
    errors: usize,
    subscription: Option<Arc<Subscription>>,
}

struct CollectingSink {
    state: Arc<Mutex<SinkState>>,
    initial_demand: u64,
}

impl Subscriber for CollectingSink {
    fn on_subscribe(&mut self, subscription: Arc<Subscription>) {
        if self.initial_demand > 0 {
            subscription.request(self.initial_demand);
        }
        self.state.lock().subscription = Some(subscription);
    }

    fn on_next(&mut self, fragment: &[f64]) -> Result<()> {
        let mut state = self.state.lock();
        state.samples.extend_from_slice(fragment);
        state.fragments += 1;
        Ok(())
    }

    fn on_error(&mut self, _error: &RippleError) {
        self.state.lock().errors += 1;
    }

    fn on_complete(&mut self) {
        self.state.lock().completions += 1;
    }
}

fn attach(pipeline: &StreamingPipeline, demand: u64) -> Arc<Mutex<SinkState>> {
    let state = Arc::new(Mutex::new(SinkState::default()));
    pipeline
        .subscribe(Box::new(CollectingSink {
            state: Arc::clone(&state),
            initial_demand: demand,
        }))
        .unwrap();
    state
}

fn gaussian(rng: &mut StdRng, sigma: f64) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen::<f64>();
    sigma * (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

fn snr_db(reference: &[f64], signal: &[f64]) -> f64 {
    let len = reference.len().min(signal.len());
    let signal_power: f64 = reference[..len].iter().map(|x| x * x).sum();
    let noise_power: f64 = reference[..len]
        .iter()
        .zip(&signal[..len])
        .map(|(r, s)| (r - s) * (r - s))
        .sum();
    10.0 * (signal_power / noise_power.max(1e-30)).log10()
}

// Scenario 1: constant passthrough. Haar, block 128, no overlap,
// rectangular window; a constant signal has zero detail energy, so the
// threshold is zero and the stream must come through within 1 ULP.
#[test]
fn constant_passthrough_is_exact() {
    let config = DenoiseConfig::new(128)
        .unwrap()
        .with_wavelet(WaveletFamily::Haar)
        .with_window_function(WindowFunction::Rectangular)
        .with_threshold(ThresholdMethod::Universal, ThresholdType::Soft);
    let pipeline = StreamingPipeline::new(config).unwrap();
    let state = attach(&pipeline, UNBOUNDED);

    pipeline.process_block(&vec![1.0; 4096]).unwrap();
    pipeline.flush().unwrap();
    pipeline.close().unwrap();

    let state = state.lock();
    assert_eq!(state.samples.len(), 4096);
    for (i, &s) in state.samples.iter().enumerate() {
        assert!(
            (s - 1.0).abs() <= f64::EPSILON,
            "sample {i} drifted to {s}"
        );
    }
    assert_eq!(pipeline.statistics().blocks_emitted, 32);
    assert_eq!(state.completions, 1);
}

// Scenario 2: Hann overlap-add reconstruction of a sine. In steady state
// the reconstructed amplitude stays near 1 and the stream has no jumps.
#[test]
fn hann_overlap_add_reconstruction() {
    let config = DenoiseConfig::new(256)
        .unwrap()
        .with_wavelet(WaveletFamily::Haar)
        .with_overlap(0.5)
        .unwrap()
        .with_window_function(WindowFunction::Hann);
    let pipeline = StreamingPipeline::new(config).unwrap();
    let state = attach(&pipeline, UNBOUNDED);

    let input: Vec<f64> = (0..1024)
        .map(|n| (2.0 * std::f64::consts::PI * 5.0 * n as f64 / 1024.0).sin())
        .collect();
    pipeline.process_block(&input).unwrap();
    pipeline.flush().unwrap();

    let state = state.lock();
    // Skip the first two block emissions (transient) and the tail.
    let steady = &state.samples[256 + 128..state.samples.len() - 128];
    let peak = steady.iter().fold(0.0f64, |m, s| m.max(s.abs()));
    assert!(
        (peak - 1.0).abs() < 0.1,
        "steady-state amplitude {peak} outside 1.0 +/- 0.1"
    );
    for pair in steady.windows(2) {
        assert!(
            (pair[1] - pair[0]).abs() < 0.5,
            "discontinuity {} -> {}",
            pair[0],
            pair[1]
        );
    }
}

// Scenario 3: universal-threshold noise reduction on a noisy sine.
#[test]
fn universal_threshold_reduces_noise() {
    let config = DenoiseConfig::new(256)
        .unwrap()
        .with_wavelet(WaveletFamily::Db4)
        .with_threshold(ThresholdMethod::Universal, ThresholdType::Soft);
    let pipeline = StreamingPipeline::new(config).unwrap();
    let state = attach(&pipeline, UNBOUNDED);

    let mut rng = StdRng::seed_from_u64(42);
    let clean: Vec<f64> = (0..1024)
        .map(|n| (2.0 * std::f64::consts::PI * 4.0 * n as f64 / 256.0).sin())
        .collect();
    let noisy: Vec<f64> = clean.iter().map(|c| c + gaussian(&mut rng, 0.3)).collect();

    pipeline.process_block(&noisy).unwrap();
    pipeline.flush().unwrap();

    let state = state.lock();
    assert_eq!(state.samples.len(), 1024);

    let snr_in = snr_db(&clean, &noisy);
    let snr_out = snr_db(&clean, &state.samples);
    assert!(
        snr_out - snr_in > -5.0,
        "SNR degraded too far: {snr_in:.2} dB -> {snr_out:.2} dB"
    );

    assert!(pipeline.current_threshold() > 0.0);
    let noise = pipeline.current_noise_level();
    assert!(
        (noise - 0.3).abs() < 0.15,
        "noise estimate {noise} outside 0.3 +/- 50%"
    );
}

// Scenario 4: adaptive threshold tracks a noise ramp.
#[test]
fn adaptive_threshold_tracks_noise_ramp() {
    let config = DenoiseConfig::new(128)
        .unwrap()
        .with_wavelet(WaveletFamily::Db4)
        .with_overlap(0.5)
        .unwrap()
        .with_window_function(WindowFunction::Hann)
        .with_adaptive_threshold(true)
        .with_attack_release(1.0, 5.0)
        .unwrap();
    let pipeline = StreamingPipeline::new(config).unwrap();
    let _state = attach(&pipeline, UNBOUNDED);

    let mut rng = StdRng::seed_from_u64(42);
    let total = 2048;
    let mut observed = Vec::new();
    for start in (0..total).step_by(128) {
        let chunk: Vec<f64> = (start..start + 128)
            .map(|n| {
                let sigma = 0.1 + 0.4 * n as f64 / total as f64;
                (2.0 * std::f64::consts::PI * 3.0 * n as f64 / 128.0).sin()
                    + gaussian(&mut rng, sigma)
            })
            .collect();
        pipeline.process_block(&chunk).unwrap();
        pipeline.dispatch_available().unwrap();
        let threshold = pipeline.current_threshold();
        assert!(
            (0.0..=1.0e9).contains(&threshold),
            "threshold {threshold} left its bounds"
        );
        if threshold > 0.0 {
            observed.push(threshold);
        }
    }
    pipeline.flush().unwrap();

    let min = observed.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = observed.iter().cloned().fold(0.0f64, f64::max);
    assert!(
        max > 1.05 * min,
        "threshold did not adapt: min {min}, max {max}"
    );
}

// Scenario 5: ring resize under load (direct ResizableRing exercise).
#[test]
fn ring_resize_under_load() {
    let ring = ResizableRing::new(1024, 512, 4096, Duration::from_secs(1), 0.85, 0.25).unwrap();

    let data: Vec<f64> = (0..900).map(|i| i as f64).collect();
    assert_eq!(ring.write_batch(&data), 900);

    assert!(ring.resize_based_on_utilization(0.88));
    assert_eq!(ring.capacity(), 2048);
    assert_eq!(ring.available(), 900);

    let mut out = vec![0.0; 700];
    assert_eq!(ring.read_into(&mut out), 700);
    assert!(ring.force_resize(1024).unwrap());
    assert_eq!(ring.capacity(), 1024);
    assert_eq!(ring.available(), 200);

    // Rounding and clamping behaviour.
    assert!(ring.force_resize(3000).unwrap());
    assert_eq!(ring.capacity(), 4096);
    assert!(!ring.force_resize(3500).unwrap());
    assert_eq!(ring.capacity(), 4096);
}

// Boundary: empty input is a no-op, NaN rejects without mutation.
#[test]
fn ingress_validation() {
    let config = DenoiseConfig::new(128).unwrap();
    let pipeline = StreamingPipeline::new(config).unwrap();
    let _state = attach(&pipeline, UNBOUNDED);

    pipeline.process_block(&[]).unwrap();
    assert_eq!(pipeline.statistics().samples_processed, 0);

    let err = pipeline.process_block(&[f64::NAN]).unwrap_err();
    assert!(matches!(err, RippleError::InvalidSignal { .. }));
    assert_eq!(pipeline.buffer_level(), 0);
    assert_eq!(pipeline.statistics().samples_processed, 0);
}

// Law: subscribe, cancel, close emits no on_next and exactly one
// terminal event (on_complete for a clean close).
#[test]
fn cancel_then_close_law() {
    let config = DenoiseConfig::new(128).unwrap();
    let pipeline = StreamingPipeline::new(config).unwrap();
    let state = attach(&pipeline, 0);

    state.lock().subscription.as_ref().unwrap().cancel();
    pipeline.process_block(&vec![1.0; 1024]).unwrap();
    pipeline.close().unwrap();
    pipeline.close().unwrap();

    let state = state.lock();
    assert_eq!(state.fragments, 0);
    assert_eq!(state.completions, 1);
    assert_eq!(state.errors, 0);
}

// Flow control: demand gates emission; requesting more resumes exactly
// where the stream parked.
#[test]
fn demand_gated_emission_preserves_order() {
    let config = DenoiseConfig::new(128)
        .unwrap()
        .with_wavelet(WaveletFamily::Haar)
        .with_window_function(WindowFunction::Rectangular);
    let pipeline = StreamingPipeline::new(config).unwrap();
    let state = attach(&pipeline, 1);

    // Ramp across four blocks so ordering mistakes are visible.
    let input: Vec<f64> = (0..512).map(|i| i as f64).collect();
    pipeline.process_block(&input).unwrap();
    pipeline.dispatch_available().unwrap();
    assert_eq!(state.lock().fragments, 1);

    state.lock().subscription.as_ref().unwrap().request(UNBOUNDED);
    pipeline.dispatch_available().unwrap();
    pipeline.flush().unwrap();

    let state = state.lock();
    assert_eq!(state.samples.len(), 512);
    for (i, &s) in state.samples.iter().enumerate() {
        assert!(
            (s - i as f64).abs() < 1e-9,
            "order broken at {i}: got {s}"
        );
    }
}

// Observer methods keep returning the last known values after close.
#[test]
fn observers_survive_close() {
    let config = DenoiseConfig::new(128)
        .unwrap()
        .with_wavelet(WaveletFamily::Db4);
    let pipeline = StreamingPipeline::new(config).unwrap();
    let _state = attach(&pipeline, UNBOUNDED);

    let mut rng = StdRng::seed_from_u64(7);
    let noisy: Vec<f64> = (0..512).map(|_| gaussian(&mut rng, 0.5)).collect();
    pipeline.process_block(&noisy).unwrap();
    pipeline.close().unwrap();

    assert!(pipeline.current_noise_level() > 0.0);
    assert!(pipeline.current_threshold() > 0.0);
    assert!(pipeline.statistics().blocks_emitted > 0);
    assert_eq!(pipeline.block_size(), 128);
}
