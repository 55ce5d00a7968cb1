//! Streaming pipeline orchestration
//!
//! Wires the ring, window extraction, denoise engine, overlap-add, noise
//! estimation, threshold adaptation, publication, and supervision into a
//! single state machine: `Created -> Ready -> Draining -> Closed`.
//!
//! ## Threading
//!
//! One producer thread ingests through `process` / `process_block` /
//! `flush`; one consumer thread drives `dispatch_available` (usually via
//! `run_consumer`). The producer side touches only the lock-free ring and
//! the wake signals; all mutable consumer state lives behind one mutex so
//! a single `Arc<StreamingPipeline>` serves both threads. With no
//! consumer thread attached the pipeline is single-threaded cooperative:
//! a full ring makes the producer drive the dispatch loop inline.

pub mod publisher;
pub mod signal;
pub mod stats;
pub mod supervisor;

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam::utils::Backoff;
use parking_lot::Mutex;
use tracing::{debug, error, info, trace};

use crate::buffer::resizable::ResizableRing;
use crate::buffer::window::StreamingWindow;
use crate::config::DenoiseConfig;
use crate::constants::{
    BUFFER_MULTIPLIER_MIN, DEFAULT_CLOSE_GRACE_MS, RESIZE_CHECK_INTERVAL_MS, THRESHOLD_CEILING,
    THRESHOLD_FLOOR,
};
use crate::dsp::engine::DenoiseEngine;
use crate::dsp::overlap::OverlapBuffer;
use crate::error::{Result, RippleError};
use crate::estimator::adapter::ThresholdAdapter;
use crate::estimator::mad::MadEstimator;
use crate::pool::{global_pool, SharedPool};
use crate::wavelet::{select_transform, Wavelet};

use publisher::{PublishOutcome, Publisher, Subscriber};
use signal::WakeSignal;
use stats::{AtomicF64, PipelineStats, StatsSnapshot};
use supervisor::ResizeSupervisor;

/// Lifecycle of a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Created,
    Ready,
    Draining,
    Closed,
}

impl PipelineState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Created,
            1 => Self::Ready,
            2 => Self::Draining,
            _ => Self::Closed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Created => 0,
            Self::Ready => 1,
            Self::Draining => 2,
            Self::Closed => 3,
        }
    }
}

/// Mutable state owned by the consumer side, behind one mutex.
struct ConsumerCore {
    window: StreamingWindow,
    overlap: OverlapBuffer,
    engine: DenoiseEngine,
    estimator: MadEstimator,
    adapter: Option<ThresholdAdapter>,
    publisher: Publisher,
    supervisor: ResizeSupervisor,
    sequence: u64,
    tail_emitted: bool,
}

/// Real-time streaming wavelet denoiser.
pub struct StreamingPipeline {
    config: DenoiseConfig,
    ring: Arc<ResizableRing>,
    core: Mutex<ConsumerCore>,
    stats: Arc<PipelineStats>,
    state: AtomicU8,
    gauge_threshold: AtomicF64,
    gauge_noise: AtomicF64,
    data_signal: Arc<WakeSignal>,
    space_signal: Arc<WakeSignal>,
    consumer_attached: AtomicBool,
    written_since_signal: AtomicUsize,
    pool: Option<Arc<SharedPool>>,
    pool_released: AtomicBool,
    hop: usize,
}

impl StreamingPipeline {
    /// Build a pipeline from a validated configuration.
    pub fn new(config: DenoiseConfig) -> Result<Self> {
        config.validate()?;

        let block = config.block_size;
        let hop = config.hop_size();

        let min_capacity = config
            .min_ring_capacity
            .max(block * BUFFER_MULTIPLIER_MIN)
            .next_power_of_two();
        let max_capacity = config.max_ring_capacity.next_power_of_two();
        if min_capacity > max_capacity {
            return Err(RippleError::config(
                "max ring capacity too small for the window",
            ));
        }
        let initial_capacity = (block * config.buffer_multiplier)
            .next_power_of_two()
            .clamp(min_capacity, max_capacity);

        let ring = Arc::new(ResizableRing::new(
            initial_capacity,
            min_capacity,
            max_capacity,
            Duration::from_millis(config.resize_cooldown_ms),
            config.grow_utilization,
            config.shrink_utilization,
        )?);

        let window = StreamingWindow::new(Arc::clone(&ring), block, hop)?;
        let overlap = OverlapBuffer::new(block, config.overlap_factor, config.window_function)?;

        let pool = config.use_shared_pool.then(global_pool);
        let transform = select_transform(
            config.strategy,
            block,
            config.overlap_factor,
            config.adaptive_threshold,
        );
        let engine = DenoiseEngine::new(
            Wavelet::new(config.wavelet),
            config.boundary_mode,
            config.levels,
            config.threshold_type,
            config.threshold_method,
            config.threshold_multiplier,
            transform,
            pool.clone(),
        )?;
        let estimator = MadEstimator::new(config.smoothing_alpha())?;
        let adapter = if config.adaptive_threshold {
            Some(ThresholdAdapter::new(
                config.attack_time_ms,
                config.release_time_ms,
                config.block_period_ms(),
                THRESHOLD_FLOOR,
                THRESHOLD_CEILING,
            )?)
        } else {
            None
        };
        let supervisor = ResizeSupervisor::new(
            config.adaptive_resize,
            Duration::from_millis(RESIZE_CHECK_INTERVAL_MS),
        );

        // Register with the shared pool only after construction can no
        // longer fail, so the user count never leaks.
        if let Some(pool) = &pool {
            pool.register_user();
        }

        info!(
            block,
            hop,
            ring_capacity = initial_capacity,
            wavelet = config.wavelet.name(),
            "pipeline created"
        );

        Ok(Self {
            config,
            ring,
            core: Mutex::new(ConsumerCore {
                window,
                overlap,
                engine,
                estimator,
                adapter,
                publisher: Publisher::new(),
                supervisor,
                sequence: 0,
                tail_emitted: false,
            }),
            stats: Arc::new(PipelineStats::new()),
            state: AtomicU8::new(PipelineState::Created.as_u8()),
            gauge_threshold: AtomicF64::new(0.0),
            gauge_noise: AtomicF64::new(0.0),
            data_signal: Arc::new(WakeSignal::new()),
            space_signal: Arc::new(WakeSignal::new()),
            consumer_attached: AtomicBool::new(false),
            written_since_signal: AtomicUsize::new(0),
            pool,
            pool_released: AtomicBool::new(false),
            hop,
        })
    }

    // ------------------------------------------------------------------
    // State machine
    // ------------------------------------------------------------------

    pub fn state(&self) -> PipelineState {
        PipelineState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: PipelineState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    fn ensure_ingest(&self) -> Result<()> {
        match self.state() {
            PipelineState::Created | PipelineState::Ready => Ok(()),
            PipelineState::Draining => Err(RippleError::state("pipeline is draining")),
            PipelineState::Closed => Err(RippleError::Closed),
        }
    }

    // ------------------------------------------------------------------
    // Subscription
    // ------------------------------------------------------------------

    /// Attach the single subscriber; transitions `Created -> Ready`.
    pub fn subscribe(&self, subscriber: Box<dyn Subscriber>) -> Result<()> {
        if self.state() == PipelineState::Closed {
            return Err(RippleError::state("cannot subscribe to a closed pipeline"));
        }
        let mut core = self.core.lock();
        core.publisher.subscribe(subscriber, &self.data_signal)?;
        drop(core);

        let _ = self.state.compare_exchange(
            PipelineState::Created.as_u8(),
            PipelineState::Ready.as_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Producer side
    // ------------------------------------------------------------------

    fn check_finite(samples: &[f64]) -> Result<()> {
        if let Some(bad) = samples.iter().find(|x| !x.is_finite()) {
            return Err(RippleError::signal(format!(
                "non-finite sample {bad} in input"
            )));
        }
        Ok(())
    }

    /// Raise the consumer wake once at least `hop` new samples landed.
    fn note_written(&self, count: usize) {
        let written = self.written_since_signal.fetch_add(count, Ordering::AcqRel) + count;
        if written >= self.hop {
            self.written_since_signal.store(0, Ordering::Release);
            self.data_signal.notify();
        }
    }

    /// Ingest one sample, blocking cooperatively when the ring is full.
    pub fn process(&self, sample: f64) -> Result<()> {
        self.ensure_ingest()?;
        if !sample.is_finite() {
            return Err(RippleError::signal(format!(
                "non-finite sample {sample} in input"
            )));
        }

        let backoff = Backoff::new();
        loop {
            if self.ring.write(sample) {
                self.stats.record_ingest(1);
                self.note_written(1);
                return Ok(());
            }
            self.wait_for_space(0, &backoff)?;
            self.ensure_ingest()?;
        }
    }

    /// Ingest a block, blocking cooperatively until every sample is
    /// buffered. Empty input is a no-op; a non-finite sample rejects the
    /// whole block before any state changes.
    pub fn process_block(&self, block: &[f64]) -> Result<()> {
        self.ensure_ingest()?;
        if block.is_empty() {
            return Ok(());
        }
        Self::check_finite(block)?;

        let mut written = 0;
        let backoff = Backoff::new();
        while written < block.len() {
            let n = self.ring.write_batch(&block[written..]);
            if n > 0 {
                written += n;
                self.stats.record_ingest(n);
                self.note_written(n);
                backoff.reset();
                continue;
            }
            self.wait_for_space(written, &backoff)?;
            self.ensure_ingest()?;
        }
        Ok(())
    }

    /// Non-blocking ingest: buffers what fits and fails with
    /// `CapacityExceeded` (reporting the accepted count) when the ring
    /// cannot take the whole block.
    pub fn try_process_block(&self, block: &[f64]) -> Result<usize> {
        self.ensure_ingest()?;
        if block.is_empty() {
            return Ok(0);
        }
        Self::check_finite(block)?;

        let written = self.ring.write_batch(block);
        if written > 0 {
            self.stats.record_ingest(written);
            self.note_written(written);
        }
        if written < block.len() {
            return Err(RippleError::CapacityExceeded { accepted: written });
        }
        Ok(written)
    }

    fn wait_for_space(&self, accepted: usize, backoff: &Backoff) -> Result<()> {
        if self.consumer_attached.load(Ordering::Acquire) {
            // Parallel mode: nudge the consumer and park briefly.
            self.data_signal.notify();
            if backoff.is_completed() {
                self.space_signal.wait_timeout(Duration::from_millis(1));
            } else {
                backoff.snooze();
            }
            return Ok(());
        }

        // Cooperative mode: drive the consumer side inline. No progress
        // means nothing can drain (no demand or no subscriber).
        if self.dispatch_available()? == 0 && self.ring.remaining() == 0 {
            return Err(RippleError::CapacityExceeded { accepted });
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Consumer side
    // ------------------------------------------------------------------

    /// Process every currently ready window. Returns the number of
    /// windows consumed. Runs on the consumer thread (or inline in
    /// cooperative mode).
    pub fn dispatch_available(&self) -> Result<usize> {
        if self.state() == PipelineState::Closed {
            return Ok(0);
        }
        let mut core = self.core.lock();
        self.dispatch_locked(&mut core)
    }

    fn record_publish(&self, outcome: &PublishOutcome) {
        match outcome {
            PublishOutcome::Delivered => self.stats.record_emitted(),
            PublishOutcome::DeliveredWithError => {
                self.stats.record_emitted();
                self.stats.record_publish_error();
            }
            PublishOutcome::Parked | PublishOutcome::Dropped => {}
        }
    }

    fn dispatch_locked(&self, core: &mut ConsumerCore) -> Result<usize> {
        let mut processed = 0;

        loop {
            // The parked fragment must clear before new output is pulled;
            // the mailbox holds one fragment.
            match core.publisher.try_flush_parked() {
                Ok(None) => {}
                Ok(Some(outcome)) => {
                    self.record_publish(&outcome);
                    if outcome == PublishOutcome::Parked {
                        break;
                    }
                }
                Err(fatal) => return self.fail_locked(core, fatal),
            }

            if !core.window.has_window() {
                break;
            }

            let started = Instant::now();
            let ConsumerCore {
                window,
                overlap,
                engine,
                estimator,
                adapter,
                publisher,
                sequence,
                ..
            } = &mut *core;

            let outcome =
                match window.process_window(|w| engine.denoise(w, estimator, adapter.as_mut())) {
                    Ok(Ok(outcome)) => outcome,
                    Ok(Err(e)) | Err(e) => return self.fail_locked(core, e),
                };

            self.gauge_threshold.store(outcome.threshold);
            self.gauge_noise.store(outcome.noise_level);

            let fragment = match overlap.process(&outcome.samples) {
                Ok(fragment) => fragment,
                Err(e) => return self.fail_locked(core, e),
            };

            if let Err(e) = window.advance() {
                return self.fail_locked(core, e);
            }
            self.space_signal.notify();

            trace!(
                sequence = *sequence,
                threshold = outcome.threshold,
                noise = outcome.noise_level,
                "window denoised"
            );
            *sequence += 1;
            processed += 1;
            self.stats
                .record_block_timing(started.elapsed().as_nanos() as u64);

            match publisher.publish(fragment) {
                Ok(outcome) => {
                    let parked = outcome == PublishOutcome::Parked;
                    self.record_publish(&outcome);
                    if parked {
                        // Demand exhausted: stop pulling windows until the
                        // subscriber requests again.
                        break;
                    }
                }
                Err(fatal) => {
                    self.stats.record_publish_error();
                    return self.fail_locked(core, fatal);
                }
            }
        }

        core.supervisor.maybe_resize(&self.ring);
        Ok(processed)
    }

    /// Consumer thread main loop: dispatch until `stop`, then drain.
    pub fn run_consumer(&self, stop: &AtomicBool) -> Result<()> {
        self.consumer_attached.store(true, Ordering::Release);
        let result = (|| {
            while !stop.load(Ordering::Acquire) {
                if self.state() == PipelineState::Closed {
                    break;
                }
                if self.dispatch_available()? == 0 {
                    self.data_signal.wait_timeout(Duration::from_millis(1));
                }
            }
            while self.dispatch_available()? > 0 {}
            Ok(())
        })();
        self.consumer_attached.store(false, Ordering::Release);
        result
    }

    fn fail_locked<T>(&self, core: &mut ConsumerCore, fatal: RippleError) -> Result<T> {
        error!(%fatal, "pipeline fatal error");
        core.publisher.fail(&fatal);
        self.set_state(PipelineState::Closed);
        self.release_pool_user();
        self.data_signal.notify();
        self.space_signal.notify();
        Err(fatal)
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Process all fully-buffered windows and emit their outputs; with
    /// overlap enabled, also emit the final tail fragment. Transitions
    /// `Ready -> Draining`; a no-op once closed.
    pub fn flush(&self) -> Result<()> {
        match self.state() {
            PipelineState::Closed => return Ok(()),
            PipelineState::Ready => self.set_state(PipelineState::Draining),
            PipelineState::Created | PipelineState::Draining => {}
        }

        let mut core = self.core.lock();
        loop {
            if self.dispatch_locked(&mut core)? == 0 {
                break;
            }
        }
        self.flush_tail_locked(&mut core)
    }

    fn flush_tail_locked(&self, core: &mut ConsumerCore) -> Result<()> {
        if core.tail_emitted || core.overlap.overlap() == 0 || !core.overlap.started() {
            return Ok(());
        }
        if core.publisher.has_parked() {
            // Mailbox occupied; the close grace period retries.
            return Ok(());
        }

        core.tail_emitted = true;
        let tail = core.overlap.take_tail();
        debug!(len = tail.len(), "emitting overlap tail");
        match core.publisher.publish(tail) {
            Ok(outcome) => {
                self.record_publish(&outcome);
                Ok(())
            }
            Err(fatal) => self.fail_locked(core, fatal),
        }
    }

    /// Flush, deliver `on_complete`, release pool references, and refuse
    /// further input. Idempotent; waits up to a grace period for a parked
    /// fragment to find demand.
    pub fn close(&self) -> Result<()> {
        if self.state() == PipelineState::Closed {
            return Ok(());
        }

        let _ = self.flush();
        if self.state() == PipelineState::Closed {
            // A fatal error during the flush already delivered on_error.
            return Ok(());
        }

        let deadline = Instant::now() + Duration::from_millis(DEFAULT_CLOSE_GRACE_MS);
        loop {
            let mut core = self.core.lock();
            let cleared = match core.publisher.try_flush_parked() {
                Ok(None) => true,
                Ok(Some(outcome)) => {
                    self.record_publish(&outcome);
                    outcome != PublishOutcome::Parked
                }
                Err(fatal) => {
                    let _: Result<()> = self.fail_locked(&mut core, fatal);
                    return Ok(());
                }
            };
            if cleared {
                let _ = self.flush_tail_locked(&mut core);
                drop(core);
                break;
            }
            drop(core);
            if Instant::now() >= deadline {
                debug!("close grace period expired with a parked fragment");
                break;
            }
            self.data_signal.wait_timeout(Duration::from_millis(1));
        }

        let mut core = self.core.lock();
        core.publisher.complete();
        drop(core);
        self.set_state(PipelineState::Closed);
        self.release_pool_user();
        self.data_signal.notify();
        self.space_signal.notify();
        info!("pipeline closed");
        Ok(())
    }

    fn release_pool_user(&self) {
        if let Some(pool) = &self.pool {
            if self
                .pool_released
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                pool.release_user();
            }
        }
    }

    // ------------------------------------------------------------------
    // Observers
    // ------------------------------------------------------------------

    /// Threshold applied to the most recent window
    pub fn current_threshold(&self) -> f64 {
        self.gauge_threshold.load()
    }

    /// Smoothed noise level after the most recent window
    pub fn current_noise_level(&self) -> f64 {
        self.gauge_noise.load()
    }

    pub fn statistics(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Samples currently buffered in the ingestion ring
    pub fn buffer_level(&self) -> usize {
        self.ring.available()
    }

    /// Current ring capacity (changes under adaptive resizing)
    pub fn buffer_capacity(&self) -> usize {
        self.ring.capacity()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == PipelineState::Ready
    }

    pub fn block_size(&self) -> usize {
        self.config.block_size
    }

    pub fn hop_size(&self) -> usize {
        self.hop
    }

    pub fn config(&self) -> &DenoiseConfig {
        &self.config
    }
}

impl Drop for StreamingPipeline {
    fn drop(&mut self) {
        self.release_pool_user();
    }
}
