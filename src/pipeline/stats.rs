//! Pipeline statistics
//!
//! Monotonic counters for operators plus an HDR histogram of per-block
//! processing time. Counters only move forward except on `reset`; readers
//! may observe a brief skew between `samples_processed` and
//! `blocks_emitted`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use hdrhistogram::Histogram;
use parking_lot::Mutex;
use serde::Serialize;

use crate::constants::{LATENCY_HISTOGRAM_SIGFIGS, NANOS_PER_SEC};

/// Atomic `f64` stored as bits; used for last-observed gauge values.
pub(crate) struct AtomicF64(AtomicU64);

impl AtomicF64 {
    pub(crate) fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    pub(crate) fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub(crate) fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

pub struct PipelineStats {
    samples_processed: AtomicU64,
    blocks_processed: AtomicU64,
    blocks_emitted: AtomicU64,
    publish_errors: AtomicU64,
    total_processing_ns: AtomicU64,
    max_processing_ns: AtomicU64,
    start: Mutex<Instant>,
    latency: Mutex<Histogram<u64>>,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self {
            samples_processed: AtomicU64::new(0),
            blocks_processed: AtomicU64::new(0),
            blocks_emitted: AtomicU64::new(0),
            publish_errors: AtomicU64::new(0),
            total_processing_ns: AtomicU64::new(0),
            max_processing_ns: AtomicU64::new(0),
            start: Mutex::new(Instant::now()),
            latency: Mutex::new(
                Histogram::new(LATENCY_HISTOGRAM_SIGFIGS).expect("valid sigfig count"),
            ),
        }
    }

    pub(crate) fn record_ingest(&self, samples: usize) {
        self.samples_processed
            .fetch_add(samples as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_block_timing(&self, nanos: u64) {
        self.blocks_processed.fetch_add(1, Ordering::Relaxed);
        self.total_processing_ns.fetch_add(nanos, Ordering::Relaxed);
        self.max_processing_ns.fetch_max(nanos, Ordering::Relaxed);
        let _ = self.latency.lock().record(nanos.max(1));
    }

    pub(crate) fn record_emitted(&self) {
        self.blocks_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_publish_error(&self) {
        self.publish_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Zero every counter and restart the clock.
    pub fn reset(&self) {
        self.samples_processed.store(0, Ordering::Relaxed);
        self.blocks_processed.store(0, Ordering::Relaxed);
        self.blocks_emitted.store(0, Ordering::Relaxed);
        self.publish_errors.store(0, Ordering::Relaxed);
        self.total_processing_ns.store(0, Ordering::Relaxed);
        self.max_processing_ns.store(0, Ordering::Relaxed);
        self.latency.lock().reset();
        *self.start.lock() = Instant::now();
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let samples = self.samples_processed.load(Ordering::Relaxed);
        let blocks_processed = self.blocks_processed.load(Ordering::Relaxed);
        let total_ns = self.total_processing_ns.load(Ordering::Relaxed);
        let elapsed = self.start.lock().elapsed();

        let latency = self.latency.lock();
        StatsSnapshot {
            samples_processed: samples,
            blocks_emitted: self.blocks_emitted.load(Ordering::Relaxed),
            publish_errors: self.publish_errors.load(Ordering::Relaxed),
            avg_processing_ns: if blocks_processed > 0 {
                total_ns / blocks_processed
            } else {
                0
            },
            max_processing_ns: self.max_processing_ns.load(Ordering::Relaxed),
            p50_processing_ns: latency.value_at_quantile(0.50),
            p99_processing_ns: latency.value_at_quantile(0.99),
            throughput_samples_per_s: samples as f64 / (elapsed.as_nanos() as f64 / NANOS_PER_SEC),
        }
    }
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time statistics record
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StatsSnapshot {
    pub samples_processed: u64,
    pub blocks_emitted: u64,
    pub publish_errors: u64,
    pub avg_processing_ns: u64,
    pub max_processing_ns: u64,
    pub p50_processing_ns: u64,
    pub p99_processing_ns: u64,
    pub throughput_samples_per_s: f64,
}

impl std::fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "samples={} blocks={} errors={} avg_ns={} max_ns={} p99_ns={} throughput={:.0}/s",
            self.samples_processed,
            self.blocks_emitted,
            self.publish_errors,
            self.avg_processing_ns,
            self.max_processing_ns,
            self.p99_processing_ns,
            self.throughput_samples_per_s
        )
    }
}
