//! Demonstration binary for the Ripple streaming denoiser
//!
//! Streams a noisy sine through a pipeline on two threads (producer +
//! consumer) and prints the resulting statistics.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;

use ripple::{
    DenoiseConfig, StreamingPipeline, Subscriber, Subscription, ThresholdMethod, ThresholdType,
    WaveletFamily, WindowFunction, UNBOUNDED,
};

struct CountingSink {
    received: Arc<Mutex<usize>>,
}

impl Subscriber for CountingSink {
    fn on_subscribe(&mut self, subscription: Arc<Subscription>) {
        subscription.request(UNBOUNDED);
    }

    fn on_next(&mut self, fragment: &[f64]) -> ripple::Result<()> {
        *self.received.lock() += fragment.len();
        Ok(())
    }

    fn on_error(&mut self, error: &ripple::RippleError) {
        eprintln!("stream failed: {error}");
    }

    fn on_complete(&mut self) {
        println!("stream complete");
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    println!("Ripple - Streaming Wavelet Denoiser (v{})", ripple::VERSION);

    let config = DenoiseConfig::new(256)?
        .with_wavelet(WaveletFamily::Db4)
        .with_overlap(0.5)?
        .with_window_function(WindowFunction::Hann)
        .with_threshold(ThresholdMethod::Universal, ThresholdType::Soft)
        .with_adaptive_threshold(true);

    let pipeline = Arc::new(StreamingPipeline::new(config)?);
    let received = Arc::new(Mutex::new(0usize));
    pipeline.subscribe(Box::new(CountingSink {
        received: Arc::clone(&received),
    }))?;

    let stop = Arc::new(AtomicBool::new(false));
    let consumer = {
        let pipeline = Arc::clone(&pipeline);
        let stop = Arc::clone(&stop);
        std::thread::spawn(move || pipeline.run_consumer(&stop))
    };

    // 10 seconds of a 440 Hz tone at 48 kHz with additive noise.
    let total_samples = 480_000;
    let mut noise_state = 0x2545_f491_4f6c_dd1du64;
    let mut chunk = Vec::with_capacity(1024);
    for start in (0..total_samples).step_by(1024) {
        chunk.clear();
        for i in start..(start + 1024).min(total_samples) {
            let t = i as f64 / 48_000.0;
            let clean = (2.0 * std::f64::consts::PI * 440.0 * t).sin();
            // xorshift* noise in [-0.15, 0.15)
            noise_state ^= noise_state >> 12;
            noise_state ^= noise_state << 25;
            noise_state ^= noise_state >> 27;
            let uniform = (noise_state.wrapping_mul(0x2545_f491_4f6c_dd1d) >> 11) as f64
                / (1u64 << 53) as f64;
            chunk.push(clean + (uniform - 0.5) * 0.3);
        }
        pipeline.process_block(&chunk)?;
    }

    pipeline.flush()?;
    pipeline.close()?;
    stop.store(true, Ordering::Release);
    consumer.join().expect("consumer thread panicked")?;

    let stats = pipeline.statistics();
    println!("samples in:      {}", stats.samples_processed);
    println!("samples out:     {}", received.lock());
    println!("blocks emitted:  {}", stats.blocks_emitted);
    println!("avg block time:  {} ns", stats.avg_processing_ns);
    println!("p99 block time:  {} ns", stats.p99_processing_ns);
    println!("throughput:      {:.0} samples/s", stats.throughput_samples_per_s);
    println!("noise estimate:  {:.4}", pipeline.current_noise_level());
    println!("threshold:       {:.4}", pipeline.current_threshold());

    Ok(())
}
