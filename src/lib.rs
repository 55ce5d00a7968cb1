//! Ripple - Real-time streaming wavelet denoiser
//!
//! Consumes an unbounded sequence of samples and emits a denoised stream
//! with bounded latency and memory. The DSP is a handful of convolution
//! kernels; the substance is the streaming core around them: a lock-free
//! SPSC ring buffer with adaptive capacity, a sliding-window state
//! machine with overlap-add reconstruction, an online P2/MAD noise
//! estimator, an attack/release threshold controller, and a
//! demand-driven publisher.
//!
//! ```no_run
//! use ripple::{DenoiseConfig, StreamingPipeline, WaveletFamily};
//!
//! let config = DenoiseConfig::new(256)?
//!     .with_wavelet(WaveletFamily::Db4)
//!     .with_overlap(0.5)?;
//! let pipeline = StreamingPipeline::new(config)?;
//! // pipeline.subscribe(...), then feed samples with process_block.
//! # Ok::<(), ripple::RippleError>(())
//! ```

pub mod buffer;
pub mod config;
pub mod constants;
pub mod dsp;
pub mod error;
pub mod estimator;
pub mod pipeline;
pub mod pool;
pub mod wavelet;

// Re-export main components
pub use buffer::{cleanup_thread, ResizableRing, RingBuffer, StreamingWindow};
pub use config::{DenoiseConfig, ImplStrategy, ThresholdType};
pub use dsp::{clear_window_cache, DenoiseEngine, DenoiseOutcome, OverlapBuffer, WindowFunction};
pub use error::{Result, RippleError};
pub use estimator::{MadEstimator, P2Quantile, SyncP2Quantile, ThresholdAdapter, ThresholdMethod};
pub use pipeline::publisher::{Subscriber, Subscription, UNBOUNDED};
pub use pipeline::stats::StatsSnapshot;
pub use pipeline::{PipelineState, StreamingPipeline};
pub use pool::{global_pool, SharedPool, SlabHandle};
pub use wavelet::{BoundaryMode, Wavelet, WaveletFamily, WaveletTransform};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
