//! Signal processing: overlap-add reconstruction and per-window denoising

pub mod engine;
pub mod overlap;

pub use engine::{DenoiseEngine, DenoiseOutcome};
pub use overlap::{cached_window, clear_window_cache, OverlapBuffer, WindowFunction};
