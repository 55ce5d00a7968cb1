//! Ingestion buffering: SPSC ring, adaptive resizing, sliding windows
//!
//! The buffering layer between the producer and consumer threads:
//!
//! - [`RingBuffer`]: lock-free single-producer single-consumer queue with
//!   power-of-two capacity and wait-free single-sample operations
//! - [`ResizableRing`]: capacity swap preserving pending samples, driven
//!   by the adaptive supervisor
//! - [`StreamingWindow`]: overlapping window extraction with a zero-copy
//!   fast path and a thread-local scratch copy path

pub mod resizable;
pub mod ring;
pub mod window;

pub use resizable::ResizableRing;
pub use ring::RingBuffer;
pub use window::{cleanup_thread, StreamingWindow};
