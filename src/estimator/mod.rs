//! Online statistics: quantiles, noise level, threshold dynamics

pub mod adapter;
pub mod mad;
pub mod p2;

pub use adapter::ThresholdAdapter;
pub use mad::{MadEstimator, ThresholdMethod};
pub use p2::{P2Quantile, SyncP2Quantile};
