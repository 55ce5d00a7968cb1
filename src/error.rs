//! Error types and handling for the Ripple library

use thiserror::Error;

/// Result type alias for Ripple operations
pub type Result<T> = std::result::Result<T, RippleError>;

/// Main error type for the Ripple library
#[derive(Error, Debug)]
pub enum RippleError {
    /// Invalid configuration or argument
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the offending argument
        message: String,
    },

    /// Signal validation errors (NaN/Inf samples, empty operator input)
    #[error("Invalid signal: {reason}")]
    InvalidSignal {
        /// Reason the signal was rejected
        reason: String,
    },

    /// Operation not valid in the current pipeline state
    #[error("Invalid state: {message}")]
    InvalidState {
        /// Description of the state conflict
        message: String,
    },

    /// The pipeline has been closed and refuses further input
    #[error("Pipeline is closed")]
    Closed,

    /// Non-blocking ingestion could not buffer all provided samples
    #[error("Capacity exceeded: accepted {accepted} samples")]
    CapacityExceeded {
        /// Number of samples that were buffered before the ring filled
        accepted: usize,
    },

    /// Internal invariant violation (e.g. P2 marker ordering). Fatal: the
    /// pipeline publishes `on_error` and transitions to Closed.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the violated invariant
        message: String,
    },
}

impl RippleError {
    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create a new signal validation error
    pub fn signal(reason: impl Into<String>) -> Self {
        Self::InvalidSignal {
            reason: reason.into(),
        }
    }

    /// Create a new state error
    pub fn state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Create a new internal invariant error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Check if this error is recoverable by retrying later
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::CapacityExceeded { .. })
    }

    /// Check if this error must tear down the pipeline
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }

    /// Check if this error reflects a lifecycle/state conflict
    pub fn is_state_error(&self) -> bool {
        matches!(self, Self::InvalidState { .. } | Self::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = RippleError::config("test message");
        assert!(matches!(err, RippleError::InvalidConfig { .. }));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_error_classification() {
        let full = RippleError::CapacityExceeded { accepted: 12 };
        assert!(full.is_recoverable());
        assert!(!full.is_fatal());

        let internal = RippleError::internal("marker order violated");
        assert!(internal.is_fatal());
        assert!(!internal.is_recoverable());

        assert!(RippleError::Closed.is_state_error());
        assert!(RippleError::state("double subscribe").is_state_error());
        assert!(!RippleError::signal("NaN").is_state_error());
    }

    #[test]
    fn test_capacity_error_reports_count() {
        let err = RippleError::CapacityExceeded { accepted: 7 };
        assert_eq!(err.to_string(), "Capacity exceeded: accepted 7 samples");
    }
}
