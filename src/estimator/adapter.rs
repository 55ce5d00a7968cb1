//! Adaptive threshold controller
//!
//! First-order low-pass with separate attack and release time constants:
//! the threshold reacts quickly when the noise level rises and backs off
//! slowly when it falls. Coefficients derive from the time constants and
//! the expected per-block period: `alpha = 1 - exp(-T / tau)`.

use crate::error::{Result, RippleError};

#[derive(Debug, Clone)]
pub struct ThresholdAdapter {
    current: f64,
    target: f64,
    attack_coeff: f64,
    release_coeff: f64,
    min: f64,
    max: f64,
}

impl ThresholdAdapter {
    /// Create an adapter.
    ///
    /// `attack_ms` / `release_ms` are the time constants; `block_period_ms`
    /// is the expected wall-clock time between `tick()` calls. All three
    /// must be positive.
    pub fn new(
        attack_ms: f64,
        release_ms: f64,
        block_period_ms: f64,
        min: f64,
        max: f64,
    ) -> Result<Self> {
        if attack_ms <= 0.0 || release_ms <= 0.0 || block_period_ms <= 0.0 {
            return Err(RippleError::config(
                "attack, release, and block period must be positive",
            ));
        }
        if !(min <= max) || !min.is_finite() {
            return Err(RippleError::config("threshold bounds must satisfy min <= max"));
        }

        Ok(Self {
            current: min,
            target: min,
            attack_coeff: 1.0 - (-block_period_ms / attack_ms).exp(),
            release_coeff: 1.0 - (-block_period_ms / release_ms).exp(),
            min,
            max,
        })
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    /// Set the value the threshold moves toward, clamped to `[min, max]`.
    pub fn set_target(&mut self, value: f64) {
        self.target = value.clamp(self.min, self.max);
    }

    /// Force the threshold, clamped; the target resets to the same value.
    pub fn set_current(&mut self, value: f64) {
        self.current = value.clamp(self.min, self.max);
        self.target = self.current;
    }

    /// Advance one block period: move `current` toward `target` with the
    /// attack coefficient when rising, release when falling. Returns the
    /// updated threshold.
    pub fn tick(&mut self) -> f64 {
        let coeff = if self.target > self.current {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.current += coeff * (self.target - self.current);
        self.current
    }

    /// Whether `current` is within `epsilon` of `target`
    pub fn reached_target(&self, epsilon: f64) -> bool {
        (self.target - self.current).abs() <= epsilon
    }
}
