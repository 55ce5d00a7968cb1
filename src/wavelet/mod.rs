//! Wavelet filter pairs and the single-level transform interface
//!
//! The pipeline couples to wavelet math through exactly one capability:
//! a single-level forward transform `(filters, mode, input) -> (a, d)` and
//! its inverse, modelled by the [`WaveletTransform`] trait. Filter pairs
//! are orthonormal Daubechies families; the high-pass filter is derived
//! from the low-pass by the quadrature mirror relation.

pub mod transform;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RippleError};

pub use transform::{select_transform, FastTransform, QualityTransform};

/// How samples beyond the window edge are treated during convolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoundaryMode {
    /// Indices wrap around the window; orthonormal filters reconstruct
    /// exactly under this mode
    Periodic,
    /// Out-of-range samples read as zero; reconstruction is approximate
    /// near the edges
    ZeroPadding,
}

/// Supported orthonormal wavelet families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WaveletFamily {
    Haar,
    Db2,
    Db4,
}

impl WaveletFamily {
    /// Number of taps in the decomposition filters
    pub fn filter_length(&self) -> usize {
        match self {
            Self::Haar => 2,
            Self::Db2 => 4,
            Self::Db4 => 8,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Haar => "haar",
            Self::Db2 => "db2",
            Self::Db4 => "db4",
        }
    }
}

impl std::str::FromStr for WaveletFamily {
    type Err = RippleError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "haar" => Ok(Self::Haar),
            "db2" => Ok(Self::Db2),
            "db4" => Ok(Self::Db4),
            other => Err(RippleError::config(format!("unknown wavelet '{other}'"))),
        }
    }
}

/// Orthonormal scaling filter coefficients, ascending index order.
const HAAR_LO: [f64; 2] = [std::f64::consts::FRAC_1_SQRT_2, std::f64::consts::FRAC_1_SQRT_2];

const DB2_LO: [f64; 4] = [
    -0.12940952255092145,
    0.22414386804185735,
    0.8365163037378079,
    0.48296291314469025,
];

const DB4_LO: [f64; 8] = [
    -0.010597401784997278,
    0.032883011666982945,
    0.030841381835986965,
    -0.18703481171888114,
    -0.02798376941698385,
    0.6308807679295904,
    0.7148465705525415,
    0.23037781330885523,
];

/// A decomposition filter pair (low-pass and QMF-derived high-pass).
///
/// The filters are orthonormal, so the transpose of the analysis operator
/// is its inverse and no separate reconstruction pair is stored.
#[derive(Debug, Clone)]
pub struct Wavelet {
    family: WaveletFamily,
    lo: Vec<f64>,
    hi: Vec<f64>,
}

impl Wavelet {
    pub fn new(family: WaveletFamily) -> Self {
        let lo: Vec<f64> = match family {
            WaveletFamily::Haar => HAAR_LO.to_vec(),
            WaveletFamily::Db2 => DB2_LO.to_vec(),
            WaveletFamily::Db4 => DB4_LO.to_vec(),
        };
        // Quadrature mirror: g[k] = (-1)^k * h[L-1-k]
        let len = lo.len();
        let hi: Vec<f64> = (0..len)
            .map(|k| {
                let sign = if k % 2 == 0 { 1.0 } else { -1.0 };
                sign * lo[len - 1 - k]
            })
            .collect();

        Self { family, lo, hi }
    }

    pub fn family(&self) -> WaveletFamily {
        self.family
    }

    pub fn filter_length(&self) -> usize {
        self.lo.len()
    }

    /// Low-pass (approximation) decomposition filter
    pub fn low_pass(&self) -> &[f64] {
        &self.lo
    }

    /// High-pass (detail) decomposition filter
    pub fn high_pass(&self) -> &[f64] {
        &self.hi
    }
}

/// Single-level wavelet transform capability.
///
/// `input` must be even-length and non-empty; `approx` and `detail` hold
/// `input.len() / 2` coefficients each. Implementations write results in
/// place so callers control scratch allocation.
pub trait WaveletTransform: Send + Sync {
    /// Decompose `input` into approximation and detail coefficients.
    fn forward(
        &self,
        wavelet: &Wavelet,
        mode: BoundaryMode,
        input: &[f64],
        approx: &mut [f64],
        detail: &mut [f64],
    ) -> Result<()>;

    /// Reconstruct a signal from approximation and detail coefficients.
    fn inverse(
        &self,
        wavelet: &Wavelet,
        mode: BoundaryMode,
        approx: &[f64],
        detail: &[f64],
        output: &mut [f64],
    ) -> Result<()>;
}

pub(crate) fn check_forward_shape(input: &[f64], approx: &[f64], detail: &[f64]) -> Result<()> {
    if input.is_empty() {
        return Err(RippleError::signal("transform input is empty"));
    }
    if input.len() % 2 != 0 {
        return Err(RippleError::signal("transform input length must be even"));
    }
    if approx.len() != input.len() / 2 || detail.len() != input.len() / 2 {
        return Err(RippleError::config(
            "coefficient buffers must hold input.len() / 2 samples",
        ));
    }
    Ok(())
}

pub(crate) fn check_inverse_shape(approx: &[f64], detail: &[f64], output: &[f64]) -> Result<()> {
    if approx.is_empty() {
        return Err(RippleError::signal("transform input is empty"));
    }
    if approx.len() != detail.len() {
        return Err(RippleError::config(
            "approximation and detail lengths differ",
        ));
    }
    if output.len() != approx.len() * 2 {
        return Err(RippleError::config(
            "output buffer must hold 2 * approx.len() samples",
        ));
    }
    Ok(())
}
