//! Quantization mode, granularity and policy type definitions

use serde::{Deserialize, Serialize};

use crate::error::{QuantError, Result};

/// Quantization mode: symmetric or asymmetric
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QuantMode {
    /// Symmetric: zero-point = 0, range = [-max_abs, max_abs]
    #[default]
    Symmetric,
    /// Asymmetric: zero-point != 0, range = [min, max]
    Asymmetric,
}

/// Granularity at which scale/zero-point are computed
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    /// Single scale/zero-point for the entire tensor
    #[default]
    PerTensor,
    /// Independent scale/zero-point for every index along the retained axes
    PerChannel(Vec<usize>),
}

impl Granularity {
    /// Per-channel granularity over `axes`.
    ///
    /// Axes are sorted and de-duplicated; an empty set means per-tensor.
    pub fn per_channel(axes: impl IntoIterator<Item = usize>) -> Self {
        let mut axes: Vec<usize> = axes.into_iter().collect();
        axes.sort_unstable();
        axes.dedup();
        if axes.is_empty() {
            Self::PerTensor
        } else {
            Self::PerChannel(axes)
        }
    }

    /// Retained axes (empty for per-tensor).
    pub fn axes(&self) -> &[usize] {
        match self {
            Self::PerTensor => &[],
            Self::PerChannel(axes) => axes,
        }
    }

    pub fn is_per_channel(&self) -> bool {
        matches!(self, Self::PerChannel(_))
    }

    /// Check every retained axis exists in a rank-`rank` input.
    pub fn check_rank(&self, rank: usize) -> Result<()> {
        match self.axes().iter().find(|&&axis| axis >= rank) {
            Some(&axis) => Err(QuantError::InvalidAxis { axis, rank }),
            None => Ok(()),
        }
    }

    pub(crate) fn normalized(self) -> Self {
        match self {
            Self::PerTensor => Self::PerTensor,
            Self::PerChannel(axes) => Self::per_channel(axes),
        }
    }
}

/// How calibration derives the range of each quantization group
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationMethod {
    /// Full observed range
    #[default]
    MinMax,
    /// Percentile bounds, robust to outliers
    Percentile {
        /// Lower percentile in percent (e.g. 0.01)
        lower: f32,
        /// Upper percentile in percent (e.g. 99.99)
        upper: f32,
    },
    /// Grid search over shrink ratios of the observed range, keeping the
    /// ratio with the lowest reconstruction MSE
    MseSearch {
        /// Number of candidate ratios
        steps: usize,
        /// Smallest ratio tried; candidates are evenly spaced in [min_ratio, 1]
        min_ratio: f32,
    },
}

impl CalibrationMethod {
    pub(crate) fn validate(&self) -> Result<()> {
        match *self {
            Self::MinMax => Ok(()),
            Self::Percentile { lower, upper } => {
                if !(lower.is_finite() && upper.is_finite())
                    || lower < 0.0
                    || upper > 100.0
                    || lower >= upper
                {
                    return Err(QuantError::InvalidCalibration(format!(
                        "percentile bounds ({lower}, {upper}) must satisfy 0 <= lower < upper <= 100"
                    )));
                }
                Ok(())
            }
            Self::MseSearch { steps, min_ratio } => {
                if steps == 0 {
                    return Err(QuantError::InvalidCalibration(
                        "mse search needs at least one step".to_string(),
                    ));
                }
                if !(min_ratio > 0.0 && min_ratio <= 1.0) {
                    return Err(QuantError::InvalidCalibration(format!(
                        "mse search min_ratio {min_ratio} must be in (0, 1]"
                    )));
                }
                Ok(())
            }
        }
    }
}

/// Handling of NaN/Inf elements in the input
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NonFinitePolicy {
    /// Fail with `InvalidInput`
    #[default]
    Reject,
    /// Clip-and-continue: calibration ignores non-finite elements, NaN maps
    /// to the zero-point and infinities saturate
    Clip,
}

/// Backward behavior of the quantizer (see `GradientRule`)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GradientMode {
    /// Identity inside the clip range, zero where the value saturated
    #[default]
    ClippedStraightThrough,
    /// Identity everywhere
    StraightThrough,
    /// Zero everywhere (stop-gradient)
    Stop,
}
