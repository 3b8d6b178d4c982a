//! Gradient rules for the quantization rounding step

use ndarray::{ArrayD, Zip};

use crate::quant::config::GradientMode;

/// Gradient of a fake-quantized value with respect to its input
///
/// Rounding has zero derivative almost everywhere, so a training framework
/// substitutes one of these rules for the true gradient. `saturated` marks the
/// elements whose level was changed by clipping (or that were non-finite).
pub trait GradientRule: Send + Sync {
    fn input_gradient(&self, grad_output: &ArrayD<f32>, saturated: &ArrayD<bool>) -> ArrayD<f32>;
}

/// Straight-through inside the clip range, zero where saturated
#[derive(Clone, Copy, Debug, Default)]
pub struct ClippedStraightThrough;

impl GradientRule for ClippedStraightThrough {
    fn input_gradient(&self, grad_output: &ArrayD<f32>, saturated: &ArrayD<bool>) -> ArrayD<f32> {
        Zip::from(grad_output)
            .and(saturated)
            .map_collect(|&g, &clipped| if clipped { 0.0 } else { g })
    }
}

/// Identity gradient everywhere
#[derive(Clone, Copy, Debug, Default)]
pub struct StraightThrough;

impl GradientRule for StraightThrough {
    fn input_gradient(&self, grad_output: &ArrayD<f32>, _saturated: &ArrayD<bool>) -> ArrayD<f32> {
        grad_output.clone()
    }
}

/// No gradient flows to the input
#[derive(Clone, Copy, Debug, Default)]
pub struct StopGradient;

impl GradientRule for StopGradient {
    fn input_gradient(&self, grad_output: &ArrayD<f32>, _saturated: &ArrayD<bool>) -> ArrayD<f32> {
        ArrayD::zeros(grad_output.raw_dim())
    }
}

impl GradientMode {
    /// Built-in rule for this mode.
    pub fn rule(self) -> &'static dyn GradientRule {
        match self {
            Self::ClippedStraightThrough => &ClippedStraightThrough,
            Self::StraightThrough => &StraightThrough,
            Self::Stop => &StopGradient,
        }
    }
}
