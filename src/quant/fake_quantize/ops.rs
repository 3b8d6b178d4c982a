//! Fake quantization forward pass and its backward hook

use ndarray::ArrayD;

use super::gradient::GradientRule;
use crate::error::{QuantError, Result};
use crate::quant::calibration::{calibrate, CalibrationStats, MovingAverageStats};
use crate::quant::codec::{dequantize, quantize_with_mask, QuantizedTensor};
use crate::quant::config::{GradientMode, QuantizationConfig};

/// Result of a quantize → dequantize round trip
///
/// Holds the reconstruction used in the forward pass and everything the
/// backward pass needs: the saturation mask and the configured gradient mode.
#[derive(Clone, Debug)]
pub struct FakeQuantized {
    output: ArrayD<f32>,
    saturated: ArrayD<bool>,
    quantized: QuantizedTensor,
    gradient: GradientMode,
}

impl FakeQuantized {
    /// Dequantized values, same shape as the input.
    pub fn output(&self) -> &ArrayD<f32> {
        &self.output
    }

    pub fn into_output(self) -> ArrayD<f32> {
        self.output
    }

    /// `true` where the value fell outside the representable range or was non-finite.
    pub fn saturated(&self) -> &ArrayD<bool> {
        &self.saturated
    }

    /// The intermediate integer representation.
    pub fn quantized(&self) -> &QuantizedTensor {
        &self.quantized
    }

    pub fn gradient_mode(&self) -> GradientMode {
        self.gradient
    }

    /// Fraction of elements that saturated.
    pub fn saturation_ratio(&self) -> f32 {
        if self.saturated.is_empty() {
            return 0.0;
        }
        let clipped = self.saturated.iter().filter(|&&s| s).count();
        clipped as f32 / self.saturated.len() as f32
    }

    /// Input gradient under the configured [`GradientMode`].
    ///
    /// # Errors
    /// `ShapeMismatch` if `grad_output` does not match the forward output.
    pub fn backward(&self, grad_output: &ArrayD<f32>) -> Result<ArrayD<f32>> {
        self.backward_with(self.gradient.rule(), grad_output)
    }

    /// Input gradient under a caller-supplied rule.
    pub fn backward_with(
        &self,
        rule: &dyn GradientRule,
        grad_output: &ArrayD<f32>,
    ) -> Result<ArrayD<f32>> {
        if grad_output.shape() != self.output.shape() {
            return Err(QuantError::shape_mismatch(self.output.shape(), grad_output.shape()));
        }
        Ok(rule.input_gradient(grad_output, &self.saturated))
    }
}

/// Calibrate `x`, quantize and dequantize it.
pub fn fake_quantize(x: &ArrayD<f32>, config: &QuantizationConfig) -> Result<FakeQuantized> {
    let stats = calibrate(x, config)?;
    fake_quantize_with_stats(x, &stats, config)
}

/// Quantize and dequantize `x` with precomputed statistics.
pub fn fake_quantize_with_stats(
    x: &ArrayD<f32>,
    stats: &CalibrationStats,
    config: &QuantizationConfig,
) -> Result<FakeQuantized> {
    let (quantized, saturated) = quantize_with_mask(x, stats, config)?;
    let output = dequantize(&quantized);
    Ok(FakeQuantized { output, saturated, quantized, gradient: config.gradient() })
}

/// Fake-quantize with statistics smoothed by a caller-owned accumulator.
///
/// The statistics of `x` are folded into `observer` first, so the very first
/// call behaves like [`fake_quantize`].
pub fn fake_quantize_observed(
    x: &ArrayD<f32>,
    config: &QuantizationConfig,
    observer: &mut MovingAverageStats,
) -> Result<FakeQuantized> {
    let stats = calibrate(x, config)?;
    observer.update(&stats)?;
    let smoothed = observer.read().ok_or_else(|| {
        QuantError::InvalidCalibration("moving average holds no statistics".to_string())
    })?;
    fake_quantize_with_stats(x, &smoothed, config)
}
