//! Quantization error metrics

use ndarray::{ArrayD, Zip};

use crate::error::{QuantError, Result};
use crate::quant::config::{Granularity, QuantizationConfig};
use crate::quant::fake_quantize::fake_quantize;

/// Mean squared error between an input and its reconstruction.
///
/// Returns 0 for empty arrays.
pub fn quantization_mse(original: &ArrayD<f32>, reconstructed: &ArrayD<f32>) -> Result<f32> {
    if original.shape() != reconstructed.shape() {
        return Err(QuantError::shape_mismatch(original.shape(), reconstructed.shape()));
    }
    if original.is_empty() {
        return Ok(0.0);
    }
    let mut sum_sq = 0.0f64;
    Zip::from(original).and(reconstructed).for_each(|&a, &b| {
        sum_sq += f64::from(a - b).powi(2);
    });
    Ok((sum_sq / original.len() as f64) as f32)
}

/// Symmetric fake-quantization MSE of `x` per-tensor and per-channel over
/// `axes`, as `(per_tensor_mse, per_channel_mse)`.
pub fn compare_granularities(x: &ArrayD<f32>, axes: &[usize], precision: u8) -> Result<(f32, f32)> {
    let per_tensor = QuantizationConfig::symmetric(precision)?;
    let per_channel = per_tensor.with_granularity(Granularity::per_channel(axes.iter().copied()));

    let tensor_mse = quantization_mse(x, fake_quantize(x, &per_tensor)?.output())?;
    let channel_mse = quantization_mse(x, fake_quantize(x, &per_channel)?.output())?;
    log::debug!(
        "{precision}-bit granularity comparison: per-tensor mse {tensor_mse:.3e}, per-channel mse {channel_mse:.3e}"
    );
    Ok((tensor_mse, channel_mse))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{arr1, arr2};

    #[test]
    fn test_mse_basic() {
        let a = arr1(&[1.0, 2.0, 3.0]).into_dyn();
        let b = arr1(&[1.0, 2.0, 5.0]).into_dyn();
        assert_abs_diff_eq!(quantization_mse(&a, &b).unwrap(), 4.0 / 3.0, epsilon = 1e-6);
        assert_eq!(quantization_mse(&a, &a).unwrap(), 0.0);
    }

    #[test]
    fn test_mse_empty_and_mismatch() {
        let empty = ArrayD::<f32>::zeros(ndarray::IxDyn(&[0]));
        assert_eq!(quantization_mse(&empty, &empty).unwrap(), 0.0);

        let a = arr1(&[1.0, 2.0]).into_dyn();
        let b = arr1(&[1.0]).into_dyn();
        assert!(matches!(quantization_mse(&a, &b), Err(QuantError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_per_channel_beats_per_tensor_on_skewed_channels() {
        // Rows differ in range by three orders of magnitude
        let x = arr2(&[
            [0.011, -0.023, 0.037, -0.041],
            [0.013, 0.029, -0.031, 0.047],
            [11.0, -23.0, 37.0, -41.0],
        ])
        .into_dyn();
        let (tensor_mse, channel_mse) = compare_granularities(&x, &[0], 4).unwrap();
        assert!(channel_mse < tensor_mse);
    }

    #[test]
    fn test_compare_granularities_invalid_axis() {
        let x = arr2(&[[1.0, 2.0]]).into_dyn();
        let err = compare_granularities(&x, &[5], 8).unwrap_err();
        assert!(err.is_config_error());
    }
}
