//! Quantize and dequantize

use ndarray::{ArrayD, Dimension, Zip};

use super::params::{derive_params, quantize_value};
use super::tensor::{group_index, QuantizedTensor};
use crate::error::{QuantError, Result};
use crate::quant::calibration::CalibrationStats;
use crate::quant::config::{NonFinitePolicy, QuantMode, QuantizationConfig};
use crate::trace::{TraceStep, TRACER};

/// Quantize `x` with the scale and zero-point derived from `stats`.
///
/// `stats` decide the grouping: per-tensor statistics broadcast to every
/// element, keep-dims statistics must broadcast against `x`.
///
/// # Errors
/// - `InvalidInput` if the statistics mode differs from the config, or if
///   `x` holds NaN/Inf under `NonFinitePolicy::Reject`
/// - `ShapeMismatch` if the statistics do not broadcast against `x`
pub fn quantize(
    x: &ArrayD<f32>,
    stats: &CalibrationStats,
    config: &QuantizationConfig,
) -> Result<QuantizedTensor> {
    quantize_with_mask(x, stats, config).map(|(quantized, _)| quantized)
}

/// Quantize and also report which elements were clipped.
pub(crate) fn quantize_with_mask(
    x: &ArrayD<f32>,
    stats: &CalibrationStats,
    config: &QuantizationConfig,
) -> Result<(QuantizedTensor, ArrayD<bool>)> {
    TRACER.span(
        TraceStep::Quantize,
        || {
            format!(
                "{}-bit {:?} {:?} groups={}",
                config.precision(),
                config.mode(),
                x.shape(),
                stats.num_groups()
            )
        },
        || quantize_inner(x, stats, config),
    )
}

fn quantize_inner(
    x: &ArrayD<f32>,
    stats: &CalibrationStats,
    config: &QuantizationConfig,
) -> Result<(QuantizedTensor, ArrayD<bool>)> {
    if stats.mode() != config.mode() {
        return Err(QuantError::InvalidInput(format!(
            "{:?} statistics cannot drive a {:?} config",
            stats.mode(),
            config.mode()
        )));
    }
    if config.non_finite() == NonFinitePolicy::Reject {
        if let Some(bad) = x.iter().find(|v| !v.is_finite()) {
            return Err(QuantError::InvalidInput(format!("cannot quantize non-finite value {bad}")));
        }
    }

    let (scale, zero_point) = derive_params(stats, config, x.ndim())?;
    let scale_view = scale
        .broadcast(x.raw_dim())
        .ok_or_else(|| QuantError::shape_mismatch(x.shape(), scale.shape()))?;
    let zp_view = zero_point
        .broadcast(x.raw_dim())
        .ok_or_else(|| QuantError::shape_mismatch(x.shape(), zero_point.shape()))?;

    let (qmin, qmax) = (config.qmin(), config.qmax());
    let mut values = ArrayD::<i32>::zeros(x.raw_dim());
    let mut saturated = ArrayD::<bool>::from_elem(x.raw_dim(), false);
    Zip::from(&mut values)
        .and(&mut saturated)
        .and(x)
        .and(&scale_view)
        .and(&zp_view)
        .for_each(|q, sat, &v, &s, &z| {
            (*q, *sat) = quantize_value(v, s, z, qmin, qmax);
        });

    let clipped = saturated.iter().filter(|&&s| s).count();
    if clipped > 0 {
        log::debug!("quantize: {clipped}/{} elements saturated", x.len());
    }

    let zero_point = match config.mode() {
        QuantMode::Symmetric => None,
        QuantMode::Asymmetric => Some(zero_point),
    };
    let quantized =
        QuantizedTensor::new(values, scale, zero_point, config.precision(), config.mode());
    Ok((quantized, saturated))
}

/// Reconstruct floats: `(q - zero_point) * scale` per group.
pub fn dequantize(quantized: &QuantizedTensor) -> ArrayD<f32> {
    TRACER.span(
        TraceStep::Dequantize,
        || format!("{:?} groups={}", quantized.shape(), quantized.num_groups()),
        || {
            let values = quantized.values();
            let scale = quantized.scale();
            let zero_point = quantized.zero_point_or_zeros();
            let keep_shape = scale.shape();
            ArrayD::from_shape_fn(values.raw_dim(), |index| {
                let group = group_index(index.slice(), keep_shape);
                (values[&index] - zero_point[&group]) as f32 * scale[&group]
            })
        },
    )
}
