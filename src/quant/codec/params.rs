//! Scale and zero-point derivation
//!
//! Symmetric: `scale = max(max_abs, eps) / qmax`, zero-point 0.
//! Asymmetric: `scale = max(max - min, eps) / qmax`, `zp = round(-min / scale)`.
//! A degenerate (all-zero) calibrated group gets `scale = 1`.

use ndarray::{ArrayD, Zip};

use crate::error::Result;
use crate::quant::calibration::CalibrationStats;
use crate::quant::config::{QuantMode, QuantizationConfig};

/// Positive floor on the range so scale is never zero.
pub const SCALE_EPSILON: f32 = 1e-8;

/// Symmetric scale for one group.
///
/// `explicit_clip` disables the all-zero special case: a zero clip bound
/// really means "saturate everything".
pub(crate) fn symmetric_scale(max_abs: f32, qmax: i32, explicit_clip: bool) -> f32 {
    if max_abs == 0.0 && !explicit_clip {
        return 1.0;
    }
    max_abs.max(SCALE_EPSILON) / qmax as f32
}

/// Asymmetric `(scale, zero_point)` for one group whose range contains zero.
pub(crate) fn asymmetric_params(min_val: f32, max_val: f32, qmax: i32, explicit_clip: bool) -> (f32, i32) {
    let range = max_val - min_val;
    if range == 0.0 && !explicit_clip {
        return (1.0, 0);
    }
    let scale = range.max(SCALE_EPSILON) / qmax as f32;
    let zero_point = (-min_val / scale).round_ties_even() as i32;
    (scale, zero_point.clamp(0, qmax))
}

/// Map one value to its integer level.
///
/// Returns the level and whether the unrounded level fell outside
/// `[qmin, qmax]`. Rounds half to even.
/// NaN maps to the zero-point and counts as saturated; infinities saturate.
///
/// The range check allows a few ulps of slack so a calibrated extreme that
/// lands on the boundary level does not count as clipped.
#[inline]
pub(crate) fn quantize_value(x: f32, scale: f32, zero_point: i32, qmin: i32, qmax: i32) -> (i32, bool) {
    if x.is_nan() {
        return (zero_point, true);
    }
    let unrounded = x / scale + zero_point as f32;
    let slack = (qmin.unsigned_abs().max(qmax.unsigned_abs())) as f32 * 4.0 * f32::EPSILON;
    let saturated = unrounded < qmin as f32 - slack || unrounded > qmax as f32 + slack;
    let level = unrounded.round_ties_even().clamp(qmin as f32, qmax as f32);
    (level as i32, saturated)
}

/// Keep-dims scale and zero-point arrays for a rank-`rank` input.
pub(crate) fn derive_params(
    stats: &CalibrationStats,
    config: &QuantizationConfig,
    rank: usize,
) -> Result<(ArrayD<f32>, ArrayD<i32>)> {
    let (min_val, max_val) = stats.aligned_to(rank)?;
    let explicit_clip = config.clip_bound().is_some();
    let qmax = config.qmax();

    let mut scale = ArrayD::<f32>::zeros(max_val.raw_dim());
    let mut zero_point = ArrayD::<i32>::zeros(max_val.raw_dim());

    match config.mode() {
        QuantMode::Symmetric => {
            Zip::from(&mut scale).and(&max_val).for_each(|s, &hi| {
                *s = symmetric_scale(hi, qmax, explicit_clip);
            });
        }
        QuantMode::Asymmetric => {
            Zip::from(&mut scale).and(&mut zero_point).and(&min_val).and(&max_val).for_each(
                |s, z, &lo, &hi| {
                    (*s, *z) = asymmetric_params(lo, hi, qmax, explicit_clip);
                },
            );
        }
    }

    Ok((scale, zero_point))
}
