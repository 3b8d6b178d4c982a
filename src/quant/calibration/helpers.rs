//! Grouping and range reduction helpers for calibration

use ndarray::{Array2, ArrayD, ArrayView1, IxDyn};

use crate::error::{QuantError, Result};
use crate::quant::codec::{asymmetric_params, quantize_value, symmetric_scale};
use crate::quant::config::{NonFinitePolicy, QuantMode, QuantizationConfig};

/// Input reshaped to one row per quantization group
pub(crate) struct GroupedRows {
    /// `[num_groups, elements_per_group]`
    pub rows: Array2<f32>,
    /// Keep-dims shape of the statistics (1 on reduced axes)
    pub keep_shape: Vec<usize>,
}

/// Reshape `x` so every row holds the elements of one group.
///
/// `axes` must be sorted and unique. Groups with no elements are rejected. Retained axes are moved to the front
/// (in order) and everything else is flattened, so row `g` corresponds to
/// the `g`-th index of the retained axes in row-major order.
pub(crate) fn group_rows(x: &ArrayD<f32>, axes: &[usize]) -> Result<GroupedRows> {
    let rank = x.ndim();
    if let Some(&axis) = axes.iter().find(|&&axis| axis >= rank) {
        return Err(QuantError::InvalidAxis { axis, rank });
    }

    let shape = x.shape();
    let reduced: Vec<usize> = (0..rank).filter(|d| !axes.contains(d)).collect();
    let order: Vec<usize> = axes.iter().chain(reduced.iter()).copied().collect();

    let num_groups: usize = axes.iter().map(|&a| shape[a]).product();
    let group_len: usize = reduced.iter().map(|&a| shape[a]).product();
    if group_len == 0 && num_groups > 0 {
        return Err(QuantError::InvalidInput(format!(
            "empty reduction: shape {shape:?} leaves no elements per group over axes {axes:?}"
        )));
    }
    let keep_shape: Vec<usize> =
        (0..rank).map(|d| if axes.contains(&d) { shape[d] } else { 1 }).collect();

    let permuted = x.view().permuted_axes(IxDyn(&order));
    let flat: Vec<f32> = permuted.iter().copied().collect();
    let rows = Array2::from_shape_vec((num_groups, group_len), flat)?;

    Ok(GroupedRows { rows, keep_shape })
}

/// Finite elements of one group, enforcing the non-finite policy.
///
/// Under `Clip` the number of dropped elements is added to `dropped`.
pub(crate) fn finite_values(
    row: ArrayView1<'_, f32>,
    policy: NonFinitePolicy,
    group: usize,
    dropped: &mut usize,
) -> Result<Vec<f32>> {
    let mut values = Vec::with_capacity(row.len());
    for &v in row {
        if v.is_finite() {
            values.push(v);
        } else if policy == NonFinitePolicy::Reject {
            return Err(QuantError::InvalidInput(format!(
                "non-finite value {v} in quantization group {group}"
            )));
        } else {
            *dropped += 1;
        }
    }
    Ok(values)
}

/// Observed `(min, max)`; `(0, 0)` for an empty group.
pub(crate) fn min_max(values: &[f32]) -> (f32, f32) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    values
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)))
}

/// Percentile bounds of a group.
///
/// Symmetric mode takes the upper percentile of `|x|` and returns it as
/// `(0, p)`. Uses the sorted-sample index `floor(p / 100 * n)`.
pub(crate) fn percentile_range(values: &[f32], lower: f32, upper: f32, mode: QuantMode) -> (f32, f32) {
    if values.is_empty() {
        return (0.0, 0.0);
    }

    match mode {
        QuantMode::Symmetric => {
            let mut magnitudes: Vec<f32> = values.iter().map(|v| v.abs()).collect();
            magnitudes.sort_by(f32::total_cmp);
            (0.0, magnitudes[percentile_index(upper, magnitudes.len())])
        }
        QuantMode::Asymmetric => {
            let mut sorted = values.to_vec();
            sorted.sort_by(f32::total_cmp);
            let n = sorted.len();
            (sorted[percentile_index(lower, n)], sorted[percentile_index(upper, n)])
        }
    }
}

fn percentile_index(percent: f32, n: usize) -> usize {
    (((percent / 100.0) * n as f32) as usize).min(n - 1)
}

/// Shrink the observed range by the ratio that minimizes reconstruction MSE.
///
/// Ratio 1 is always a candidate, so the result never reconstructs worse
/// than plain min-max.
pub(crate) fn mse_search_range(
    values: &[f32],
    steps: usize,
    min_ratio: f32,
    config: &QuantizationConfig,
) -> (f32, f32) {
    let (lo, hi) = min_max(values);
    let base = match config.mode() {
        QuantMode::Symmetric => {
            let max_abs = lo.abs().max(hi.abs());
            (-max_abs, max_abs)
        }
        QuantMode::Asymmetric => (lo.min(0.0), hi.max(0.0)),
    };
    if base.0 == base.1 {
        return base;
    }

    let mut best = base;
    let mut best_mse = f32::INFINITY;
    for step in 0..steps {
        let ratio = if steps == 1 {
            1.0
        } else {
            1.0 - (1.0 - min_ratio) * step as f32 / (steps - 1) as f32
        };
        let candidate = (base.0 * ratio, base.1 * ratio);
        let mse = reconstruction_mse(values, candidate, config);
        if mse < best_mse {
            best_mse = mse;
            best = candidate;
        }
    }
    best
}

fn reconstruction_mse(values: &[f32], (lo, hi): (f32, f32), config: &QuantizationConfig) -> f32 {
    let (scale, zero_point) = match config.mode() {
        QuantMode::Symmetric => (symmetric_scale(hi.max(-lo), config.qmax(), false), 0),
        QuantMode::Asymmetric => asymmetric_params(lo, hi, config.qmax(), false),
    };
    let sum_sq: f32 = values
        .iter()
        .map(|&v| {
            let (level, _) = quantize_value(v, scale, zero_point, config.qmin(), config.qmax());
            let reconstructed = (level - zero_point) as f32 * scale;
            (v - reconstructed).powi(2)
        })
        .sum();
    sum_sq / values.len().max(1) as f32
}

/// Apply an explicit clip bound to a group range.
pub(crate) fn apply_clip((lo, hi): (f32, f32), config: &QuantizationConfig) -> (f32, f32) {
    match (config.clip_bound(), config.mode()) {
        (None, _) => (lo, hi),
        (Some(clip), QuantMode::Symmetric) => (-clip, clip),
        (Some(clip), QuantMode::Asymmetric) => (lo.clamp(-clip, clip), hi.clamp(-clip, clip)),
    }
}
