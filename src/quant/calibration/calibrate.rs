//! Statistics reduction over the non-retained axes

use ndarray::ArrayD;

use super::helpers::{
    apply_clip, finite_values, group_rows, mse_search_range, min_max, percentile_range,
};
use super::stats::CalibrationStats;
use crate::error::Result;
use crate::quant::config::{CalibrationMethod, Granularity, NonFinitePolicy, QuantMode, QuantizationConfig};
use crate::trace::{TraceStep, TRACER};

/// Min/max (or max-abs) statistics of `x`, reduced over every axis not in `axes`.
///
/// An empty `axes` gives per-tensor statistics. Any non-finite element is an
/// error; use [`calibrate`] with `NonFinitePolicy::Clip` to ignore them.
///
/// # Errors
/// `InvalidAxis` if an axis is out of range, `InvalidInput` on NaN/Inf.
pub fn compute_stats(x: &ArrayD<f32>, axes: &[usize], mode: QuantMode) -> Result<CalibrationStats> {
    let granularity = Granularity::per_channel(axes.iter().copied());
    TRACER.span(
        TraceStep::Calibrate,
        || format!("min-max {:?} groups={:?}", x.shape(), granularity.axes()),
        || {
            let grouped = group_rows(x, granularity.axes())?;
            let mut dropped = 0;
            let ranges = grouped
                .rows
                .outer_iter()
                .enumerate()
                .map(|(group, row)| {
                    finite_values(row, NonFinitePolicy::Reject, group, &mut dropped)
                        .map(|values| min_max(&values))
                })
                .collect::<Result<Vec<_>>>()?;
            CalibrationStats::from_ranges(mode, &ranges, &grouped.keep_shape)
        },
    )
}

/// Statistics of `x` under the full configuration: granularity, calibration
/// method, non-finite policy and clip bound.
pub fn calibrate(x: &ArrayD<f32>, config: &QuantizationConfig) -> Result<CalibrationStats> {
    TRACER.span(
        TraceStep::Calibrate,
        || format!("{:?} {:?}", config.calibration(), x.shape()),
        || calibrate_groups(x, config),
    )
}

fn calibrate_groups(x: &ArrayD<f32>, config: &QuantizationConfig) -> Result<CalibrationStats> {
    let grouped = group_rows(x, config.granularity().axes())?;

    let mut dropped = 0;
    let mut ranges = Vec::with_capacity(grouped.rows.nrows());
    for (group, row) in grouped.rows.outer_iter().enumerate() {
        let values = finite_values(row, config.non_finite(), group, &mut dropped)?;
        let range = match *config.calibration() {
            CalibrationMethod::MinMax => min_max(&values),
            CalibrationMethod::Percentile { lower, upper } => {
                percentile_range(&values, lower, upper, config.mode())
            }
            CalibrationMethod::MseSearch { steps, min_ratio } => {
                mse_search_range(&values, steps, min_ratio, config)
            }
        };
        ranges.push(apply_clip(range, config));
    }

    if dropped > 0 {
        log::warn!("calibration ignored {dropped} non-finite values (clip-and-continue)");
    }

    CalibrationStats::from_ranges(config.mode(), &ranges, &grouped.keep_shape)
}
