//! Calibration statistics

use ndarray::{ArrayD, IxDyn, Zip};

use crate::error::{QuantError, Result};
use crate::quant::config::QuantMode;

/// Per-group range statistics used to derive scale and zero-point
///
/// Arrays are stored in keep-dims layout: the same rank as the calibrated
/// input, with size 1 on every reduced axis, so they broadcast against it.
/// Symmetric statistics store `[-max_abs, max_abs]`; asymmetric ranges are
/// widened to contain zero, so `min_val == max_val` only for all-zero groups.
#[derive(Clone, Debug, PartialEq)]
pub struct CalibrationStats {
    mode: QuantMode,
    min_val: ArrayD<f32>,
    max_val: ArrayD<f32>,
}

impl CalibrationStats {
    /// Symmetric statistics from per-group max-abs values.
    pub fn symmetric(max_abs: ArrayD<f32>) -> Result<Self> {
        if let Some(bad) = max_abs.iter().find(|v| !v.is_finite() || **v < 0.0) {
            return Err(QuantError::InvalidInput(format!(
                "max_abs must be finite and non-negative, got {bad}"
            )));
        }
        Ok(Self { mode: QuantMode::Symmetric, min_val: max_abs.mapv(|v| -v), max_val: max_abs })
    }

    /// Asymmetric statistics from per-group min/max values.
    ///
    /// The range is widened to contain zero.
    pub fn asymmetric(min_val: ArrayD<f32>, max_val: ArrayD<f32>) -> Result<Self> {
        if min_val.shape() != max_val.shape() {
            return Err(QuantError::shape_mismatch(min_val.shape(), max_val.shape()));
        }
        let mut valid = true;
        Zip::from(&min_val).and(&max_val).for_each(|&lo, &hi| {
            valid &= lo.is_finite() && hi.is_finite() && lo <= hi;
        });
        if !valid {
            return Err(QuantError::InvalidInput(
                "asymmetric statistics must be finite with min <= max".to_string(),
            ));
        }
        Ok(Self {
            mode: QuantMode::Asymmetric,
            min_val: min_val.mapv(|v| v.min(0.0)),
            max_val: max_val.mapv(|v| v.max(0.0)),
        })
    }

    /// Per-tensor symmetric statistics.
    pub fn scalar_symmetric(max_abs: f32) -> Result<Self> {
        Self::symmetric(ArrayD::from_elem(IxDyn(&[]), max_abs))
    }

    /// Per-tensor asymmetric statistics.
    pub fn scalar_asymmetric(min_val: f32, max_val: f32) -> Result<Self> {
        Self::asymmetric(
            ArrayD::from_elem(IxDyn(&[]), min_val),
            ArrayD::from_elem(IxDyn(&[]), max_val),
        )
    }

    /// Build from one `(lo, hi)` range per group, in row-major group order.
    pub(crate) fn from_ranges(
        mode: QuantMode,
        ranges: &[(f32, f32)],
        keep_shape: &[usize],
    ) -> Result<Self> {
        let shape = IxDyn(keep_shape);
        match mode {
            QuantMode::Symmetric => {
                let max_abs: Vec<f32> =
                    ranges.iter().map(|&(lo, hi)| lo.abs().max(hi.abs())).collect();
                Self::symmetric(ArrayD::from_shape_vec(shape, max_abs)?)
            }
            QuantMode::Asymmetric => {
                let (lo, hi): (Vec<f32>, Vec<f32>) =
                    ranges.iter().map(|&(lo, hi)| (lo.min(hi), hi.max(lo))).unzip();
                Self::asymmetric(
                    ArrayD::from_shape_vec(shape.clone(), lo)?,
                    ArrayD::from_shape_vec(shape, hi)?,
                )
            }
        }
    }

    pub fn mode(&self) -> QuantMode {
        self.mode
    }

    pub fn min_val(&self) -> &ArrayD<f32> {
        &self.min_val
    }

    pub fn max_val(&self) -> &ArrayD<f32> {
        &self.max_val
    }

    /// Per-group max absolute value.
    pub fn max_abs(&self) -> ArrayD<f32> {
        match self.mode {
            QuantMode::Symmetric => self.max_val.clone(),
            QuantMode::Asymmetric => {
                let mut out = self.max_val.clone();
                Zip::from(&mut out).and(&self.min_val).for_each(|hi, &lo| *hi = hi.max(-lo));
                out
            }
        }
    }

    /// Keep-dims shape of the statistics.
    pub fn shape(&self) -> &[usize] {
        self.max_val.shape()
    }

    pub fn num_groups(&self) -> usize {
        self.max_val.len()
    }

    /// Statistics aligned to a rank-`rank` input.
    ///
    /// Rank-0 (per-tensor) statistics expand to `[1; rank]`; any other rank
    /// must already match.
    pub(crate) fn aligned_to(&self, rank: usize) -> Result<(ArrayD<f32>, ArrayD<f32>)> {
        if self.max_val.ndim() == rank {
            return Ok((self.min_val.clone(), self.max_val.clone()));
        }
        if self.max_val.ndim() == 0 {
            let shape = vec![1; rank];
            return Ok((
                self.min_val.clone().into_shape_with_order(IxDyn(&shape))?,
                self.max_val.clone().into_shape_with_order(IxDyn(&shape))?,
            ));
        }
        Err(QuantError::shape_mismatch(&vec![1; rank], self.shape()))
    }

    /// Exponential moving average toward `other`.
    pub(crate) fn blend(&self, other: &Self, momentum: f32) -> Result<Self> {
        if self.mode != other.mode {
            return Err(QuantError::InvalidInput(format!(
                "cannot blend {:?} statistics with {:?}",
                self.mode, other.mode
            )));
        }
        if self.shape() != other.shape() {
            return Err(QuantError::shape_mismatch(self.shape(), other.shape()));
        }
        let keep = 1.0 - momentum;
        Ok(Self {
            mode: self.mode,
            min_val: &self.min_val * keep + &other.min_val * momentum,
            max_val: &self.max_val * keep + &other.max_val * momentum,
        })
    }
}
