//! Quantized tensor produced by the codec

use ndarray::{ArrayD, IxDyn};
use serde::Serialize;

use crate::quant::config::QuantMode;

/// Integer levels plus the metadata needed to reconstruct them
///
/// `scale` (and `zero_point` in asymmetric mode) use the keep-dims layout of
/// the statistics they were derived from: one value per quantization group,
/// broadcastable against `values`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QuantizedTensor {
    values: ArrayD<i32>,
    scale: ArrayD<f32>,
    zero_point: Option<ArrayD<i32>>,
    precision: u8,
    mode: QuantMode,
}

impl QuantizedTensor {
    pub(crate) fn new(
        values: ArrayD<i32>,
        scale: ArrayD<f32>,
        zero_point: Option<ArrayD<i32>>,
        precision: u8,
        mode: QuantMode,
    ) -> Self {
        Self { values, scale, zero_point, precision, mode }
    }

    /// Integer levels, same shape as the input.
    pub fn values(&self) -> &ArrayD<i32> {
        &self.values
    }

    /// Per-group scale.
    pub fn scale(&self) -> &ArrayD<f32> {
        &self.scale
    }

    /// Per-group zero-point; `None` in symmetric mode (implicitly 0).
    pub fn zero_point(&self) -> Option<&ArrayD<i32>> {
        self.zero_point.as_ref()
    }

    pub fn precision(&self) -> u8 {
        self.precision
    }

    pub fn mode(&self) -> QuantMode {
        self.mode
    }

    pub fn shape(&self) -> &[usize] {
        self.values.shape()
    }

    /// Number of scale/zero-point groups.
    pub fn num_groups(&self) -> usize {
        self.scale.len()
    }

    /// Reconstruct the float values.
    pub fn dequantize(&self) -> ArrayD<f32> {
        super::dequantize(self)
    }

    /// Packed storage size in bytes (levels at `precision` bits plus f32
    /// scales and i32 zero-points).
    pub fn memory_bytes(&self) -> usize {
        let level_bytes = (self.values.len() * self.precision as usize).div_ceil(8);
        let scale_bytes = self.scale.len() * 4;
        let zp_bytes = self.zero_point.as_ref().map_or(0, |zp| zp.len() * 4);
        level_bytes + scale_bytes + zp_bytes
    }

    /// Zero-point as a dense keep-dims array (zeros when symmetric).
    pub(crate) fn zero_point_or_zeros(&self) -> ArrayD<i32> {
        self.zero_point.clone().unwrap_or_else(|| ArrayD::zeros(self.scale.raw_dim()))
    }
}

/// Index into keep-dims metadata for the element at `index`.
#[inline]
pub(crate) fn group_index(index: &[usize], keep_shape: &[usize]) -> IxDyn {
    let group: Vec<usize> = index
        .iter()
        .zip(keep_shape)
        .map(|(&i, &size)| if size == 1 { 0 } else { i })
        .collect();
    IxDyn(&group)
}
