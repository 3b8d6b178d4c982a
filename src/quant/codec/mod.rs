//! Quantize/dequantize codec
//!
//! Maps floats to integer levels with a per-group affine transform and back:
//! - Symmetric: levels in `[-(2^(p-1)-1), 2^(p-1)-1]`, zero-point 0
//! - Asymmetric: levels in `[0, 2^p-1]` with a computed zero-point
//!
//! Rounding is half-to-even so results are reproducible across runs.

mod params;
mod quantize;
mod tensor;

#[cfg(test)]
mod tests;

pub use params::SCALE_EPSILON;
pub use quantize::{dequantize, quantize};
pub use tensor::QuantizedTensor;

pub(crate) use params::{asymmetric_params, quantize_value, symmetric_scale};
pub(crate) use quantize::quantize_with_mask;
pub(crate) use tensor::group_index;
