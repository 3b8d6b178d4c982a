//! Cuantizar: affine quantization for training frameworks
//!
//! Numeric core for quantization-aware training and post-training
//! quantization over `ndarray` arrays:
//! - **Config**: validated, serde-embeddable [`QuantizationConfig`]
//! - **Calibration**: per-tensor/per-channel statistics with min-max,
//!   percentile or MSE-searched ranges
//! - **Codec**: [`quantize`]/[`dequantize`] with round-half-to-even
//! - **Fake quantization**: reconstruction plus a saturation mask for the
//!   [`GradientRule`] backward hook
//! - **Einsum routing**: [`fake_quant_einsum`] contracts quantized levels in
//!   a provably wide [`Accumulator`]
//!
//! The crate is stateless apart from the opt-in [`trace::TRACER`]; smoothing
//! statistics across calls goes through a caller-owned
//! [`MovingAverageStats`]. Diagnostics go through the `log` facade.
//!
//! # Example
//!
//! ```
//! use cuantizar::{fake_quant_einsum, Granularity, QuantizationConfig};
//! use ndarray::{arr2, ArrayD};
//!
//! let weights: ArrayD<f32> = arr2(&[[0.5, -1.0], [2.0, 0.25]]).into_dyn();
//! let inputs: ArrayD<f32> = arr2(&[[1.0, 2.0], [3.0, 4.0]]).into_dyn();
//!
//! let w_config = QuantizationConfig::int8().with_granularity(Granularity::per_channel([1]));
//! let x_config = QuantizationConfig::asymmetric(8)?;
//!
//! let out = fake_quant_einsum("ij,jk->ik", &inputs, &weights, Some(&x_config), Some(&w_config))?;
//! assert_eq!(out.shape(), &[2, 2]);
//! # Ok::<(), cuantizar::QuantError>(())
//! ```

pub mod error;
pub mod quant;
pub mod trace;

pub use error::{QuantError, Result};
pub use quant::{
    calibrate, compare_granularities, compute_stats, dequantize, einsum, fake_quant_einsum,
    fake_quantize, fake_quantize_observed, fake_quantize_with_stats, quantization_mse, quantize,
    Accumulator, CalibrationMethod, CalibrationStats, ClippedStraightThrough, EinsumSpec,
    FakeQuantized, GradientMode, GradientRule, Granularity, MovingAverageStats, NonFinitePolicy,
    QuantMode, QuantizationConfig, QuantizationConfigBuilder, QuantizationConfigSpec,
    QuantizedTensor, StopGradient, StraightThrough, MAX_PRECISION, MIN_PRECISION, SCALE_EPSILON,
};
