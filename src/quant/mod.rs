//! Quantization: calibration, codec and quantized contraction
//!
//! Provides the numeric core for quantization-aware training and
//! post-training quantization:
//! - Per-tensor and per-channel affine quantization (symmetric/asymmetric)
//! - Calibration (min-max, percentile, MSE search, moving average)
//! - Fake quantization with an overridable gradient rule
//! - Einsum routing with integer accumulation

mod calibration;
mod codec;
mod config;
mod einsum;
mod fake_quantize;
mod metrics;

pub use calibration::{calibrate, compute_stats, CalibrationStats, MovingAverageStats};
pub use codec::{dequantize, quantize, QuantizedTensor, SCALE_EPSILON};
pub use config::{
    CalibrationMethod, GradientMode, Granularity, NonFinitePolicy, QuantMode, QuantizationConfig,
    QuantizationConfigBuilder, QuantizationConfigSpec, MAX_PRECISION, MIN_PRECISION,
};
pub use einsum::{einsum, fake_quant_einsum, Accumulator, EinsumSpec};
pub use fake_quantize::{
    fake_quantize, fake_quantize_observed, fake_quantize_with_stats, ClippedStraightThrough,
    FakeQuantized, GradientRule, StopGradient, StraightThrough,
};
pub use metrics::{compare_granularities, quantization_mse};
