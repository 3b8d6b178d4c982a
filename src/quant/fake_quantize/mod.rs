//! Fake quantization for quantization-aware training
//!
//! - Forward: quantize → dequantize (simulates quantization noise)
//! - Backward: an overridable gradient rule, clipped straight-through by default
//!
//! The crate does not differentiate anything itself; the composing framework
//! calls [`FakeQuantized::backward`] from its own custom-gradient hook.

mod gradient;
mod ops;


pub use gradient::{ClippedStraightThrough, GradientRule, StopGradient, StraightThrough};
pub use ops::{fake_quantize, fake_quantize_observed, fake_quantize_with_stats, FakeQuantized};
