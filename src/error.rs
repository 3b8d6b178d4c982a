//! Error types for quantization operations
//!
//! Every error is raised synchronously to the caller. Quantization is
//! deterministic, so none of these are retryable: the same inputs reproduce
//! the same error.

use thiserror::Error;

/// Result type alias for quantization operations.
pub type Result<T> = std::result::Result<T, QuantError>;

/// Errors produced by configuration, calibration, the codec and routing.
#[derive(Error, Debug)]
pub enum QuantError {
    /// Bit-width outside the supported range.
    #[error("Invalid precision: {bits} bits (must be in {min}..={max})")]
    InvalidPrecision { bits: u8, min: u8, max: u8 },

    /// Explicit clip bound is negative or non-finite.
    #[error("Invalid clip bound: {0} (must be finite and >= 0)")]
    InvalidClipBound(f32),

    /// Calibration method parameters are out of range.
    #[error("Invalid calibration method: {0}")]
    InvalidCalibration(String),

    /// Requested per-channel axis does not exist in the input.
    #[error("Axis {axis} out of range for rank-{rank} input")]
    InvalidAxis { axis: usize, rank: usize },

    /// Input data cannot be quantized under the configured policy.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Operand or statistics shapes do not line up.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch { expected: Vec<usize>, actual: Vec<usize> },

    /// Einsum equation could not be parsed or does not match the operands.
    #[error("Invalid einsum equation '{equation}': {reason}")]
    InvalidEquation { equation: String, reason: String },

    /// No accumulator is provably wide enough for the contraction.
    #[error(
        "Numeric overflow: contraction over {reduction} elements needs {required_bits} accumulator bits (max 64)"
    )]
    NumericOverflow { required_bits: u32, reduction: u64 },

    /// Array construction failed.
    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

impl QuantError {
    /// Whether this error is a configuration error, as opposed to bad data.
    ///
    /// Axis errors count as configuration errors even though they can only be
    /// detected once the input rank is known.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidPrecision { .. }
                | Self::InvalidClipBound(_)
                | Self::InvalidCalibration(_)
                | Self::InvalidAxis { .. }
        )
    }

    /// Stable error code for structured diagnostics.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidPrecision { .. } => "Q001",
            Self::InvalidClipBound(_) => "Q002",
            Self::InvalidCalibration(_) => "Q003",
            Self::InvalidAxis { .. } => "Q004",
            Self::InvalidInput(_) => "Q010",
            Self::ShapeMismatch { .. } => "Q020",
            Self::InvalidEquation { .. } => "Q021",
            Self::NumericOverflow { .. } => "Q030",
            Self::Shape(_) => "Q099",
        }
    }

    pub(crate) fn shape_mismatch(expected: &[usize], actual: &[usize]) -> Self {
        Self::ShapeMismatch { expected: expected.to_vec(), actual: actual.to_vec() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_unique() {
        let errors = vec![
            QuantError::InvalidPrecision { bits: 1, min: 2, max: 16 },
            QuantError::InvalidClipBound(-1.0),
            QuantError::InvalidCalibration("x".into()),
            QuantError::InvalidAxis { axis: 5, rank: 2 },
            QuantError::InvalidInput("nan".into()),
            QuantError::ShapeMismatch { expected: vec![1], actual: vec![2] },
            QuantError::InvalidEquation { equation: "ij".into(), reason: "x".into() },
            QuantError::NumericOverflow { required_bits: 80, reduction: 1 },
        ];

        let codes: Vec<_> = errors.iter().map(QuantError::code).collect();
        let unique: std::collections::HashSet<_> = codes.iter().collect();
        assert_eq!(unique.len(), codes.len());
        assert!(codes.iter().all(|c| c.starts_with('Q')));
    }

    #[test]
    fn test_config_error_classification() {
        assert!(QuantError::InvalidPrecision { bits: 1, min: 2, max: 16 }.is_config_error());
        assert!(QuantError::InvalidAxis { axis: 5, rank: 2 }.is_config_error());
        assert!(QuantError::InvalidClipBound(f32::NAN).is_config_error());
        assert!(!QuantError::InvalidInput("inf".into()).is_config_error());
        assert!(!QuantError::NumericOverflow { required_bits: 70, reduction: 8 }.is_config_error());
    }

    #[test]
    fn test_messages_carry_context() {
        let msg = QuantError::InvalidAxis { axis: 5, rank: 2 }.to_string();
        assert!(msg.contains('5'));
        assert!(msg.contains("rank-2"));

        let msg = QuantError::InvalidPrecision { bits: 1, min: 2, max: 16 }.to_string();
        assert!(msg.contains("1 bits"));
        assert!(msg.contains("2..=16"));
    }
}
