//! Integer accumulator selection for quantized contractions

use ndarray::LinalgScalar;

use crate::error::{QuantError, Result};
use crate::quant::config::QuantizationConfig;

/// Integer type used to sum level products
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Accumulator {
    I32,
    I64,
}

impl Accumulator {
    /// Narrowest accumulator that provably holds a contraction of `reduction`
    /// products of levels from `lhs` and `rhs`.
    ///
    /// The worst case is `|q_lhs| * |q_rhs| * reduction`, times four when a
    /// zero-point correction adds cross terms.
    ///
    /// # Errors
    /// `NumericOverflow` when even `i64` is not wide enough.
    pub fn select(lhs: &QuantizationConfig, rhs: &QuantizationConfig, reduction: u64) -> Result<Self> {
        let zero_point_terms = !(lhs.is_symmetric() && rhs.is_symmetric());
        Self::for_magnitudes(
            lhs.max_level_magnitude(),
            rhs.max_level_magnitude(),
            zero_point_terms,
            reduction,
        )
    }

    /// Selection from raw level magnitudes.
    pub fn for_magnitudes(
        lhs_magnitude: u64,
        rhs_magnitude: u64,
        zero_point_terms: bool,
        reduction: u64,
    ) -> Result<Self> {
        let terms: u128 = if zero_point_terms { 4 } else { 1 };
        let worst_case = u128::from(lhs_magnitude)
            .checked_mul(u128::from(rhs_magnitude))
            .and_then(|bound| bound.checked_mul(u128::from(reduction)))
            .and_then(|bound| bound.checked_mul(terms));

        // magnitude bits plus sign
        let required_bits = match worst_case {
            Some(bound) => u128::BITS - bound.leading_zeros() + 1,
            None => u128::BITS + 1,
        };

        match required_bits {
            0..=32 => Ok(Self::I32),
            33..=64 => Ok(Self::I64),
            _ => Err(QuantError::NumericOverflow { required_bits, reduction }),
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            Self::I32 => 32,
            Self::I64 => 64,
        }
    }
}

/// Integer scalar a contraction can accumulate in
pub(crate) trait AccumulatorScalar: LinalgScalar {
    fn from_level(level: i32) -> Self;
    fn to_f64(self) -> f64;
}

impl AccumulatorScalar for i32 {
    fn from_level(level: i32) -> Self {
        level
    }

    fn to_f64(self) -> f64 {
        f64::from(self)
    }
}

impl AccumulatorScalar for i64 {
    fn from_level(level: i32) -> Self {
        i64::from(level)
    }

    fn to_f64(self) -> f64 {
        self as f64
    }
}
