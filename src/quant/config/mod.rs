//! Quantization scheme configuration
//!
//! `QuantizationConfig` is an immutable, validated value object. It is built
//! with [`QuantizationConfig::builder`] or one of the convenience
//! constructors, and deserializes through the same validation so a
//! composing framework can embed it in its own configuration files.

mod types;


use serde::{Deserialize, Serialize};

use crate::error::{QuantError, Result};

pub use types::{CalibrationMethod, GradientMode, Granularity, NonFinitePolicy, QuantMode};

/// Narrowest supported bit-width
pub const MIN_PRECISION: u8 = 2;
/// Widest supported bit-width (levels are stored as `i32`)
pub const MAX_PRECISION: u8 = 16;

/// Immutable description of a quantization scheme
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "QuantizationConfigSpec", into = "QuantizationConfigSpec")]
pub struct QuantizationConfig {
    precision: u8,
    granularity: Granularity,
    mode: QuantMode,
    clip_bound: Option<f32>,
    calibration: CalibrationMethod,
    non_finite: NonFinitePolicy,
    gradient: GradientMode,
}

impl QuantizationConfig {
    /// Start building a config (8-bit symmetric per-tensor by default).
    pub fn builder() -> QuantizationConfigBuilder {
        QuantizationConfigBuilder::default()
    }

    /// Symmetric per-tensor config with `bits` precision.
    pub fn symmetric(bits: u8) -> Result<Self> {
        Self::builder().precision(bits).mode(QuantMode::Symmetric).build()
    }

    /// Asymmetric per-tensor config with `bits` precision.
    pub fn asymmetric(bits: u8) -> Result<Self> {
        Self::builder().precision(bits).mode(QuantMode::Asymmetric).build()
    }

    /// 8-bit symmetric per-tensor.
    pub fn int8() -> Self {
        Self::from_parts_unchecked(8, QuantMode::Symmetric)
    }

    /// 4-bit symmetric per-tensor.
    pub fn int4() -> Self {
        Self::from_parts_unchecked(4, QuantMode::Symmetric)
    }

    fn from_parts_unchecked(precision: u8, mode: QuantMode) -> Self {
        Self {
            precision,
            granularity: Granularity::PerTensor,
            mode,
            clip_bound: None,
            calibration: CalibrationMethod::MinMax,
            non_finite: NonFinitePolicy::Reject,
            gradient: GradientMode::ClippedStraightThrough,
        }
    }

    /// Copy of this config with a different granularity.
    pub fn with_granularity(&self, granularity: Granularity) -> Self {
        Self { granularity: granularity.normalized(), ..self.clone() }
    }

    pub fn precision(&self) -> u8 {
        self.precision
    }

    pub fn granularity(&self) -> &Granularity {
        &self.granularity
    }

    pub fn mode(&self) -> QuantMode {
        self.mode
    }

    pub fn is_symmetric(&self) -> bool {
        self.mode == QuantMode::Symmetric
    }

    pub fn clip_bound(&self) -> Option<f32> {
        self.clip_bound
    }

    pub fn calibration(&self) -> &CalibrationMethod {
        &self.calibration
    }

    pub fn non_finite(&self) -> NonFinitePolicy {
        self.non_finite
    }

    pub fn gradient(&self) -> GradientMode {
        self.gradient
    }

    /// Lowest integer level.
    ///
    /// Symmetric: `-(2^(p-1) - 1)`; asymmetric: `0`.
    pub fn qmin(&self) -> i32 {
        match self.mode {
            QuantMode::Symmetric => -self.qmax(),
            QuantMode::Asymmetric => 0,
        }
    }

    /// Highest integer level.
    ///
    /// Symmetric: `2^(p-1) - 1`; asymmetric: `2^p - 1`.
    pub fn qmax(&self) -> i32 {
        match self.mode {
            QuantMode::Symmetric => (1i32 << (self.precision - 1)) - 1,
            QuantMode::Asymmetric => (1i32 << self.precision) - 1,
        }
    }

    /// Number of representable levels.
    pub fn num_levels(&self) -> usize {
        (self.qmax() - self.qmin() + 1) as usize
    }

    /// Largest magnitude of a zero-point-corrected level `q - z`.
    pub fn max_level_magnitude(&self) -> u64 {
        match self.mode {
            QuantMode::Symmetric => self.qmax() as u64,
            QuantMode::Asymmetric => (1u64 << self.precision) - 1,
        }
    }

    /// Check every invariant of the config.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_PRECISION..=MAX_PRECISION).contains(&self.precision) {
            return Err(QuantError::InvalidPrecision {
                bits: self.precision,
                min: MIN_PRECISION,
                max: MAX_PRECISION,
            });
        }
        if let Some(clip) = self.clip_bound {
            if !clip.is_finite() || clip < 0.0 {
                return Err(QuantError::InvalidClipBound(clip));
            }
        }
        self.calibration.validate()
    }
}

impl Default for QuantizationConfig {
    fn default() -> Self {
        Self::int8()
    }
}

/// Builder for [`QuantizationConfig`]
#[derive(Clone, Debug, Default)]
pub struct QuantizationConfigBuilder {
    spec: QuantizationConfigSpec,
}

impl QuantizationConfigBuilder {
    pub fn precision(mut self, bits: u8) -> Self {
        self.spec.precision = bits;
        self
    }

    pub fn mode(mut self, mode: QuantMode) -> Self {
        self.spec.mode = mode;
        self
    }

    pub fn symmetric(self, symmetric: bool) -> Self {
        self.mode(if symmetric { QuantMode::Symmetric } else { QuantMode::Asymmetric })
    }

    pub fn granularity(mut self, granularity: Granularity) -> Self {
        self.spec.granularity = granularity;
        self
    }

    /// Per-channel over `axes` (empty means per-tensor).
    pub fn per_channel(self, axes: impl IntoIterator<Item = usize>) -> Self {
        self.granularity(Granularity::per_channel(axes))
    }

    pub fn clip_bound(mut self, clip: f32) -> Self {
        self.spec.clip_bound = Some(clip);
        self
    }

    pub fn calibration(mut self, method: CalibrationMethod) -> Self {
        self.spec.calibration = method;
        self
    }

    pub fn non_finite(mut self, policy: NonFinitePolicy) -> Self {
        self.spec.non_finite = policy;
        self
    }

    pub fn gradient(mut self, mode: GradientMode) -> Self {
        self.spec.gradient = mode;
        self
    }

    /// Validate and freeze the config.
    pub fn build(self) -> Result<QuantizationConfig> {
        QuantizationConfig::try_from(self.spec)
    }
}

/// Plain serialized form of [`QuantizationConfig`]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuantizationConfigSpec {
    pub precision: u8,
    pub granularity: Granularity,
    pub mode: QuantMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clip_bound: Option<f32>,
    pub calibration: CalibrationMethod,
    pub non_finite: NonFinitePolicy,
    pub gradient: GradientMode,
}

impl Default for QuantizationConfigSpec {
    fn default() -> Self {
        QuantizationConfig::int8().into()
    }
}

impl TryFrom<QuantizationConfigSpec> for QuantizationConfig {
    type Error = QuantError;

    fn try_from(spec: QuantizationConfigSpec) -> Result<Self> {
        let config = Self {
            precision: spec.precision,
            granularity: spec.granularity.normalized(),
            mode: spec.mode,
            clip_bound: spec.clip_bound,
            calibration: spec.calibration,
            non_finite: spec.non_finite,
            gradient: spec.gradient,
        };
        config.validate()?;
        Ok(config)
    }
}

impl From<QuantizationConfig> for QuantizationConfigSpec {
    fn from(config: QuantizationConfig) -> Self {
        Self {
            precision: config.precision,
            granularity: config.granularity,
            mode: config.mode,
            clip_bound: config.clip_bound,
            calibration: config.calibration,
            non_finite: config.non_finite,
            gradient: config.gradient,
        }
    }
}
