//! Exponential moving average of calibration statistics
//!
//! The quantization core is stateless. Callers that want statistics smoothed
//! across many forward passes own one of these accumulators and feed it the
//! per-call statistics.

use super::stats::CalibrationStats;
use crate::error::{QuantError, Result};

/// Owned EMA accumulator over [`CalibrationStats`]
#[derive(Clone, Debug)]
pub struct MovingAverageStats {
    /// Weight of the newest observation (1 = no smoothing)
    momentum: f32,
    state: Option<CalibrationStats>,
    num_updates: usize,
}

impl MovingAverageStats {
    /// Create an empty accumulator.
    ///
    /// # Errors
    /// `InvalidCalibration` unless `0 < momentum <= 1`.
    pub fn new(momentum: f32) -> Result<Self> {
        if !(momentum > 0.0 && momentum <= 1.0) {
            return Err(QuantError::InvalidCalibration(format!(
                "moving average momentum {momentum} must be in (0, 1]"
            )));
        }
        Ok(Self { momentum, state: None, num_updates: 0 })
    }

    /// Fold a new observation into the running statistics.
    ///
    /// The first observation is taken as-is; later ones update
    /// `old * (1 - momentum) + new * momentum`.
    ///
    /// # Errors
    /// `ShapeMismatch`/`InvalidInput` if `stats` disagrees in shape or mode
    /// with what was accumulated so far. The state is left untouched.
    pub fn update(&mut self, stats: &CalibrationStats) -> Result<()> {
        let next = match &self.state {
            None => stats.clone(),
            Some(current) => current.blend(stats, self.momentum)?,
        };
        self.state = Some(next);
        self.num_updates += 1;
        Ok(())
    }

    /// Current smoothed statistics, if anything has been observed.
    pub fn read(&self) -> Option<CalibrationStats> {
        self.state.clone()
    }

    pub fn momentum(&self) -> f32 {
        self.momentum
    }

    pub fn num_updates(&self) -> usize {
        self.num_updates
    }

    pub fn reset(&mut self) {
        self.state = None;
        self.num_updates = 0;
    }
}
