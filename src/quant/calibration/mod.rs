//! Calibration: per-group range statistics
//!
//! Reduces an input over every axis that is not retained by the
//! granularity, producing the min/max (or max-abs) statistics that the codec
//! turns into scale and zero-point:
//! - Min-Max: full observed range
//! - Percentile: percentile bounds, robust to outliers
//! - MSE search: shrunken range minimizing reconstruction error
//! - Moving average: caller-owned smoothing across calls

mod calibrate;
mod helpers;
mod moving_average;
mod stats;


pub use calibrate::{calibrate, compute_stats};
pub use moving_average::MovingAverageStats;
pub use stats::CalibrationStats;
