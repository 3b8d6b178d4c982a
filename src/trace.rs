//! Quantization step tracer
//!
//! Opt-in timing of the quantization pipeline (calibration, codec,
//! contraction, rescale). Disabled by default; enable with `TRACER.enable()`
//! and print `TRACER.report()` to see where time goes.

use std::collections::HashMap;
use std::fmt;
use std::sync::{LazyLock, Mutex, PoisonError};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

/// The stages of a quantized forward pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraceStep {
    /// Statistics reduction (min/max, percentile, clip search)
    Calibrate,
    /// Float to integer level mapping
    Quantize,
    /// Integer level to float reconstruction
    Dequantize,
    /// Einsum contraction (integer or float)
    Contract,
    /// Scale/zero-point correction of a contraction result
    Rescale,
}

impl fmt::Display for TraceStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// A single timing measurement.
#[derive(Debug, Clone)]
pub struct TraceMeasurement {
    pub step: TraceStep,
    pub duration: Duration,
    pub metadata: String,
}

/// Thread-safe tracer for collecting timing measurements.
///
/// Open spans are keyed per thread, so concurrent pipelines do not clobber
/// each other's start instants.
pub struct Tracer {
    measurements: Mutex<Vec<TraceMeasurement>>,
    active_spans: Mutex<HashMap<(ThreadId, TraceStep), Instant>>,
    enabled: Mutex<bool>,
}

impl Tracer {
    /// Create a new, disabled tracer.
    pub fn new() -> Self {
        Self {
            measurements: Mutex::new(Vec::new()),
            active_spans: Mutex::new(HashMap::new()),
            enabled: Mutex::new(false),
        }
    }

    pub fn enable(&self) {
        *self.enabled.lock().unwrap_or_else(PoisonError::into_inner) = true;
    }

    pub fn disable(&self) {
        *self.enabled.lock().unwrap_or_else(PoisonError::into_inner) = false;
    }

    pub fn is_enabled(&self) -> bool {
        *self.enabled.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a timing span.
    pub fn start(&self, step: TraceStep) {
        if !self.is_enabled() {
            return;
        }
        let mut spans = self.active_spans.lock().unwrap_or_else(PoisonError::into_inner);
        spans.insert((thread::current().id(), step), Instant::now());
    }

    /// End a timing span and record the measurement.
    pub fn end(&self, step: TraceStep, metadata: impl Into<String>) {
        if !self.is_enabled() {
            return;
        }
        let start = self
            .active_spans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(thread::current().id(), step));
        if let Some(start) = start {
            self.record(step, start.elapsed(), metadata.into());
        }
    }

    fn record(&self, step: TraceStep, duration: Duration, metadata: String) {
        let mut measurements = self.measurements.lock().unwrap_or_else(PoisonError::into_inner);
        measurements.push(TraceMeasurement { step, duration, metadata });
    }

    /// Run a closure within a measured span.
    ///
    /// The metadata closure is only evaluated when tracing is enabled.
    #[inline]
    pub fn span<F, R, M>(&self, step: TraceStep, metadata: M, f: F) -> R
    where
        F: FnOnce() -> R,
        M: FnOnce() -> String,
    {
        if !self.is_enabled() {
            return f();
        }
        let start = Instant::now();
        let result = f();
        self.record(step, start.elapsed(), metadata());
        result
    }

    /// Number of recorded measurements.
    pub fn len(&self) -> usize {
        self.measurements.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clear all measurements.
    pub fn clear(&self) {
        self.measurements.lock().unwrap_or_else(PoisonError::into_inner).clear();
        self.active_spans.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    /// Generate a per-step timing report with a quantization overhead summary.
    pub fn report(&self) -> String {
        let measurements = self.measurements.lock().unwrap_or_else(PoisonError::into_inner);
        if measurements.is_empty() {
            return "No measurements recorded. Enable tracing with TRACER.enable()".to_string();
        }

        let mut totals: HashMap<TraceStep, Duration> = HashMap::new();
        let mut counts: HashMap<TraceStep, usize> = HashMap::new();
        let mut total_time = Duration::ZERO;

        for m in measurements.iter() {
            *totals.entry(m.step).or_default() += m.duration;
            *counts.entry(m.step).or_default() += 1;
            total_time += m.duration;
        }

        let mut output = String::from("\nQUANTIZATION TRACE REPORT\n");
        output.push_str(&format!("Total Measured Time: {total_time:.2?}\n"));
        output.push_str("----------------------------------------------------------------\n");
        output.push_str(&format!(
            "{:<15} | {:<8} | {:<15} | {:<8}\n",
            "Step", "Count", "Duration", "% Time"
        ));
        output.push_str("----------------------------------------------------------------\n");

        let mut sorted_steps: Vec<_> = totals.keys().collect();
        sorted_steps.sort_by(|a, b| totals[b].cmp(&totals[a]));

        for step in sorted_steps {
            let duration = totals[step];
            let count = counts[step];
            let percentage = if total_time.as_nanos() > 0 {
                (duration.as_secs_f64() / total_time.as_secs_f64()) * 100.0
            } else {
                0.0
            };
            output.push_str(&format!(
                "{:<15} | {:<8} | {:<15.2?} | {:>7.2}%\n",
                step.to_string(),
                count,
                duration,
                percentage
            ));
        }
        output.push_str("----------------------------------------------------------------\n");

        let step_total = |step: TraceStep| totals.get(&step).copied().unwrap_or_default();
        let contract_time = step_total(TraceStep::Contract);
        let overhead_time = step_total(TraceStep::Calibrate)
            + step_total(TraceStep::Quantize)
            + step_total(TraceStep::Dequantize)
            + step_total(TraceStep::Rescale);

        if contract_time.as_nanos() > 0 {
            let overhead_pct = (overhead_time.as_secs_f64()
                / (contract_time + overhead_time).as_secs_f64())
                * 100.0;

            output.push_str("\n[Quantization Overhead]\n");
            output.push_str(&format!("Contraction:    {contract_time:.2?}\n"));
            output.push_str(&format!(
                "Quantization:   {overhead_time:.2?} ({overhead_pct:.2}%)\n"
            ));
        }

        output
    }
}

impl Default for Tracer {
    fn default() -> Self {
        Self::new()
    }
}

/// Global tracer instance.
pub static TRACER: LazyLock<Tracer> = LazyLock::new(Tracer::new);
