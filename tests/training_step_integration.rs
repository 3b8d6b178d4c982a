//! Integration: a quantization-aware training step as a composing framework
//! would drive it
//!
//! - Config embedded in the caller's own JSON configuration
//! - Forward through fake-quantized einsum
//! - Backward through the gradient hook (built-in and caller-registered)
//! - Statistics smoothed across steps by a caller-owned accumulator

use cuantizar::trace::{TraceStep, TRACER};
use cuantizar::{
    fake_quant_einsum, fake_quantize, fake_quantize_observed, CalibrationMethod, GradientMode,
    GradientRule, Granularity, MovingAverageStats, QuantizationConfig,
};
use ndarray::{Array2, ArrayD, Zip};
use serde::Deserialize;

#[derive(Deserialize)]
struct LayerConfig {
    name: String,
    weights: QuantizationConfig,
    activations: QuantizationConfig,
}

fn weights() -> ArrayD<f32> {
    Array2::from_shape_fn((8, 4), |(i, j)| ((i * 4 + j) as f32 * 0.61).sin() * 0.5).into_dyn()
}

fn activations(step: usize) -> ArrayD<f32> {
    Array2::from_shape_fn((3, 8), |(i, j)| ((i * 8 + j + step) as f32 * 0.23).cos() * (1.0 + step as f32))
        .into_dyn()
}

#[test]
fn test_layer_config_from_json() {
    let json = r#"{
        "name": "dense_1",
        "weights": { "precision": 4, "granularity": { "per_channel": [1] } },
        "activations": {
            "precision": 8,
            "mode": "asymmetric",
            "calibration": { "percentile": { "lower": 0.1, "upper": 99.9 } },
            "gradient": "straight_through"
        }
    }"#;
    let layer: LayerConfig = serde_json::from_str(json).unwrap();
    assert_eq!(layer.name, "dense_1");
    assert_eq!(layer.weights.precision(), 4);
    assert_eq!(layer.weights.granularity(), &Granularity::per_channel([1]));
    assert!(!layer.activations.is_symmetric());
    assert_eq!(
        layer.activations.calibration(),
        &CalibrationMethod::Percentile { lower: 0.1, upper: 99.9 }
    );
    assert_eq!(layer.activations.gradient(), GradientMode::StraightThrough);

    let invalid = r#"{ "name": "x", "weights": { "precision": 1 }, "activations": {} }"#;
    assert!(serde_json::from_str::<LayerConfig>(invalid).is_err());
}

#[test]
fn test_forward_and_backward_step() {
    let weight_config = QuantizationConfig::builder()
        .precision(4)
        .per_channel([1])
        .clip_bound(0.3)
        .build()
        .unwrap();
    let activation_config = QuantizationConfig::asymmetric(8).unwrap();

    let w = weights();
    let x = activations(0);
    let out = fake_quant_einsum("bi,io->bo", &x, &w, Some(&activation_config), Some(&weight_config)).unwrap();
    assert_eq!(out.shape(), &[3, 4]);
    assert!(out.iter().all(|v| v.is_finite()));

    // Weight gradient is cut anywhere past the clip bound
    let fq = fake_quantize(&w, &weight_config).unwrap();
    let grad = ArrayD::from_elem(w.raw_dim(), 1.0f32);
    let weight_grad = fq.backward(&grad).unwrap();
    let edge = 0.3 + 1e-5;
    Zip::from(&weight_grad).and(&w).for_each(|&g, &v| {
        if v.abs() > edge {
            assert_eq!(g, 0.0);
        }
        if v.abs() <= 0.3 {
            assert_eq!(g, 1.0);
        }
    });
    assert!(fq.saturation_ratio() > 0.0);
}

/// Straight-through scaled down near the clip edge
struct SoftEdge;

impl GradientRule for SoftEdge {
    fn input_gradient(&self, grad_output: &ArrayD<f32>, saturated: &ArrayD<bool>) -> ArrayD<f32> {
        Zip::from(grad_output)
            .and(saturated)
            .map_collect(|&g, &clipped| if clipped { 0.1 * g } else { g })
    }
}

#[test]
fn test_caller_registered_gradient_rule() {
    let config = QuantizationConfig::builder().clip_bound(0.25).build().unwrap();
    let w = weights();
    let fq = fake_quantize(&w, &config).unwrap();
    let grad = ArrayD::from_elem(w.raw_dim(), 2.0f32);
    let custom = fq.backward_with(&SoftEdge, &grad).unwrap();

    Zip::from(&custom).and(fq.saturated()).for_each(|&g, &clipped| {
        assert_eq!(g, if clipped { 0.2 } else { 2.0 });
    });
}

#[test]
fn test_statistics_smoothed_across_steps() {
    let config = QuantizationConfig::int8();
    let mut observer = MovingAverageStats::new(0.1).unwrap();

    let mut scales = Vec::new();
    for step in 0..5 {
        let fq = fake_quantize_observed(&activations(step), &config, &mut observer).unwrap();
        scales.push(fq.quantized().scale().iter().copied().next().unwrap());
    }
    assert_eq!(observer.num_updates(), 5);

    // activations grow each step; the smoothed scale lags the per-step one
    let last = fake_quantize(&activations(4), &config).unwrap();
    let per_step_scale = last.quantized().scale().iter().copied().next().unwrap();
    assert!(scales.windows(2).all(|w| w[1] >= w[0]));
    assert!(scales[4] < per_step_scale);
}

#[test]
fn test_tracer_records_pipeline() {
    TRACER.clear();
    TRACER.enable();

    let config = QuantizationConfig::int8();
    fake_quant_einsum("bi,io->bo", &activations(1), &weights(), Some(&config), Some(&config)).unwrap();

    TRACER.disable();
    let report = TRACER.report();
    assert!(report.contains("QUANTIZATION TRACE REPORT"));
    assert!(report.contains(&TraceStep::Calibrate.to_string()));
    assert!(report.contains(&TraceStep::Rescale.to_string()));
    assert!(report.contains("[Quantization Overhead]"));
    assert!(!TRACER.is_empty());
}
