//! Tests for the quantize/dequantize codec

use super::*;
use crate::error::QuantError;
use crate::quant::calibration::{calibrate, compute_stats, CalibrationStats};
use crate::quant::config::{Granularity, NonFinitePolicy, QuantMode, QuantizationConfig};
use approx::assert_abs_diff_eq;
use ndarray::{arr1, arr2, ArrayD, IxDyn};
use proptest::prelude::*;

fn tensor(values: &[f32]) -> ArrayD<f32> {
    arr1(values).into_dyn()
}

#[test]
fn test_symmetric_scale_degenerate_group() {
    assert_eq!(symmetric_scale(0.0, 127, false), 1.0);
    assert_abs_diff_eq!(symmetric_scale(0.0, 127, true), SCALE_EPSILON / 127.0);
    assert_abs_diff_eq!(symmetric_scale(3.0, 127, false), 3.0 / 127.0);
}

#[test]
fn test_asymmetric_params() {
    let (scale, zp) = asymmetric_params(-1.0, 3.0, 255, false);
    assert_abs_diff_eq!(scale, 4.0 / 255.0);
    // -(-1) / (4/255) = 63.75
    assert_eq!(zp, 64);

    assert_eq!(asymmetric_params(0.0, 0.0, 255, false), (1.0, 0));
}

#[test]
fn test_round_half_to_even() {
    let levels: Vec<i32> =
        [0.5, 1.5, 2.5, -0.5, -1.5].iter().map(|&x| quantize_value(x, 1.0, 0, -127, 127).0).collect();
    assert_eq!(levels, vec![0, 2, 2, 0, -2]);
}

#[test]
fn test_quantize_value_saturation() {
    assert_eq!(quantize_value(200.0, 1.0, 0, -127, 127), (127, true));
    assert_eq!(quantize_value(-200.0, 1.0, 0, -127, 127), (-127, true));
    assert_eq!(quantize_value(f32::INFINITY, 1.0, 0, -127, 127), (127, true));
    assert_eq!(quantize_value(f32::NAN, 1.0, 5, 0, 255), (5, true));
    assert_eq!(quantize_value(127.0, 1.0, 0, -127, 127), (127, false));
}

#[test]
fn test_saturation_checked_before_rounding() {
    // rounds back onto the boundary level but was still clipped
    assert_eq!(quantize_value(127.4, 1.0, 0, -127, 127), (127, true));
    assert_eq!(quantize_value(-127.3, 1.0, 0, -127, 127), (-127, true));
    assert_eq!(quantize_value(255.2, 1.0, 0, 0, 255), (255, true));
    assert_eq!(quantize_value(126.6, 1.0, 0, -127, 127), (127, false));

    let config = QuantizationConfig::builder().clip_bound(1.0).build().unwrap();
    let x = tensor(&[1.003, 0.5]);
    let stats = calibrate(&x, &config).unwrap();
    let (q, saturated) = quantize_with_mask(&x, &stats, &config).unwrap();
    assert_eq!(q.values().iter().copied().collect::<Vec<_>>(), vec![127, 64]);
    assert_eq!(saturated.iter().copied().collect::<Vec<_>>(), vec![true, false]);
}

#[test]
fn test_rounding_scenario_with_unit_scale() {
    let config = QuantizationConfig::int8();
    let stats = CalibrationStats::scalar_symmetric(127.0).unwrap();
    let q = quantize(&tensor(&[0.5, 1.5, 2.5]), &stats, &config).unwrap();
    assert_eq!(q.values().iter().copied().collect::<Vec<_>>(), vec![0, 2, 2]);
    assert_abs_diff_eq!(q.scale().iter().next().copied().unwrap(), 1.0);
}

#[test]
fn test_int8_symmetric_scenario() {
    let config = QuantizationConfig::int8();
    let x = tensor(&[-3.0, 0.0, 3.0]);
    let stats = compute_stats(&x, &[], QuantMode::Symmetric).unwrap();
    let q = quantize(&x, &stats, &config).unwrap();

    assert_eq!(q.values().iter().copied().collect::<Vec<_>>(), vec![-127, 0, 127]);
    assert_abs_diff_eq!(q.scale()[[0]], 3.0 / 127.0, epsilon = 1e-9);
    assert!(q.zero_point().is_none());

    let restored = dequantize(&q);
    for (a, b) in x.iter().zip(restored.iter()) {
        assert_abs_diff_eq!(a, b, epsilon = 1e-6);
    }
}

#[test]
fn test_asymmetric_positive_range_widened_to_zero() {
    let config = QuantizationConfig::asymmetric(8).unwrap();
    let x = tensor(&[1.0, 2.0, 3.0]);
    let stats = compute_stats(&x, &[], QuantMode::Asymmetric).unwrap();
    let q = quantize(&x, &stats, &config).unwrap();

    let zp = q.zero_point().unwrap();
    assert_eq!(zp[[0]], 0);
    assert_eq!(q.values().iter().copied().collect::<Vec<_>>(), vec![85, 170, 255]);
}

#[test]
fn test_asymmetric_round_trip_negative_range() {
    let config = QuantizationConfig::asymmetric(8).unwrap();
    let x = tensor(&[-4.0, -1.0, 0.0, 2.0, 6.0]);
    let stats = compute_stats(&x, &[], QuantMode::Asymmetric).unwrap();
    let q = quantize(&x, &stats, &config).unwrap();
    let scale = q.scale()[[0]];
    let restored = q.dequantize();

    assert!(q.values().iter().all(|&v| (0..=255).contains(&v)));
    for (a, b) in x.iter().zip(restored.iter()) {
        assert!((a - b).abs() <= scale / 2.0 + 1e-5);
    }
}

#[test]
fn test_per_channel_scales_are_independent() {
    let config = QuantizationConfig::int8().with_granularity(Granularity::per_channel([0]));
    let x = arr2(&[[1.0, -2.0], [100.0, 200.0]]).into_dyn();
    let stats = calibrate(&x, &config).unwrap();
    let q = quantize(&x, &stats, &config).unwrap();

    assert_eq!(q.scale().shape(), &[2, 1]);
    assert_abs_diff_eq!(q.scale()[[0, 0]], 2.0 / 127.0);
    assert_abs_diff_eq!(q.scale()[[1, 0]], 200.0 / 127.0);
    assert_eq!(q.values()[[0, 1]], -127);
    assert_eq!(q.values()[[1, 1]], 127);
}

#[test]
fn test_all_zero_input_gets_unit_scale() {
    let config = QuantizationConfig::int8();
    let x = ArrayD::<f32>::zeros(IxDyn(&[2, 3]));
    let stats = calibrate(&x, &config).unwrap();
    let q = quantize(&x, &stats, &config).unwrap();
    assert_eq!(q.scale().iter().copied().collect::<Vec<_>>(), vec![1.0]);
    assert!(q.values().iter().all(|&v| v == 0));
}

#[test]
fn test_mode_mismatch_rejected() {
    let config = QuantizationConfig::asymmetric(8).unwrap();
    let stats = CalibrationStats::scalar_symmetric(1.0).unwrap();
    let err = quantize(&tensor(&[0.5]), &stats, &config).unwrap_err();
    assert!(matches!(err, QuantError::InvalidInput(_)));
}

#[test]
fn test_non_broadcastable_stats_rejected() {
    let config = QuantizationConfig::int8();
    let stats = CalibrationStats::symmetric(ArrayD::from_elem(IxDyn(&[3, 1]), 1.0)).unwrap();
    let x = ArrayD::<f32>::zeros(IxDyn(&[2, 4]));
    let err = quantize(&x, &stats, &config).unwrap_err();
    assert!(matches!(err, QuantError::ShapeMismatch { .. }));
}

#[test]
fn test_non_finite_input_policy() {
    let stats = CalibrationStats::scalar_symmetric(1.0).unwrap();
    let x = tensor(&[0.5, f32::NAN, f32::NEG_INFINITY]);

    let strict = QuantizationConfig::int8();
    assert!(matches!(quantize(&x, &stats, &strict), Err(QuantError::InvalidInput(_))));

    let lenient = QuantizationConfig::builder().non_finite(NonFinitePolicy::Clip).build().unwrap();
    let (q, saturated) = quantize_with_mask(&x, &stats, &lenient).unwrap();
    assert_eq!(q.values().iter().copied().collect::<Vec<_>>(), vec![64, 0, -127]);
    assert_eq!(saturated.iter().copied().collect::<Vec<_>>(), vec![false, true, true]);
}

#[test]
fn test_saturation_mask_with_clip_bound() {
    let config = QuantizationConfig::builder().clip_bound(1.0).build().unwrap();
    let x = tensor(&[0.5, 2.0, -3.0]);
    let stats = calibrate(&x, &config).unwrap();
    let (q, saturated) = quantize_with_mask(&x, &stats, &config).unwrap();
    assert_eq!(q.values().iter().copied().collect::<Vec<_>>(), vec![64, 127, -127]);
    assert_eq!(saturated.iter().copied().collect::<Vec<_>>(), vec![false, true, true]);
}

#[test]
fn test_memory_bytes() {
    let config = QuantizationConfig::int4();
    let x = tensor(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
    let stats = calibrate(&x, &config).unwrap();
    let q = quantize(&x, &stats, &config).unwrap();
    // 8 levels * 4 bits + one f32 scale
    assert_eq!(q.memory_bytes(), 4 + 4);
}

#[test]
fn test_quantized_tensor_serializes() {
    let config = QuantizationConfig::asymmetric(4).unwrap();
    let x = tensor(&[-1.0, 1.0]);
    let stats = calibrate(&x, &config).unwrap();
    let q = quantize(&x, &stats, &config).unwrap();
    let json = serde_json::to_value(&q).unwrap();
    assert_eq!(json["precision"], 4);
    assert_eq!(json["mode"], "asymmetric");
    assert!(json["zero_point"].is_object());
}

proptest! {
    #[test]
    fn prop_round_trip_within_half_scale(
        values in prop::collection::vec(-100.0f32..100.0, 1..64),
        bits in 2u8..=16,
        symmetric in any::<bool>(),
    ) {
        let config = QuantizationConfig::builder().precision(bits).symmetric(symmetric).build().unwrap();
        let x = tensor(&values);
        let stats = calibrate(&x, &config).unwrap();
        let q = quantize(&x, &stats, &config).unwrap();
        let scale = q.scale().iter().copied().next().unwrap();
        let restored = dequantize(&q);
        for (a, b) in x.iter().zip(restored.iter()) {
            prop_assert!((a - b).abs() <= scale / 2.0 + scale * 0.01 + 1e-4);
        }
    }

    #[test]
    fn prop_scale_positive_and_levels_in_range(
        values in prop::collection::vec(-1e3f32..1e3, 1..32),
        bits in 2u8..=16,
        symmetric in any::<bool>(),
    ) {
        let config = QuantizationConfig::builder().precision(bits).symmetric(symmetric).build().unwrap();
        let x = tensor(&values);
        let stats = calibrate(&x, &config).unwrap();
        let q = quantize(&x, &stats, &config).unwrap();
        prop_assert!(q.scale().iter().all(|&s| s > 0.0 && s.is_finite()));
        prop_assert!(q.values().iter().all(|&v| (config.qmin()..=config.qmax()).contains(&v)));
        if symmetric {
            prop_assert!(q.zero_point().is_none());
        }
    }
}
