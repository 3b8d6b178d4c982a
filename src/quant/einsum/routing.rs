//! Fake-quantized einsum routing
//!
//! Decides per call whether a contraction runs in float, in float on
//! dequantized operands, or on integer levels with a wide accumulator.

use ndarray::{ArrayD, Dimension};

use super::accumulator::{Accumulator, AccumulatorScalar};
use super::contract::contract;
use super::spec::EinsumSpec;
use crate::error::{QuantError, Result};
use crate::quant::calibration::calibrate;
use crate::quant::codec::{dequantize, quantize, QuantizedTensor};
use crate::quant::config::QuantizationConfig;
use crate::quant::fake_quantize::fake_quantize;
use crate::trace::{TraceStep, TRACER};

/// Plain float einsum over two operands.
pub fn einsum(equation: &str, lhs: &ArrayD<f32>, rhs: &ArrayD<f32>) -> Result<ArrayD<f32>> {
    let spec = EinsumSpec::parse(equation)?;
    float_contract(&spec, lhs, rhs)
}

/// Einsum with optional quantization of either operand.
///
/// - neither config: plain float contraction
/// - one config: that operand is fake-quantized, the contraction runs in float
/// - both configs: integer contraction of the levels, zero-point corrected and
///   rescaled by the product of the operand scales. An operand whose scale
///   varies along a contracted axis cannot be factored out of the sum; that
///   case falls back to contracting the dequantized operands
///
/// # Errors
/// `InvalidEquation` for a malformed equation or operands that do not match
/// it, `NumericOverflow` if no accumulator is wide enough, plus any
/// calibration or codec error for the quantized operands.
pub fn fake_quant_einsum(
    equation: &str,
    lhs: &ArrayD<f32>,
    rhs: &ArrayD<f32>,
    lhs_config: Option<&QuantizationConfig>,
    rhs_config: Option<&QuantizationConfig>,
) -> Result<ArrayD<f32>> {
    let spec = EinsumSpec::parse(equation)?;
    spec.label_sizes(lhs.shape(), rhs.shape())?;

    match (lhs_config, rhs_config) {
        (None, None) => float_contract(&spec, lhs, rhs),
        (Some(config), None) => {
            log::debug!("einsum '{equation}': quantizing lhs only, float contraction");
            let lhs = fake_quantize(lhs, config)?.into_output();
            float_contract(&spec, &lhs, rhs)
        }
        (None, Some(config)) => {
            log::debug!("einsum '{equation}': quantizing rhs only, float contraction");
            let rhs = fake_quantize(rhs, config)?.into_output();
            float_contract(&spec, lhs, &rhs)
        }
        (Some(lhs_config), Some(rhs_config)) => {
            let lhs_q = quantize(lhs, &calibrate(lhs, lhs_config)?, lhs_config)?;
            let rhs_q = quantize(rhs, &calibrate(rhs, rhs_config)?, rhs_config)?;

            if !factorable(&spec, &lhs_q, &rhs_q) {
                log::debug!(
                    "einsum '{equation}': per-channel scale on a contracted axis, dequantized float contraction"
                );
                return float_contract(&spec, &dequantize(&lhs_q), &dequantize(&rhs_q));
            }

            let reduction = spec.reduction_size(lhs.shape(), rhs.shape())?;
            let accumulator = Accumulator::select(lhs_config, rhs_config, reduction)?;
            log::debug!(
                "einsum '{equation}': integer contraction, {accumulator:?} accumulator over {reduction} terms"
            );
            quantized_contract(&spec, &lhs_q, &rhs_q, accumulator)
        }
    }
}

fn float_contract(spec: &EinsumSpec, lhs: &ArrayD<f32>, rhs: &ArrayD<f32>) -> Result<ArrayD<f32>> {
    TRACER.span(
        TraceStep::Contract,
        || format!("float '{}' {:?} x {:?}", spec.equation(), lhs.shape(), rhs.shape()),
        || contract(spec, lhs, rhs),
    )
}

/// Whether every per-channel axis of both operands survives into the output.
fn factorable(spec: &EinsumSpec, lhs: &QuantizedTensor, rhs: &QuantizedTensor) -> bool {
    let survives = |labels: &[char], scale_shape: &[usize]| {
        labels
            .iter()
            .zip(scale_shape)
            .all(|(label, &size)| size == 1 || spec.output().contains(label))
    };
    survives(spec.lhs(), lhs.scale().shape()) && survives(spec.rhs(), rhs.scale().shape())
}

/// Integer contraction of two quantized operands, rescaled to float.
fn quantized_contract(
    spec: &EinsumSpec,
    lhs: &QuantizedTensor,
    rhs: &QuantizedTensor,
    accumulator: Accumulator,
) -> Result<ArrayD<f32>> {
    let levels = match accumulator {
        Accumulator::I32 => integer_levels::<i32>(spec, lhs, rhs)?,
        Accumulator::I64 => integer_levels::<i64>(spec, lhs, rhs)?,
    };
    Ok(TRACER.span(
        TraceStep::Rescale,
        || format!("'{}' {:?}", spec.equation(), levels.shape()),
        || rescale(spec, &levels, lhs, rhs),
    ))
}

/// `Σ(a - za)(b - zb)` expanded as `Σab - Σa·zb - Σza·b + Σza·zb`.
fn integer_levels<T: AccumulatorScalar>(
    spec: &EinsumSpec,
    lhs: &QuantizedTensor,
    rhs: &QuantizedTensor,
) -> Result<ArrayD<f64>> {
    let a = lhs.values().mapv(T::from_level);
    let b = rhs.values().mapv(T::from_level);
    let za = broadcast_zero_point::<T>(lhs)?;
    let zb = broadcast_zero_point::<T>(rhs)?;

    let contract_traced = |x: &ArrayD<T>, y: &ArrayD<T>| {
        TRACER.span(
            TraceStep::Contract,
            || format!("int '{}' {:?} x {:?}", spec.equation(), x.shape(), y.shape()),
            || contract(spec, x, y),
        )
    };

    let mut acc = contract_traced(&a, &b)?;
    if let Some(zb) = &zb {
        acc = acc - contract_traced(&a, zb)?;
    }
    if let Some(za) = &za {
        acc = acc - contract_traced(za, &b)?;
    }
    if let (Some(za), Some(zb)) = (&za, &zb) {
        acc = acc + contract_traced(za, zb)?;
    }
    Ok(acc.mapv(T::to_f64))
}

fn broadcast_zero_point<T: AccumulatorScalar>(q: &QuantizedTensor) -> Result<Option<ArrayD<T>>> {
    let Some(zero_point) = q.zero_point() else {
        return Ok(None);
    };
    let view = zero_point
        .broadcast(q.values().raw_dim())
        .ok_or_else(|| QuantError::shape_mismatch(q.shape(), zero_point.shape()))?;
    Ok(Some(view.mapv(T::from_level)))
}

/// Multiply each output element by `scale_lhs * scale_rhs` of its groups.
fn rescale(
    spec: &EinsumSpec,
    levels: &ArrayD<f64>,
    lhs: &QuantizedTensor,
    rhs: &QuantizedTensor,
) -> ArrayD<f32> {
    let lhs_positions = spec.output_positions(spec.lhs());
    let rhs_positions = spec.output_positions(spec.rhs());
    let lhs_scale = lhs.scale();
    let rhs_scale = rhs.scale();
    let mut lhs_group = vec![0; lhs_scale.ndim()];
    let mut rhs_group = vec![0; rhs_scale.ndim()];

    let mut out = ArrayD::<f32>::zeros(levels.raw_dim());
    for (index, slot) in out.indexed_iter_mut() {
        let index = index.slice();
        scale_group(&mut lhs_group, &lhs_positions, lhs_scale.shape(), index);
        scale_group(&mut rhs_group, &rhs_positions, rhs_scale.shape(), index);
        let scale = f64::from(lhs_scale[lhs_group.as_slice()])
            * f64::from(rhs_scale[rhs_group.as_slice()]);
        *slot = (levels[index] * scale) as f32;
    }
    out
}

fn scale_group(
    group: &mut [usize],
    positions: &[Option<usize>],
    scale_shape: &[usize],
    out_index: &[usize],
) {
    for ((slot, position), &size) in group.iter_mut().zip(positions).zip(scale_shape) {
        *slot = match position {
            Some(pos) if size > 1 => out_index[*pos],
            _ => 0,
        };
    }
}
