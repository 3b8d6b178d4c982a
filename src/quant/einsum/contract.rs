//! Generic two-operand contraction

use ndarray::{ArrayD, Dimension, IxDyn, LinalgScalar};

use super::spec::EinsumSpec;
use crate::error::{QuantError, Result};

/// Where an operand axis takes its index from
#[derive(Debug, Clone, Copy)]
enum Source {
    Output(usize),
    Contracted(usize),
}

fn sources(spec: &EinsumSpec, labels: &[char], contracted: &[char]) -> Result<Vec<Source>> {
    labels
        .iter()
        .map(|label| {
            if let Some(pos) = spec.output().iter().position(|o| o == label) {
                return Ok(Source::Output(pos));
            }
            contracted.iter().position(|c| c == label).map(Source::Contracted).ok_or_else(|| {
                QuantError::InvalidEquation {
                    equation: spec.equation().to_string(),
                    reason: format!("label '{label}' is neither output nor contracted"),
                }
            })
        })
        .collect()
}

fn fill_index(index: &mut [usize], sources: &[Source], out: &[usize], summed: &[usize]) {
    for (slot, source) in index.iter_mut().zip(sources) {
        *slot = match *source {
            Source::Output(pos) => out[pos],
            Source::Contracted(pos) => summed[pos],
        };
    }
}

/// Advance a row-major multi-index; `false` once it wraps around.
fn next_index(index: &mut [usize], dims: &[usize]) -> bool {
    for axis in (0..index.len()).rev() {
        index[axis] += 1;
        if index[axis] < dims[axis] {
            return true;
        }
        index[axis] = 0;
    }
    false
}

/// Contract `lhs` and `rhs` according to `spec`, accumulating in `T`.
///
/// Callers are responsible for choosing a `T` wide enough for the sum.
pub(crate) fn contract<T: LinalgScalar>(
    spec: &EinsumSpec,
    lhs: &ArrayD<T>,
    rhs: &ArrayD<T>,
) -> Result<ArrayD<T>> {
    let sizes = spec.label_sizes(lhs.shape(), rhs.shape())?;
    let contracted = spec.contracted();
    let out_shape: Vec<usize> = spec.output().iter().map(|label| sizes[label]).collect();
    let summed_dims: Vec<usize> = contracted.iter().map(|label| sizes[label]).collect();

    let mut out = ArrayD::<T>::zeros(IxDyn(&out_shape));
    if summed_dims.contains(&0) {
        return Ok(out);
    }

    let lhs_sources = sources(spec, spec.lhs(), &contracted)?;
    let rhs_sources = sources(spec, spec.rhs(), &contracted)?;
    let mut lhs_index = vec![0; lhs.ndim()];
    let mut rhs_index = vec![0; rhs.ndim()];
    let mut summed = vec![0; contracted.len()];

    for (out_index, slot) in out.indexed_iter_mut() {
        let out_index = out_index.slice();
        summed.fill(0);
        let mut acc = *slot;
        loop {
            fill_index(&mut lhs_index, &lhs_sources, out_index, &summed);
            fill_index(&mut rhs_index, &rhs_sources, out_index, &summed);
            acc = acc + lhs[lhs_index.as_slice()] * rhs[rhs_index.as_slice()];
            if !next_index(&mut summed, &summed_dims) {
                break;
            }
        }
        *slot = acc;
    }
    Ok(out)
}
