//! Two-operand einsum equation parsing

use std::collections::BTreeMap;

use crate::error::{QuantError, Result};

/// Parsed two-operand einsum equation such as `"ij,jk->ik"`
///
/// Labels are ASCII letters. Without `->` the output holds every label that
/// appears exactly once, in alphabetical order. A label may appear at most
/// once per operand.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EinsumSpec {
    equation: String,
    lhs: Vec<char>,
    rhs: Vec<char>,
    output: Vec<char>,
}

impl EinsumSpec {
    pub fn parse(equation: &str) -> Result<Self> {
        let invalid = |reason: &str| QuantError::InvalidEquation {
            equation: equation.to_string(),
            reason: reason.to_string(),
        };

        if equation.chars().any(char::is_whitespace) {
            return Err(invalid("whitespace is not allowed"));
        }

        let (inputs, explicit_output) = match equation.split_once("->") {
            Some((inputs, output)) => (inputs, Some(output)),
            None => (equation, None),
        };

        let operands: Vec<&str> = inputs.split(',').collect();
        let [lhs, rhs] = operands.as_slice() else {
            return Err(invalid("expected exactly two operands"));
        };
        let lhs = parse_labels(lhs).map_err(|reason| invalid(&reason))?;
        let rhs = parse_labels(rhs).map_err(|reason| invalid(&reason))?;

        let output = match explicit_output {
            Some(output) => {
                let output = parse_labels(output).map_err(|reason| invalid(&reason))?;
                if let Some(label) = output.iter().find(|l| !lhs.contains(l) && !rhs.contains(l)) {
                    return Err(invalid(&format!("output label '{label}' not in any operand")));
                }
                output
            }
            None => {
                let mut counts: BTreeMap<char, usize> = BTreeMap::new();
                for &label in lhs.iter().chain(&rhs) {
                    *counts.entry(label).or_default() += 1;
                }
                counts.into_iter().filter(|&(_, n)| n == 1).map(|(label, _)| label).collect()
            }
        };

        Ok(Self { equation: equation.to_string(), lhs, rhs, output })
    }

    pub fn equation(&self) -> &str {
        &self.equation
    }

    pub fn lhs(&self) -> &[char] {
        &self.lhs
    }

    pub fn rhs(&self) -> &[char] {
        &self.rhs
    }

    pub fn output(&self) -> &[char] {
        &self.output
    }

    /// Labels summed over: present in an operand but not in the output.
    pub fn contracted(&self) -> Vec<char> {
        let mut labels = Vec::new();
        for &label in self.lhs.iter().chain(&self.rhs) {
            if !self.output.contains(&label) && !labels.contains(&label) {
                labels.push(label);
            }
        }
        labels
    }

    /// Size of every label, checked for consistency across operands.
    ///
    /// # Errors
    /// `InvalidEquation` if an operand's rank differs from its label count or
    /// a label is bound to two different sizes.
    pub fn label_sizes(&self, lhs_shape: &[usize], rhs_shape: &[usize]) -> Result<BTreeMap<char, usize>> {
        let mut sizes = BTreeMap::new();
        for (name, labels, shape) in [("lhs", &self.lhs, lhs_shape), ("rhs", &self.rhs, rhs_shape)] {
            if labels.len() != shape.len() {
                return Err(self.invalid(format!(
                    "{name} has {} labels but rank {}",
                    labels.len(),
                    shape.len()
                )));
            }
            for (&label, &size) in labels.iter().zip(shape) {
                match sizes.insert(label, size) {
                    Some(previous) if previous != size => {
                        return Err(self.invalid(format!(
                            "label '{label}' bound to sizes {previous} and {size}"
                        )));
                    }
                    _ => {}
                }
            }
        }
        Ok(sizes)
    }

    /// Number of products summed into each output element.
    pub fn reduction_size(&self, lhs_shape: &[usize], rhs_shape: &[usize]) -> Result<u64> {
        let sizes = self.label_sizes(lhs_shape, rhs_shape)?;
        Ok(self.contracted().iter().map(|label| sizes[label] as u64).product())
    }

    /// Output position of each operand axis (`None` for contracted axes).
    pub(crate) fn output_positions(&self, labels: &[char]) -> Vec<Option<usize>> {
        labels.iter().map(|label| self.output.iter().position(|o| o == label)).collect()
    }

    fn invalid(&self, reason: String) -> QuantError {
        QuantError::InvalidEquation { equation: self.equation.clone(), reason }
    }
}

fn parse_labels(term: &str) -> std::result::Result<Vec<char>, String> {
    let mut labels = Vec::with_capacity(term.len());
    for label in term.chars() {
        if !label.is_ascii_alphabetic() {
            return Err(format!("invalid label '{label}'"));
        }
        if labels.contains(&label) {
            return Err(format!("label '{label}' repeated within one term"));
        }
        labels.push(label);
    }
    Ok(labels)
}
