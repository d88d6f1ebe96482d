//! Functional interface for traced operations.
//!
//! Stateless operations with no owning layer. Use these inside custom
//! `forward` implementations; they record into the tape exactly like the
//! module versions, but no hook is ever attached to them.
//!
//! # Example
//!
//! ```
//! use aprender_depgraph::nn::F;
//! use aprender_depgraph::trace::{Tape, Tensor};
//!
//! let mut tape = Tape::new();
//! let x = Tensor::new(&[-1.0, 2.0], &[1, 2]);
//! let y = F::relu(&x, &mut tape);
//! assert_eq!(y.data(), &[0.0, 2.0]);
//! assert!(tape.is_empty()); // constants produce no history
//! ```

use super::error::ModelError;
use crate::trace::{Tape, Tensor};

/// `ReLU` activation: max(0, x)
#[must_use]
pub fn relu(x: &Tensor, tape: &mut Tape) -> Tensor {
    let data: Vec<f32> = x.data().iter().map(|&v| v.max(0.0)).collect();
    let history = tape.record_op("ReluBackward", &[x], 0);
    Tensor::from_vec(data, x.shape()).with_history(history)
}

/// Flatten dimensions `start_dim..` into one.
///
/// Returns the input unchanged (same history) when there is nothing to
/// flatten.
#[must_use]
pub fn flatten(x: &Tensor, start_dim: usize, tape: &mut Tape) -> Tensor {
    let shape = x.shape();
    if shape.len() <= start_dim + 1 {
        return x.clone();
    }

    let mut new_shape: Vec<usize> = shape[..start_dim].to_vec();
    new_shape.push(shape[start_dim..].iter().product());

    let history = tape.record_op("ViewBackward", &[x], 0);
    x.reshape(&new_shape).with_history(history)
}

/// Element-wise sum of two tensors of identical shape.
pub fn add(a: &Tensor, b: &Tensor, tape: &mut Tape) -> Result<Tensor, ModelError> {
    if a.shape() != b.shape() {
        return Err(ModelError::ShapeMismatch {
            op: "add",
            lhs: a.shape().to_vec(),
            rhs: b.shape().to_vec(),
        });
    }
    let data: Vec<f32> = a
        .data()
        .iter()
        .zip(b.data())
        .map(|(x, y)| x + y)
        .collect();
    let history = tape.record_op("AddBackward", &[a, b], 0);
    Ok(Tensor::from_vec(data, a.shape()).with_history(history))
}

/// Multiply every element by `factor`.
#[must_use]
pub fn scale(x: &Tensor, factor: f32, tape: &mut Tape) -> Tensor {
    let data: Vec<f32> = x.data().iter().map(|&v| v * factor).collect();
    let history = tape.record_op("MulBackward", &[x], 0);
    Tensor::from_vec(data, x.shape()).with_history(history)
}
