//! Fully connected (linear) layer.
//!
//! Implements the transformation y = xW^T + b.
//!
//! # References
//!
//! - Glorot, X., & Bengio, Y. (2010). Understanding the difficulty of training
//!   deep feedforward neural networks. AISTATS.

use std::any::Any;

use super::error::ModelError;
use super::hooks::ForwardContext;
use super::init::xavier_uniform;
use super::module::{ChannelDims, LayerId, LayerRole, Module};
use crate::trace::Tensor;

/// Fully connected layer: y = xW^T + b
///
/// Weight initialization follows Xavier/Glorot (Glorot & Bengio, 2010).
///
/// # Shape
///
/// - Input: `(*, in_features)` where `*` means any number of batch dimensions
/// - Output: `(*, out_features)`
///
/// # Example
///
/// ```
/// use aprender_depgraph::nn::{Linear, Model};
/// use aprender_depgraph::trace::Tensor;
///
/// let model = Model::new(Linear::new(20, 30));
/// let y = model.forward(&Tensor::ones(&[128, 20])).unwrap().output;
/// assert_eq!(y.shape(), &[128, 30]);
/// ```
pub struct Linear {
    /// Weight matrix, shape: [`out_features`, `in_features`]
    weight: Tensor,
    /// Bias vector, shape: [`out_features`], or None
    bias: Option<Tensor>,
    in_features: usize,
    out_features: usize,
    id: LayerId,
}

impl Linear {
    /// Create a new Linear layer with Xavier initialization.
    #[must_use]
    pub fn new(in_features: usize, out_features: usize) -> Self {
        Self::with_seed(in_features, out_features, None)
    }

    /// Create a Linear layer with a specific random seed.
    #[must_use]
    pub fn with_seed(in_features: usize, out_features: usize, seed: Option<u64>) -> Self {
        let weight = xavier_uniform(
            &[out_features, in_features],
            in_features,
            out_features,
            seed,
        );
        Self {
            weight,
            bias: Some(Tensor::zeros(&[out_features])),
            in_features,
            out_features,
            id: LayerId::new(),
        }
    }

    /// Drop the bias term.
    #[must_use]
    pub fn without_bias(mut self) -> Self {
        self.bias = None;
        self
    }

    /// Get the input feature dimension.
    #[must_use]
    pub fn in_features(&self) -> usize {
        self.in_features
    }

    /// Get the output feature dimension.
    #[must_use]
    pub fn out_features(&self) -> usize {
        self.out_features
    }

    /// Weight matrix.
    #[must_use]
    pub fn weight(&self) -> &Tensor {
        &self.weight
    }

    /// Bias vector, if any.
    #[must_use]
    pub fn bias(&self) -> Option<&Tensor> {
        self.bias.as_ref()
    }

    /// Keep only the output features at `keep`.
    ///
    /// # Panics
    ///
    /// Panics if an index is out of range; callers validate first.
    pub fn retain_out_features(&mut self, keep: &[usize]) {
        self.weight = self.weight.select(0, keep);
        self.bias = self.bias.as_ref().map(|b| b.select(0, keep));
        self.out_features = keep.len();
    }

    /// Keep only the input features at `keep`.
    ///
    /// # Panics
    ///
    /// Panics if an index is out of range; callers validate first.
    pub fn retain_in_features(&mut self, keep: &[usize]) {
        self.weight = self.weight.select(1, keep);
        self.in_features = keep.len();
    }
}

impl Module for Linear {
    fn forward(&self, input: &Tensor, ctx: &mut ForwardContext<'_>) -> Result<Tensor, ModelError> {
        let features = input.shape().last().copied().ok_or(ModelError::InvalidRank {
            layer: "Linear",
            expected: ">=1",
            got: 0,
        })?;
        if features != self.in_features {
            return Err(ModelError::ChannelMismatch {
                layer: "Linear",
                expected: self.in_features,
                got: features,
            });
        }

        let rows = input.numel() / self.in_features.max(1);
        let x = input.data();
        let w = self.weight.data();
        let mut output = Vec::with_capacity(rows * self.out_features);
        for r in 0..rows {
            let row = &x[r * self.in_features..(r + 1) * self.in_features];
            for o in 0..self.out_features {
                let weights = &w[o * self.in_features..(o + 1) * self.in_features];
                let dot: f32 = row.iter().zip(weights).map(|(a, b)| a * b).sum();
                output.push(dot + self.bias.as_ref().map_or(0.0, |b| b.data()[o]));
            }
        }

        let mut shape = input.shape().to_vec();
        if let Some(last) = shape.last_mut() {
            *last = self.out_features;
        }

        let (name, parameters) = if self.bias.is_some() {
            ("AddmmBackward", 2)
        } else {
            ("MmBackward", 1)
        };
        let history = ctx.tape().record_op(name, &[input], parameters);
        Ok(Tensor::from_vec(output, &shape).with_history(history))
    }

    fn id(&self) -> LayerId {
        self.id
    }

    fn role(&self) -> LayerRole {
        LayerRole::FullyConnected
    }

    fn type_name(&self) -> &'static str {
        "Linear"
    }

    fn channels(&self) -> Option<ChannelDims> {
        Some(ChannelDims {
            in_channels: self.in_features,
            out_channels: self.out_features,
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl std::fmt::Debug for Linear {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Linear")
            .field("in_features", &self.in_features)
            .field("out_features", &self.out_features)
            .field("bias", &self.bias.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::Model;

    #[test]
    fn test_linear_known_values() {
        let mut layer = Linear::new(2, 2);
        layer.weight = Tensor::new(&[1.0, 0.0, 1.0, 1.0], &[2, 2]);
        layer.bias = Some(Tensor::from_slice(&[0.0, -1.0]));
        let model = Model::new(layer);

        let y = model
            .forward(&Tensor::new(&[2.0, 3.0], &[1, 2]))
            .expect("forward")
            .output;
        assert_eq!(y.data(), &[2.0, 4.0]);
    }

    #[test]
    fn test_linear_without_bias_records_mm() {
        let model = Model::new(Linear::with_seed(3, 2, Some(9)).without_bias());
        let trace = model.forward(&Tensor::ones(&[4, 3])).expect("forward");
        let record = trace
            .tape
            .get(trace.output.history().expect("traced"))
            .expect("recorded");

        assert_eq!(trace.output.shape(), &[4, 2]);
        assert_eq!(record.name(), "MmBackward");
        assert_eq!(record.predecessors().len(), 1);
    }

    #[test]
    fn test_linear_feature_mismatch() {
        let model = Model::new(Linear::new(8, 2));
        assert!(matches!(
            model.forward(&Tensor::ones(&[1, 7])),
            Err(ModelError::ChannelMismatch {
                expected: 8,
                got: 7,
                ..
            })
        ));
    }

    #[test]
    fn test_retain_features() {
        let mut layer = Linear::with_seed(5, 4, Some(11));
        layer.retain_out_features(&[1, 3]);
        layer.retain_in_features(&[0, 4]);

        assert_eq!(layer.out_features(), 2);
        assert_eq!(layer.in_features(), 2);
        assert_eq!(layer.weight().shape(), &[2, 2]);
        assert_eq!(layer.bias().map(Tensor::numel), Some(2));
    }
}
