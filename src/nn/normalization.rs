//! Batch normalization layers.
//!
//! Both layers normalize with their running statistics, i.e. they behave as
//! in evaluation mode. Dependency tracing only needs one representative
//! forward pass, so batch statistics are never accumulated.
//!
//! # References
//!
//! - Ioffe, S., & Szegedy, C. (2015). Batch normalization: Accelerating
//!   deep network training. ICML.

use std::any::Any;

use super::error::ModelError;
use super::hooks::ForwardContext;
use super::module::{ChannelDims, LayerId, LayerRole, Module};
use crate::trace::Tensor;

/// Per-channel affine parameters and running statistics.
#[derive(Debug, Clone)]
struct BatchNormState {
    num_features: usize,
    eps: f32,
    /// Learnable scale
    weight: Tensor,
    /// Learnable shift
    bias: Tensor,
    running_mean: Tensor,
    running_var: Tensor,
}

impl BatchNormState {
    fn new(num_features: usize) -> Self {
        Self {
            num_features,
            eps: 1e-5,
            weight: Tensor::ones(&[num_features]),
            bias: Tensor::zeros(&[num_features]),
            running_mean: Tensor::zeros(&[num_features]),
            running_var: Tensor::ones(&[num_features]),
        }
    }

    fn normalize(
        &self,
        layer: &'static str,
        input: &Tensor,
        ctx: &mut ForwardContext<'_>,
    ) -> Result<Tensor, ModelError> {
        let shape = input.shape();
        let features = shape[1];
        if features != self.num_features {
            return Err(ModelError::ChannelMismatch {
                layer,
                expected: self.num_features,
                got: features,
            });
        }

        let inner: usize = shape[2..].iter().product();
        let (gamma, beta) = (self.weight.data(), self.bias.data());
        let (mean, var) = (self.running_mean.data(), self.running_var.data());

        let output: Vec<f32> = input
            .data()
            .iter()
            .enumerate()
            .map(|(i, &x)| {
                let c = (i / inner) % features;
                (x - mean[c]) / (var[c] + self.eps).sqrt() * gamma[c] + beta[c]
            })
            .collect();

        let history = ctx.tape().record_op("NativeBatchNormBackward", &[input], 2);
        Ok(Tensor::from_vec(output, shape).with_history(history))
    }

    fn retain(&mut self, keep: &[usize]) {
        self.weight = self.weight.select(0, keep);
        self.bias = self.bias.select(0, keep);
        self.running_mean = self.running_mean.select(0, keep);
        self.running_var = self.running_var.select(0, keep);
        self.num_features = keep.len();
    }

    fn dims(&self) -> ChannelDims {
        ChannelDims {
            in_channels: self.num_features,
            out_channels: self.num_features,
        }
    }
}

/// Batch Normalization over `(N, C)` or `(N, C, L)` input.
#[derive(Debug)]
pub struct BatchNorm1d {
    state: BatchNormState,
    id: LayerId,
}

impl BatchNorm1d {
    /// Create a new `BatchNorm1d` layer over `num_features` channels.
    #[must_use]
    pub fn new(num_features: usize) -> Self {
        Self {
            state: BatchNormState::new(num_features),
            id: LayerId::new(),
        }
    }

    /// Set epsilon for numerical stability.
    #[must_use]
    pub fn with_eps(mut self, eps: f32) -> Self {
        self.state.eps = eps;
        self
    }

    /// Number of normalized features.
    #[must_use]
    pub fn num_features(&self) -> usize {
        self.state.num_features
    }

    /// Running mean.
    #[must_use]
    pub fn running_mean(&self) -> &Tensor {
        &self.state.running_mean
    }

    /// Keep only the features at `keep`.
    ///
    /// # Panics
    ///
    /// Panics if an index is out of range; callers validate first.
    pub fn retain_features(&mut self, keep: &[usize]) {
        self.state.retain(keep);
    }
}

impl Module for BatchNorm1d {
    fn forward(&self, input: &Tensor, ctx: &mut ForwardContext<'_>) -> Result<Tensor, ModelError> {
        if input.ndim() != 2 && input.ndim() != 3 {
            return Err(ModelError::InvalidRank {
                layer: "BatchNorm1d",
                expected: "2 or 3",
                got: input.ndim(),
            });
        }
        self.state.normalize("BatchNorm1d", input, ctx)
    }

    fn id(&self) -> LayerId {
        self.id
    }

    fn role(&self) -> LayerRole {
        LayerRole::Normalization
    }

    fn type_name(&self) -> &'static str {
        "BatchNorm1d"
    }

    fn channels(&self) -> Option<ChannelDims> {
        Some(self.state.dims())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Batch Normalization over `(N, C, H, W)` input.
#[derive(Debug)]
pub struct BatchNorm2d {
    state: BatchNormState,
    id: LayerId,
}

impl BatchNorm2d {
    /// Create a new `BatchNorm2d` layer over `num_features` channels.
    #[must_use]
    pub fn new(num_features: usize) -> Self {
        Self {
            state: BatchNormState::new(num_features),
            id: LayerId::new(),
        }
    }

    /// Set epsilon for numerical stability.
    #[must_use]
    pub fn with_eps(mut self, eps: f32) -> Self {
        self.state.eps = eps;
        self
    }

    /// Number of normalized channels.
    #[must_use]
    pub fn num_features(&self) -> usize {
        self.state.num_features
    }

    /// Running mean.
    #[must_use]
    pub fn running_mean(&self) -> &Tensor {
        &self.state.running_mean
    }

    /// Keep only the channels at `keep`.
    ///
    /// # Panics
    ///
    /// Panics if an index is out of range; callers validate first.
    pub fn retain_features(&mut self, keep: &[usize]) {
        self.state.retain(keep);
    }
}

impl Module for BatchNorm2d {
    fn forward(&self, input: &Tensor, ctx: &mut ForwardContext<'_>) -> Result<Tensor, ModelError> {
        if input.ndim() != 4 {
            return Err(ModelError::InvalidRank {
                layer: "BatchNorm2d",
                expected: "4",
                got: input.ndim(),
            });
        }
        self.state.normalize("BatchNorm2d", input, ctx)
    }

    fn id(&self) -> LayerId {
        self.id
    }

    fn role(&self) -> LayerRole {
        LayerRole::Normalization
    }

    fn type_name(&self) -> &'static str {
        "BatchNorm2d"
    }

    fn channels(&self) -> Option<ChannelDims> {
        Some(self.state.dims())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
