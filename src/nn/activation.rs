//! Activation layers.

use std::any::Any;

use super::error::ModelError;
use super::functional;
use super::hooks::ForwardContext;
use super::module::{LayerId, LayerRole, Module};
use crate::trace::Tensor;

/// Rectified Linear Unit: `ReLU(x)` = max(0, x)
///
/// # Example
///
/// ```
/// use aprender_depgraph::nn::{Model, ReLU};
/// use aprender_depgraph::trace::Tensor;
///
/// let model = Model::new(ReLU::new());
/// let x = Tensor::from_slice(&[-1.0, 0.0, 1.0, 2.0]);
/// let y = model.forward(&x).unwrap().output;
/// assert_eq!(y.data(), &[0.0, 0.0, 1.0, 2.0]);
/// ```
#[derive(Debug)]
pub struct ReLU {
    id: LayerId,
}

impl ReLU {
    /// Create a new `ReLU` activation.
    #[must_use]
    pub fn new() -> Self {
        Self { id: LayerId::new() }
    }
}

impl Default for ReLU {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for ReLU {
    fn forward(&self, input: &Tensor, ctx: &mut ForwardContext<'_>) -> Result<Tensor, ModelError> {
        Ok(functional::relu(input, ctx.tape()))
    }

    fn id(&self) -> LayerId {
        self.id
    }

    fn role(&self) -> LayerRole {
        LayerRole::Activation
    }

    fn type_name(&self) -> &'static str {
        "ReLU"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
