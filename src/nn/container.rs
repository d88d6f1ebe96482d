//! Container modules for composing neural networks.
//!
//! Containers have no computation of their own; they invoke their children
//! through [`ForwardContext::call`] so that hooks attached to the children
//! fire.

use std::any::Any;

use super::error::ModelError;
use super::functional;
use super::hooks::ForwardContext;
use super::module::{LayerId, LayerRole, Module};
use crate::trace::Tensor;

/// Sequential container for chaining modules.
///
/// Modules are executed in order, with each module's output
/// becoming the next module's input.
///
/// # Example
///
/// ```
/// use aprender_depgraph::nn::{Conv2d, Model, ReLU, Sequential};
/// use aprender_depgraph::trace::Tensor;
///
/// let model = Model::new(
///     Sequential::new()
///         .add(Conv2d::new(3, 8, 3))
///         .add(ReLU::new()),
/// );
/// let y = model.forward(&Tensor::ones(&[1, 3, 5, 5])).unwrap().output;
/// assert_eq!(y.shape(), &[1, 8, 3, 3]);
/// ```
pub struct Sequential {
    modules: Vec<Box<dyn Module>>,
    id: LayerId,
}

impl Sequential {
    /// Create an empty Sequential container.
    #[must_use]
    pub fn new() -> Self {
        Self {
            modules: Vec::new(),
            id: LayerId::new(),
        }
    }

    /// Add a module to the sequence.
    ///
    /// Returns self for method chaining.
    #[allow(clippy::should_implement_trait)]
    #[must_use]
    pub fn add<M: Module>(mut self, module: M) -> Self {
        self.modules.push(Box::new(module));
        self
    }

    /// Add a module by boxed trait object.
    #[must_use]
    pub fn add_boxed(mut self, module: Box<dyn Module>) -> Self {
        self.modules.push(module);
        self
    }

    /// Get a module by index.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&dyn Module> {
        self.modules.get(index).map(AsRef::as_ref)
    }

    /// Get the number of modules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Check if the container is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl Default for Sequential {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for Sequential {
    fn forward(&self, input: &Tensor, ctx: &mut ForwardContext<'_>) -> Result<Tensor, ModelError> {
        self.modules
            .iter()
            .try_fold(input.clone(), |x, module| ctx.call(module.as_ref(), &x))
    }

    fn id(&self) -> LayerId {
        self.id
    }

    fn role(&self) -> LayerRole {
        LayerRole::Container
    }

    fn type_name(&self) -> &'static str {
        "Sequential"
    }

    fn children(&self) -> Vec<&dyn Module> {
        self.modules.iter().map(AsRef::as_ref).collect()
    }

    fn children_mut(&mut self) -> Vec<&mut dyn Module> {
        self.modules.iter_mut().map(|m| m.as_mut()).collect()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl std::fmt::Debug for Sequential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sequential")
            .field("num_modules", &self.modules.len())
            .finish()
    }
}

/// Residual block: `y = body(x) + x`.
///
/// The block input is consumed twice (by the body and by the addition),
/// which makes it the canonical fan-out topology.
#[derive(Debug)]
pub struct Residual {
    body: Sequential,
    id: LayerId,
}

impl Residual {
    /// Wrap `body` with an identity shortcut.
    #[must_use]
    pub fn new(body: Sequential) -> Self {
        Self {
            body,
            id: LayerId::new(),
        }
    }
}

impl Module for Residual {
    fn forward(&self, input: &Tensor, ctx: &mut ForwardContext<'_>) -> Result<Tensor, ModelError> {
        let branch = ctx.call(&self.body, input)?;
        functional::add(&branch, input, ctx.tape())
    }

    fn id(&self) -> LayerId {
        self.id
    }

    fn role(&self) -> LayerRole {
        LayerRole::Container
    }

    fn type_name(&self) -> &'static str {
        "Residual"
    }

    fn children(&self) -> Vec<&dyn Module> {
        vec![&self.body as &dyn Module]
    }

    fn children_mut(&mut self) -> Vec<&mut dyn Module> {
        vec![&mut self.body as &mut dyn Module]
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
