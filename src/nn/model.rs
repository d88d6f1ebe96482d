//! Root of a module tree with its hook registry.

use std::fmt;

use super::error::ModelError;
use super::hooks::{ForwardContext, ForwardHook, HookGuard, HookId, HookRegistry};
use super::module::{collect_modules, find_module_mut, LayerId, Module};
use crate::trace::{ForwardTrace, Tape, Tensor};

/// A module tree that can be traced.
///
/// The model owns the forward-hook registry; every [`Model::forward`] call
/// records a fresh [`Tape`].
///
/// # Example
///
/// ```
/// use aprender_depgraph::nn::{Linear, Model, ReLU, Sequential};
/// use aprender_depgraph::trace::Tensor;
///
/// let model = Model::new(
///     Sequential::new()
///         .add(Linear::new(4, 8))
///         .add(ReLU::new())
///         .add(Linear::new(8, 2)),
/// );
///
/// let trace = model.forward(&Tensor::ones(&[1, 4])).unwrap();
/// assert_eq!(trace.output.shape(), &[1, 2]);
/// assert_eq!(trace.tape.len(), 3);
/// assert_eq!(model.modules().len(), 4);
/// ```
pub struct Model {
    root: Box<dyn Module>,
    hooks: HookRegistry,
}

impl Model {
    /// Wrap `root` as a traceable model.
    #[must_use]
    pub fn new<M: Module>(root: M) -> Self {
        Self::from_boxed(Box::new(root))
    }

    /// Wrap an already boxed root module.
    #[must_use]
    pub fn from_boxed(root: Box<dyn Module>) -> Self {
        Self {
            root,
            hooks: HookRegistry::new(),
        }
    }

    /// Root module.
    #[must_use]
    pub fn root(&self) -> &dyn Module {
        self.root.as_ref()
    }

    /// All modules in declaration order, depth-first, root first.
    ///
    /// Index 1 is the first declared sub-component.
    #[must_use]
    pub fn modules(&self) -> Vec<&dyn Module> {
        let mut out = Vec::new();
        collect_modules(self.root.as_ref(), &mut out);
        out
    }

    /// Find a module by id.
    #[must_use]
    pub fn find(&self, id: LayerId) -> Option<&dyn Module> {
        self.modules().into_iter().find(|m| m.id() == id)
    }

    /// Find a module by id for mutation.
    pub fn find_mut(&mut self, id: LayerId) -> Option<&mut dyn Module> {
        find_module_mut(self.root.as_mut(), id)
    }

    /// Run one forward evaluation and return its output and trace.
    pub fn forward(&self, input: &Tensor) -> Result<ForwardTrace, ModelError> {
        let mut tape = Tape::new();
        let output = {
            let mut ctx = ForwardContext::new(&mut tape, &self.hooks);
            ctx.call(self.root.as_ref(), input)?
        };
        Ok(ForwardTrace { output, tape })
    }

    /// Attach a hook to the layer `target` until it is removed.
    pub fn register_forward_hook(&self, target: LayerId, hook: ForwardHook) -> HookId {
        self.hooks.register(target, hook)
    }

    /// Detach a hook. Returns `false` if it was already gone.
    pub fn remove_hook(&self, id: HookId) -> bool {
        self.hooks.remove(id)
    }

    /// Open a scope whose hooks are detached when the guard drops.
    #[must_use]
    pub fn hook_guard(&self) -> HookGuard<'_> {
        self.hooks.guard()
    }

    /// Number of currently attached hooks.
    #[must_use]
    pub fn num_hooks(&self) -> usize {
        self.hooks.len()
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("root", &self.root.type_name())
            .field("num_modules", &self.modules().len())
            .field("hooks", &self.hooks)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::{Conv2d, Linear, ReLU, Sequential};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn mlp() -> Model {
        Model::new(
            Sequential::new()
                .add(Linear::with_seed(4, 3, Some(1)))
                .add(ReLU::new())
                .add(Sequential::new().add(Linear::with_seed(3, 2, Some(2)))),
        )
    }

    #[test]
    fn test_modules_preorder() {
        let model = mlp();
        let names: Vec<_> = model.modules().iter().map(|m| m.type_name()).collect();
        assert_eq!(
            names,
            vec!["Sequential", "Linear", "ReLU", "Sequential", "Linear"]
        );
    }

    #[test]
    fn test_find_and_find_mut() {
        let mut model = mlp();
        let nested = model.modules()[4].id();

        assert_eq!(model.find(nested).map(Module::type_name), Some("Linear"));
        let layer = model.find_mut(nested).expect("nested linear");
        let linear = layer.as_any_mut().downcast_mut::<Linear>().expect("is Linear");
        linear.retain_out_features(&[0]);

        let y = model.forward(&Tensor::ones(&[1, 4])).expect("forward").output;
        assert_eq!(y.shape(), &[1, 1]);
        assert!(model.find_mut(LayerId::new()).is_none());
    }

    #[test]
    fn test_hooks_see_layer_outputs() {
        let model = mlp();
        let relu = model.modules()[2].id();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let sink = Rc::clone(&seen);
        let id = model.register_forward_hook(
            relu,
            Box::new(move |module: &dyn Module, output: &Tensor| {
                sink.borrow_mut()
                    .push((module.type_name(), output.history().is_some()));
            }),
        );
        model.forward(&Tensor::ones(&[2, 4])).expect("forward");

        assert_eq!(seen.borrow().as_slice(), &[("ReLU", true)]);
        assert!(model.remove_hook(id));
        assert_eq!(model.num_hooks(), 0);
    }

    #[test]
    fn test_forward_error_propagates() {
        let model = Model::new(Sequential::new().add(Conv2d::new(3, 4, 1)));
        let err = model.forward(&Tensor::ones(&[1, 2, 2, 2])).unwrap_err();
        assert!(matches!(err, ModelError::ChannelMismatch { .. }));
    }
}
