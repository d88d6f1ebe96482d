//! Forward hooks and the per-pass evaluation context.
//!
//! A hook is attached to one layer and observes every output that layer
//! produces. Hooks live in a [`HookRegistry`] owned by the model; a
//! [`HookGuard`] detaches the hooks it attached when it goes out of scope,
//! including when a forward pass returns early with an error.

use std::cell::{Cell, RefCell};
use std::fmt;

use super::error::ModelError;
use super::module::{LayerId, Module};
use crate::trace::{Tape, Tensor};

/// Callback invoked after a hooked layer produced an output.
pub type ForwardHook = Box<dyn Fn(&dyn Module, &Tensor)>;

/// Identifier returned when a hook is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(u64);

struct HookEntry {
    id: HookId,
    target: LayerId,
    hook: ForwardHook,
}

/// Registry of forward hooks keyed by target layer.
///
/// Hooks must not register or remove hooks while being fired.
#[derive(Default)]
pub struct HookRegistry {
    next_id: Cell<u64>,
    entries: RefCell<Vec<HookEntry>>,
}

impl HookRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `hook` to the layer identified by `target`.
    pub fn register(&self, target: LayerId, hook: ForwardHook) -> HookId {
        let id = HookId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.entries.borrow_mut().push(HookEntry { id, target, hook });
        id
    }

    /// Detach a hook. Returns `false` if it was already gone.
    pub fn remove(&self, id: HookId) -> bool {
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|e| e.id != id);
        entries.len() != before
    }

    /// Number of attached hooks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Check if no hook is attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Start a scope whose hooks are detached when the guard drops.
    #[must_use]
    pub fn guard(&self) -> HookGuard<'_> {
        HookGuard {
            registry: self,
            ids: Vec::new(),
        }
    }

    fn fire(&self, module: &dyn Module, output: &Tensor) {
        let target = module.id();
        for entry in self.entries.borrow().iter().filter(|e| e.target == target) {
            (entry.hook)(module, output);
        }
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRegistry")
            .field("num_hooks", &self.len())
            .finish()
    }
}

/// Scoped set of hooks, detached on drop.
#[must_use = "hooks are detached as soon as the guard is dropped"]
pub struct HookGuard<'r> {
    registry: &'r HookRegistry,
    ids: Vec<HookId>,
}

impl HookGuard<'_> {
    /// Attach a hook for the lifetime of this guard.
    pub fn attach(&mut self, target: LayerId, hook: ForwardHook) -> HookId {
        let id = self.registry.register(target, hook);
        self.ids.push(id);
        id
    }

    /// Number of hooks held by this guard.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Check if the guard holds no hooks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl Drop for HookGuard<'_> {
    fn drop(&mut self) {
        for id in self.ids.drain(..) {
            self.registry.remove(id);
        }
    }
}

impl fmt::Debug for HookGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookGuard")
            .field("num_hooks", &self.ids.len())
            .finish()
    }
}

/// State threaded through one forward evaluation.
pub struct ForwardContext<'a> {
    tape: &'a mut Tape,
    hooks: &'a HookRegistry,
}

impl<'a> ForwardContext<'a> {
    /// Create a context recording into `tape` and firing `hooks`.
    pub fn new(tape: &'a mut Tape, hooks: &'a HookRegistry) -> Self {
        Self { tape, hooks }
    }

    /// Invoke `module` on `input`, then fire the hooks attached to it.
    ///
    /// Containers must call children through here rather than calling
    /// `forward` directly, otherwise the children's hooks never fire.
    pub fn call(&mut self, module: &dyn Module, input: &Tensor) -> Result<Tensor, ModelError> {
        let output = module.forward(input, self)?;
        self.hooks.fire(module, &output);
        Ok(output)
    }

    /// Tape that operations record into.
    pub fn tape(&mut self) -> &mut Tape {
        &mut *self.tape
    }
}

impl fmt::Debug for ForwardContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForwardContext")
            .field("recorded", &self.tape.len())
            .field("hooks", &self.hooks)
            .finish()
    }
}
