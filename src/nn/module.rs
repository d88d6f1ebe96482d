//! The [`Module`] trait and layer identity.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use super::error::ModelError;
use super::hooks::ForwardContext;
use crate::trace::Tensor;

/// Unique identifier of a layer instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LayerId(u64);

impl LayerId {
    /// Generate a new unique layer ID.
    #[must_use]
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        LayerId(COUNTER.fetch_add(1, Ordering::SeqCst))
    }
}

impl Default for LayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "layer#{}", self.0)
    }
}

/// Structural role of a layer, supplied by the layer itself.
///
/// Dependency analysis dispatches on this tag instead of on concrete types,
/// so a new layer kind only has to report its role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerRole {
    /// Convolution: prunable on input and output channels.
    Convolution,
    /// Fully-connected: prunable on input and output features.
    FullyConnected,
    /// Per-channel normalization: follows its producer's channels.
    Normalization,
    /// Element-wise activation.
    Activation,
    /// Reshape/flatten: changes layout, not channel semantics.
    ShapeReinterpretation,
    /// Holds other modules and has no computation of its own.
    Container,
}

/// Input/output channel counts of a parameter-bearing layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelDims {
    /// Input channels (or features).
    pub in_channels: usize,
    /// Output channels (or features).
    pub out_channels: usize,
}

/// Neural network layer or container.
///
/// `forward` receives a [`ForwardContext`] through which it records traced
/// operations and invokes child modules (so that their hooks fire).
pub trait Module: Any {
    /// Run the layer on `input`.
    fn forward(&self, input: &Tensor, ctx: &mut ForwardContext<'_>) -> Result<Tensor, ModelError>;

    /// Identity of this instance.
    fn id(&self) -> LayerId;

    /// Structural role used for classification.
    fn role(&self) -> LayerRole;

    /// Type name for diagnostics (e.g. `Conv2d`).
    fn type_name(&self) -> &'static str;

    /// Direct sub-modules in declaration order.
    fn children(&self) -> Vec<&dyn Module> {
        Vec::new()
    }

    /// Mutable direct sub-modules in declaration order.
    fn children_mut(&mut self) -> Vec<&mut dyn Module> {
        Vec::new()
    }

    /// Channel metadata, for layers that own channel-indexed parameters.
    fn channels(&self) -> Option<ChannelDims> {
        None
    }

    /// Upcast for downcasting to a concrete layer.
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for downcasting to a concrete layer.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Depth-first pre-order listing of `module` and all its descendants.
pub(crate) fn collect_modules<'a>(module: &'a dyn Module, out: &mut Vec<&'a dyn Module>) {
    out.push(module);
    for child in module.children() {
        collect_modules(child, out);
    }
}

/// Find a module by id anywhere below (and including) `module`.
pub(crate) fn find_module_mut(module: &mut dyn Module, id: LayerId) -> Option<&mut dyn Module> {
    if module.id() == id {
        return Some(module);
    }
    for child in module.children_mut() {
        if let Some(found) = find_module_mut(child, id) {
            return Some(found);
        }
    }
    None
}
