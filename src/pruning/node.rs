//! Graph vertices and operation-kind tags.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::structured::PruneOp;
use crate::nn::{LayerId, LayerRole, Module};
use crate::trace::TraceHandle;

/// Semantic kind of a traced operation.
///
/// Assigned once when the node is built and never changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpType {
    /// Convolution layer.
    Conv,
    /// Fully-connected layer.
    Linear,
    /// Batch normalization.
    BatchNorm,
    /// Element-wise activation.
    Activation,
    /// Reshape or any ownerless operation treated as one.
    Flatten,
    /// Ownerless operation kept distinct from reshapes.
    Functional,
}

impl OpType {
    /// Whether nodes of this kind key a coupling chain.
    #[must_use]
    pub fn is_prunable(self) -> bool {
        matches!(self, OpType::Conv | OpType::Linear)
    }

    /// Kind for an operation produced by a layer with the given role.
    ///
    /// Containers never produce operations of their own.
    #[must_use]
    pub fn from_role(role: LayerRole) -> Option<Self> {
        match role {
            LayerRole::Convolution => Some(OpType::Conv),
            LayerRole::FullyConnected => Some(OpType::Linear),
            LayerRole::Normalization => Some(OpType::BatchNorm),
            LayerRole::Activation => Some(OpType::Activation),
            LayerRole::ShapeReinterpretation => Some(OpType::Flatten),
            LayerRole::Container => None,
        }
    }

    /// Lower-case name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            OpType::Conv => "conv",
            OpType::Linear => "linear",
            OpType::BatchNorm => "batch_norm",
            OpType::Activation => "activation",
            OpType::Flatten => "flatten",
            OpType::Functional => "functional",
        }
    }
}

impl fmt::Display for OpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Index of a node in the graph arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(usize);

impl NodeId {
    pub(crate) fn new(index: usize) -> Self {
        NodeId(index)
    }

    /// Position in the arena.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Key of the module-to-node map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKey {
    /// Node produced by a layer.
    Layer(LayerId),
    /// Ownerless node, identified by its trace record.
    Functional(TraceHandle),
}

/// Which side of a layer a prune operation resizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelRole {
    /// Input channels or features.
    InChannels,
    /// Output channels or features.
    OutChannels,
}

impl ChannelRole {
    /// Attribute-style name (`in_channels` / `out_channels`).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelRole::InChannels => "in_channels",
            ChannelRole::OutChannels => "out_channels",
        }
    }
}

impl fmt::Display for ChannelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Non-owning description of the layer that produced a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerRef {
    /// Layer identity, used to look the layer up in the model.
    pub id: LayerId,
    /// Layer type name.
    pub type_name: &'static str,
    /// Structural role.
    pub role: LayerRole,
}

impl LayerRef {
    /// Describe `module`.
    #[must_use]
    pub fn of(module: &dyn Module) -> Self {
        Self {
            id: module.id(),
            type_name: module.type_name(),
            role: module.role(),
        }
    }
}

/// One traced operation in the dependency graph.
#[derive(Debug, Clone)]
pub struct Node {
    layer: Option<LayerRef>,
    op_type: OpType,
    trace_handle: TraceHandle,
    outputs: Vec<NodeId>,
    prune_fn: BTreeMap<ChannelRole, PruneOp>,
}

impl Node {
    pub(crate) fn new(layer: Option<LayerRef>, op_type: OpType, trace_handle: TraceHandle) -> Self {
        Self {
            layer,
            op_type,
            trace_handle,
            outputs: Vec::new(),
            prune_fn: BTreeMap::new(),
        }
    }

    /// Owning layer, absent for ownerless operations.
    #[must_use]
    pub fn layer(&self) -> Option<&LayerRef> {
        self.layer.as_ref()
    }

    /// Operation kind.
    #[must_use]
    pub fn op_type(&self) -> OpType {
        self.op_type
    }

    /// Trace record this node was built from.
    #[must_use]
    pub fn trace_handle(&self) -> TraceHandle {
        self.trace_handle
    }

    /// Forward edges, in the order they were discovered.
    #[must_use]
    pub fn outputs(&self) -> &[NodeId] {
        &self.outputs
    }

    /// Designated successor used to walk chains.
    #[must_use]
    pub fn successor(&self) -> Option<NodeId> {
        self.outputs.first().copied()
    }

    /// Prune operations assigned by dependency resolution.
    #[must_use]
    pub fn prune_fn(&self) -> &BTreeMap<ChannelRole, PruneOp> {
        &self.prune_fn
    }

    /// Prune operation for one side of the layer.
    #[must_use]
    pub fn prune_op(&self, role: ChannelRole) -> Option<PruneOp> {
        self.prune_fn.get(&role).copied()
    }

    /// Type name of the owner, or `<functional>`.
    #[must_use]
    pub fn display_name(&self) -> &'static str {
        self.layer.map_or("<functional>", |l| l.type_name)
    }

    pub(crate) fn push_output(&mut self, to: NodeId) {
        if !self.outputs.contains(&to) {
            self.outputs.push(to);
        }
    }

    pub(crate) fn sort_outputs_by_key<K: Ord>(&mut self, key: impl FnMut(&NodeId) -> K) {
        self.outputs.sort_by_key(key);
    }

    pub(crate) fn set_prune_fn(&mut self, role: ChannelRole, op: PruneOp) {
        self.prune_fn.insert(role, op);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::{Conv2d, ReLU};
    use crate::trace::Tape;

    #[test]
    fn test_prunable_kinds() {
        assert!(OpType::Conv.is_prunable());
        assert!(OpType::Linear.is_prunable());
        for kind in [
            OpType::BatchNorm,
            OpType::Activation,
            OpType::Flatten,
            OpType::Functional,
        ] {
            assert!(!kind.is_prunable(), "{kind} must not key a chain");
        }
    }

    #[test]
    fn test_from_role_covers_every_role() {
        assert_eq!(OpType::from_role(LayerRole::Convolution), Some(OpType::Conv));
        assert_eq!(
            OpType::from_role(LayerRole::FullyConnected),
            Some(OpType::Linear)
        );
        assert_eq!(
            OpType::from_role(LayerRole::Normalization),
            Some(OpType::BatchNorm)
        );
        assert_eq!(
            OpType::from_role(LayerRole::Activation),
            Some(OpType::Activation)
        );
        assert_eq!(
            OpType::from_role(LayerRole::ShapeReinterpretation),
            Some(OpType::Flatten)
        );
        assert_eq!(OpType::from_role(LayerRole::Container), None);
    }

    #[test]
    fn test_push_output_deduplicates() {
        let mut tape = Tape::new();
        let h = tape.record("ReluBackward", vec![]);
        let mut node = Node::new(Some(LayerRef::of(&ReLU::new())), OpType::Activation, h);

        node.push_output(NodeId::new(2));
        node.push_output(NodeId::new(1));
        node.push_output(NodeId::new(2));

        assert_eq!(node.outputs(), &[NodeId::new(2), NodeId::new(1)]);
        assert_eq!(node.successor(), Some(NodeId::new(2)));
    }

    #[test]
    fn test_layer_ref_describes_module() {
        let conv = Conv2d::new(3, 8, 3);
        let r = LayerRef::of(&conv);
        assert_eq!(r.id, conv.id());
        assert_eq!(r.type_name, "Conv2d");
        assert_eq!(r.role, LayerRole::Convolution);
    }

    #[test]
    fn test_functional_display_name() {
        let mut tape = Tape::new();
        let h = tape.record("ViewBackward", vec![]);
        let node = Node::new(None, OpType::Flatten, h);
        assert_eq!(node.display_name(), "<functional>");
        assert!(node.prune_fn().is_empty());
    }

    #[test]
    fn test_channel_role_names() {
        assert_eq!(ChannelRole::InChannels.to_string(), "in_channels");
        assert_eq!(
            serde_json::to_string(&ChannelRole::OutChannels).expect("serialize"),
            "\"out_channels\""
        );
    }
}
