//! Dependency-graph error types.
//!
//! Every failure carries enough context to locate the offending layer or
//! trace node without re-running the analysis.

use thiserror::Error;

use super::node::NodeId;
use crate::nn::{LayerId, ModelError};
use crate::trace::TraceHandle;

/// Errors raised while building a dependency graph or applying a pruning
/// decision through it.
#[derive(Debug, Error)]
pub enum DepGraphError {
    /// The traced forward evaluation failed.
    #[error("forward evaluation failed: {0}")]
    Forward(#[from] ModelError),

    /// The model has no sub-component to start ordering from.
    #[error("model has no sub-component to use as entry layer")]
    NoEntryLayer,

    /// The entry layer never produced a traced operation.
    #[error("entry layer {layer} does not appear in the trace")]
    MissingEntry {
        /// First declared sub-component of the model
        layer: LayerId,
    },

    /// A node on a coupling chain has more than one forward consumer.
    #[error("node {node} has {successors} successors; branching topologies are not supported")]
    UnsupportedBranching {
        /// Node with fan-out
        node: NodeId,
        /// Number of forward edges leaving it
        successors: usize,
    },

    /// A node on a coupling chain merges more than one producer.
    #[error("node {node} merges {predecessors} inputs; merging topologies are not supported")]
    UnsupportedMerge {
        /// Node with fan-in
        node: NodeId,
        /// Number of forward edges entering it
        predecessors: usize,
    },

    /// The layer runs more than once per evaluation, so its channels
    /// cannot be pruned for one invocation alone.
    #[error("layer {0} is invoked more than once and cannot be pruned")]
    ReusedLayer(LayerId),

    /// The trace refers to an operation that was never recorded.
    #[error("trace handle {0} has no record on the tape")]
    UnknownTraceHandle(TraceHandle),

    /// A node id does not belong to this graph.
    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    /// The node is not a key of the dependency map.
    #[error("node {0} is not a prunable key")]
    NotAKey(NodeId),

    /// A graph node refers to a layer the model no longer contains.
    #[error("layer {0} not found in model")]
    LayerNotFound(LayerId),

    /// The prune operation does not apply to this layer kind.
    #[error("{op} cannot be applied to {layer}")]
    NotPrunable {
        /// Prune operation name
        op: &'static str,
        /// Layer type name
        layer: &'static str,
    },

    /// A channel index is outside the pruned dimension.
    #[error("channel index {index} out of range for dimension of size {size}")]
    IndexOutOfRange {
        /// Offending index
        index: usize,
        /// Size of the dimension
        size: usize,
    },

    /// The indices cover the whole dimension.
    #[error("{op} would remove all {size} channels")]
    WouldRemoveAll {
        /// Prune operation name
        op: &'static str,
        /// Size of the dimension
        size: usize,
    },

    /// Channels cannot be mapped through a flatten onto the next layer.
    #[error("cannot map {channels} channels onto {features} flattened features")]
    IncompatibleFlatten {
        /// Channels produced before the flatten
        channels: usize,
        /// Input features expected after it
        features: usize,
    },

    /// Invalid graph configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}
