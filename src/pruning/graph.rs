//! Dependency graph for consistent structured pruning.
//!
//! # Problem
//!
//! When output channel `j` of a convolution is pruned, every layer that
//! consumes that channel must drop it too: a following batch norm loses
//! feature `j`, the next convolution loses input channel `j`, and a
//! fully-connected layer behind a flatten loses the whole block of
//! features that channel was flattened into.
//!
//! The declared module tree does not say which layer feeds which, so the
//! graph is recovered from the trace of one actual forward evaluation:
//!
//! 1. hook the tracked layers and run the model once;
//! 2. walk the trace backwards into one node per operation;
//! 3. order every node topologically, the entry layer's descendants first;
//! 4. resolve a coupling chain for every convolution and fully-connected
//!    node, then drop reshape nodes from fully-connected chains.
//!
//! # Example
//!
//! ```
//! use aprender_depgraph::nn::{BatchNorm2d, Conv2d, Model, ReLU, Sequential};
//! use aprender_depgraph::pruning::{DependencyGraph, OpType};
//! use aprender_depgraph::trace::Tensor;
//!
//! let model = Model::new(
//!     Sequential::new()
//!         .add(Conv2d::new(3, 16, 3))
//!         .add(BatchNorm2d::new(16))
//!         .add(ReLU::new())
//!         .add(Conv2d::new(16, 32, 3)),
//! );
//! let graph = DependencyGraph::build(&model, &Tensor::ones(&[1, 3, 8, 8])).unwrap();
//!
//! let conv1 = graph.node_for_layer(model.modules()[1].id()).unwrap();
//! let kinds: Vec<OpType> = graph
//!     .chain(conv1)
//!     .unwrap()
//!     .iter()
//!     .map(|&id| graph.node(id).unwrap().op_type())
//!     .collect();
//! assert_eq!(kinds, [OpType::BatchNorm, OpType::Activation, OpType::Conv]);
//! ```
//!
//! # References
//!
//! - Fang, G., et al. (2023). `DepGraph`: Towards any structural pruning.
//!   CVPR.

use std::collections::HashMap;

use tracing::info;

use super::builder::GraphBuilder;
use super::cleaner::clean;
use super::config::GraphConfig;
use super::dependency::DependencyMap;
use super::error::DepGraphError;
use super::node::{Node, NodeId, NodeKey};
use super::order::order_from_entry;
use super::report::{ChainEntry, DependencyEntry, DependencyReport};
use super::resolver::resolve;
use crate::nn::{LayerId, Model};
use crate::trace::Tensor;

/// Traced dependency graph of one model for one input.
///
/// Built once and never updated; rebuild after changing the model.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    nodes: Vec<Node>,
    module_to_node: HashMap<NodeKey, NodeId>,
    order: Vec<NodeId>,
    dependencies: DependencyMap,
    reused_layers: Vec<LayerId>,
    config: GraphConfig,
}

impl DependencyGraph {
    /// Build the graph with the default configuration.
    pub fn build(model: &Model, input: &Tensor) -> Result<Self, DepGraphError> {
        Self::build_with_config(model, input, GraphConfig::default())
    }

    /// Build the graph with `config`.
    pub fn build_with_config(
        model: &Model,
        input: &Tensor,
        config: GraphConfig,
    ) -> Result<Self, DepGraphError> {
        config.validate()?;

        let traced = GraphBuilder::new(&config).build(model, input)?;
        let mut nodes = traced.nodes;
        let order = order_from_entry(model, &nodes, &traced.module_to_node)?;
        let mut dependencies = resolve(&mut nodes, &order, config.branch_policy)?;
        clean(&nodes, &mut dependencies);

        info!(
            ordered = order.len(),
            prunable = dependencies.len(),
            reused = traced.reused_layers.len(),
            "resolved dependencies"
        );
        Ok(Self {
            nodes,
            module_to_node: traced.module_to_node,
            order,
            dependencies,
            reused_layers: traced.reused_layers,
            config,
        })
    }

    /// All nodes, indexed by [`NodeId::index`].
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Node by id.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    /// Number of nodes.
    #[must_use]
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Number of forward edges.
    #[must_use]
    pub fn num_edges(&self) -> usize {
        self.nodes.iter().map(|node| node.outputs().len()).sum()
    }

    /// Check if nothing was traced.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Map from layer (or ownerless operation) to its node.
    #[must_use]
    pub fn module_to_node(&self) -> &HashMap<NodeKey, NodeId> {
        &self.module_to_node
    }

    /// Node of the earliest invocation of `layer`.
    #[must_use]
    pub fn node_for_layer(&self, layer: LayerId) -> Option<NodeId> {
        self.module_to_node.get(&NodeKey::Layer(layer)).copied()
    }

    /// Every node in topological order, inputs first.
    #[must_use]
    pub fn ordered(&self) -> &[NodeId] {
        &self.order
    }

    /// Coupling chains of every prunable node.
    #[must_use]
    pub fn dependencies(&self) -> &DependencyMap {
        &self.dependencies
    }

    /// Coupling chain of `key`, if it is prunable.
    #[must_use]
    pub fn chain(&self, key: NodeId) -> Option<&[NodeId]> {
        self.dependencies.get(key)
    }

    /// Prunable nodes in topological order.
    pub fn prunable(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.dependencies.keys()
    }

    /// Layers invoked more than once during the traced evaluation.
    #[must_use]
    pub fn reused_layers(&self) -> &[LayerId] {
        &self.reused_layers
    }

    /// Configuration the graph was built with.
    #[must_use]
    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Serializable summary of every chain.
    #[must_use]
    pub fn report(&self) -> DependencyReport {
        let entry = |id: NodeId| self.node(id).map(|node| ChainEntry::of(id, node));
        let entries = self
            .dependencies
            .iter()
            .filter_map(|(key, chain)| {
                Some(DependencyEntry {
                    key: entry(key)?,
                    chain: chain.iter().filter_map(|&id| entry(id)).collect(),
                })
            })
            .collect();

        DependencyReport {
            num_nodes: self.num_nodes(),
            num_edges: self.num_edges(),
            reused_layers: self.reused_layers.clone(),
            entries,
        }
    }
}

#[cfg(test)]
#[path = "graph_tests.rs"]
mod tests;
