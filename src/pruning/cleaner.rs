//! Removal of reshape nodes from fully-connected chains.

use super::dependency::DependencyMap;
use super::node::{Node, NodeId, OpType};
use crate::nn::LayerRole;

/// Drop Flatten nodes from every chain keyed by a fully-connected layer.
///
/// Chains keyed by convolutions keep their Flatten nodes.
pub(crate) fn clean(nodes: &[Node], dependencies: &mut DependencyMap) {
    let is_flatten = |id: &NodeId| {
        nodes
            .get(id.index())
            .is_some_and(|node| node.op_type() == OpType::Flatten)
    };

    for (key, chain) in dependencies.chains_mut() {
        let fully_connected = nodes
            .get(key.index())
            .and_then(Node::layer)
            .is_some_and(|layer| layer.role == LayerRole::FullyConnected);
        if fully_connected {
            chain.retain(|id| !is_flatten(id));
        }
    }
}
