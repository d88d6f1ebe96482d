//! Topological ordering of the node graph.

use std::collections::HashMap;

use tracing::debug;

use super::error::DepGraphError;
use super::node::{Node, NodeId, NodeKey};
use crate::nn::Model;

/// Depth-first postorder over forward edges from `entry`, reversed.
///
/// Only nodes reachable from `entry` are returned. For every edge `a -> b`
/// between returned nodes, `a` comes before `b`.
#[must_use]
pub fn topological_order(nodes: &[Node], entry: NodeId) -> Vec<NodeId> {
    let mut visited = vec![false; nodes.len()];
    let mut postorder = Vec::with_capacity(nodes.len());
    if entry.index() < nodes.len() {
        postorder_from(nodes, entry, &mut visited, &mut postorder);
    }
    postorder.reverse();
    postorder
}

/// Every node of `nodes` in topological order, `entry`'s descendants first.
///
/// Roots other than `entry` (nodes without incoming edges, such as the
/// second branch of a model that forks at its raw input) are traversed
/// before `entry`, so that after reversal the entry leads.
#[must_use]
pub fn topological_order_all(nodes: &[Node], entry: NodeId) -> Vec<NodeId> {
    let mut has_input = vec![false; nodes.len()];
    for node in nodes {
        for &to in node.outputs() {
            has_input[to.index()] = true;
        }
    }

    let mut visited = vec![false; nodes.len()];
    let mut postorder = Vec::with_capacity(nodes.len());
    for index in (0..nodes.len()).filter(|&i| !has_input[i]) {
        let root = NodeId::new(index);
        if root != entry && !visited[index] {
            debug!(root = %root, "ordering from a root other than the entry");
            postorder_from(nodes, root, &mut visited, &mut postorder);
        }
    }
    if entry.index() < nodes.len() && !visited[entry.index()] {
        postorder_from(nodes, entry, &mut visited, &mut postorder);
    }

    postorder.reverse();
    postorder
}

fn postorder_from(nodes: &[Node], start: NodeId, visited: &mut [bool], postorder: &mut Vec<NodeId>) {
    let mut stack: Vec<(NodeId, usize)> = vec![(start, 0)];
    visited[start.index()] = true;

    while let Some(frame) = stack.last_mut() {
        let (id, next) = *frame;
        match nodes[id.index()].outputs().get(next) {
            Some(&child) => {
                frame.1 += 1;
                if !visited[child.index()] {
                    visited[child.index()] = true;
                    stack.push((child, 0));
                }
            }
            None => {
                postorder.push(id);
                stack.pop();
            }
        }
    }
}

/// Order every node of the graph, starting from the node of the model's
/// first declared sub-component.
pub(crate) fn order_from_entry(
    model: &Model,
    nodes: &[Node],
    module_to_node: &HashMap<NodeKey, NodeId>,
) -> Result<Vec<NodeId>, DepGraphError> {
    let entry_layer = model
        .modules()
        .get(1)
        .map(|module| module.id())
        .ok_or(DepGraphError::NoEntryLayer)?;

    if nodes.is_empty() {
        return Ok(Vec::new());
    }
    let entry = module_to_node
        .get(&NodeKey::Layer(entry_layer))
        .copied()
        .ok_or(DepGraphError::MissingEntry { layer: entry_layer })?;

    Ok(topological_order_all(nodes, entry))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pruning::node::OpType;
    use crate::trace::Tape;

    /// Nodes wired by `edges`, all of kind Activation.
    fn graph(n: usize, edges: &[(usize, usize)]) -> Vec<Node> {
        let mut tape = Tape::new();
        let mut nodes: Vec<Node> = (0..n)
            .map(|_| Node::new(None, OpType::Activation, tape.record("Op", vec![])))
            .collect();
        for &(from, to) in edges {
            nodes[from].push_output(NodeId::new(to));
        }
        nodes
    }

    fn position(order: &[NodeId], i: usize) -> usize {
        order
            .iter()
            .position(|id| id.index() == i)
            .expect("node is ordered")
    }

    #[test]
    fn test_chain_order() {
        let nodes = graph(4, &[(2, 0), (0, 3), (3, 1)]);
        let order = topological_order(&nodes, NodeId::new(2));
        let indices: Vec<_> = order.iter().map(|id| id.index()).collect();
        assert_eq!(indices, vec![2, 0, 3, 1]);
    }

    #[test]
    fn test_diamond_respects_edges() {
        let edges = [(0, 1), (0, 2), (1, 3), (2, 3)];
        let nodes = graph(4, &edges);
        let order = topological_order(&nodes, NodeId::new(0));

        assert_eq!(order.len(), 4);
        for (a, b) in edges {
            assert!(position(&order, a) < position(&order, b), "{a} before {b}");
        }
    }

    #[test]
    fn test_unreachable_nodes_are_left_out() {
        let nodes = graph(3, &[(1, 2)]);
        let order = topological_order(&nodes, NodeId::new(1));
        assert_eq!(order, vec![NodeId::new(1), NodeId::new(2)]);
    }

    #[test]
    fn test_all_roots_are_ordered_entry_first() {
        // 0 and 1 both feed 2; 3 is fed by 2.
        let edges = [(0, 2), (1, 2), (2, 3)];
        let nodes = graph(4, &edges);
        let order = topological_order_all(&nodes, NodeId::new(1));

        assert_eq!(order.len(), 4);
        assert_eq!(order[0], NodeId::new(1));
        for (a, b) in edges {
            assert!(position(&order, a) < position(&order, b), "{a} before {b}");
        }
    }

    #[test]
    fn test_all_roots_matches_single_root_on_chain() {
        let nodes = graph(4, &[(2, 0), (0, 3), (3, 1)]);
        assert_eq!(
            topological_order_all(&nodes, NodeId::new(2)),
            topological_order(&nodes, NodeId::new(2))
        );
    }

    #[test]
    fn test_entry_out_of_range() {
        let nodes = graph(1, &[]);
        assert!(topological_order(&nodes, NodeId::new(5)).is_empty());
    }
}
