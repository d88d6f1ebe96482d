//! Serializable summary of a dependency graph.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::node::{Node, NodeId, OpType};
use super::structured::PruneOp;
use crate::nn::LayerId;

/// One node of a coupling chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEntry {
    /// Node in the graph arena.
    pub node: NodeId,
    /// Operation kind.
    pub op_type: OpType,
    /// Owning layer type, absent for ownerless operations.
    pub layer: Option<String>,
    /// Prune operations assigned to this node.
    pub prune_ops: Vec<PruneOp>,
}

impl ChainEntry {
    pub(crate) fn of(id: NodeId, node: &Node) -> Self {
        Self {
            node: id,
            op_type: node.op_type(),
            layer: node.layer().map(|layer| layer.type_name.to_string()),
            prune_ops: node.prune_fn().values().copied().collect(),
        }
    }
}

/// A prunable layer and the chain it entails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEntry {
    /// The prunable node itself.
    pub key: ChainEntry,
    /// Nodes that must shrink with it, in forward order.
    pub chain: Vec<ChainEntry>,
}

/// Summary of every coupling chain in a graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyReport {
    /// Nodes in the graph.
    pub num_nodes: usize,
    /// Forward edges in the graph.
    pub num_edges: usize,
    /// Layers invoked more than once.
    pub reused_layers: Vec<LayerId>,
    /// One entry per prunable node, in topological order.
    pub entries: Vec<DependencyEntry>,
}

impl DependencyReport {
    /// Number of prunable keys.
    #[must_use]
    pub fn num_keys(&self) -> usize {
        self.entries.len()
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Parse a report written by [`DependencyReport::to_json`].
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

fn label(entry: &ChainEntry) -> String {
    match &entry.layer {
        Some(name) => format!("{name}({})", entry.node),
        None => format!("{}({})", entry.op_type, entry.node),
    }
}

impl fmt::Display for DependencyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} nodes, {} edges, {} prunable",
            self.num_nodes,
            self.num_edges,
            self.num_keys()
        )?;
        for entry in &self.entries {
            let chain: Vec<String> = entry.chain.iter().map(label).collect();
            writeln!(f, "  {} -> [{}]", label(&entry.key), chain.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(node: usize, op_type: OpType, layer: Option<&str>) -> ChainEntry {
        ChainEntry {
            node: NodeId::new(node),
            op_type,
            layer: layer.map(str::to_string),
            prune_ops: Vec::new(),
        }
    }

    fn sample() -> DependencyReport {
        DependencyReport {
            num_nodes: 3,
            num_edges: 2,
            reused_layers: Vec::new(),
            entries: vec![DependencyEntry {
                key: ChainEntry {
                    prune_ops: vec![PruneOp::PruneConvOut],
                    ..entry(0, OpType::Conv, Some("Conv2d"))
                },
                chain: vec![
                    entry(1, OpType::Flatten, None),
                    entry(2, OpType::Linear, Some("Linear")),
                ],
            }],
        }
    }

    #[test]
    fn test_display_lists_chains() {
        let text = sample().to_string();
        assert!(text.starts_with("3 nodes, 2 edges, 1 prunable"));
        assert!(text.contains("Conv2d(node#0) -> [flatten(node#1), Linear(node#2)]"));
    }

    #[test]
    fn test_json_uses_snake_case_names() {
        let json = sample().to_json().expect("serialize");
        assert!(json.contains("\"prune_conv_out\""));
        assert!(json.contains("\"flatten\""));

        let back = DependencyReport::from_json(&json).expect("parse");
        assert_eq!(back.num_keys(), 1);
        assert_eq!(back.entries[0].chain.len(), 2);
    }
}
