//! Applying one pruning decision across a coupling chain.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::error::DepGraphError;
use super::graph::DependencyGraph;
use super::node::{ChannelRole, NodeId, OpType};
use super::structured::PruneOp;
use crate::nn::{LayerId, Model};

/// One layer resized by a propagated pruning decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerChange {
    /// Mutated layer.
    pub layer: LayerId,
    /// Layer type name.
    pub type_name: String,
    /// Operation applied.
    pub op: PruneOp,
    /// Indices removed, ascending.
    pub removed: Vec<usize>,
    /// Size of the resized dimension before.
    pub before: usize,
    /// Size of the resized dimension after.
    pub after: usize,
}

/// Record of every layer changed by [`propagate_channel_pruning`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruningPlan {
    /// Prunable node the decision was made on.
    pub key: NodeId,
    /// Changes in application order: the key first, then its chain.
    pub changes: Vec<LayerChange>,
}

impl PruningPlan {
    /// Number of layers changed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Check if nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Change applied to `layer` by `op`, if any.
    #[must_use]
    pub fn change(&self, layer: LayerId, op: PruneOp) -> Option<&LayerChange> {
        self.changes
            .iter()
            .find(|change| change.layer == layer && change.op == op)
    }
}

struct Step {
    layer: LayerId,
    op: PruneOp,
    indices: Vec<usize>,
}

/// Feature indices covered by `channels` once each channel is flattened
/// into `spatial` consecutive features.
fn expand_flattened(channels: &[usize], spatial: usize) -> Vec<usize> {
    channels
        .iter()
        .flat_map(|&c| c * spatial..(c + 1) * spatial)
        .collect()
}

/// Remove output channels `indices` from the layer of `key` and the matching
/// input channels from every layer on its chain.
///
/// Every step is validated against the current model before any layer is
/// changed, so on error the model is left untouched. After a flatten the
/// channel indices are expanded onto the contiguous feature blocks they
/// were flattened into. The graph describes the model as it was traced;
/// rebuild it before propagating another decision.
///
/// # Errors
///
/// - [`DepGraphError::UnknownNode`] / [`DepGraphError::NotAKey`] for a bad key
/// - [`DepGraphError::ReusedLayer`] if the key or a chain layer runs more
///   than once per evaluation
/// - [`DepGraphError::LayerNotFound`] if the model no longer holds a layer
/// - [`DepGraphError::IncompatibleFlatten`] if channels cannot be mapped onto
///   the features of a layer behind a flatten
/// - the mutator errors of [`PruneOp::apply`]
pub fn propagate_channel_pruning(
    model: &mut Model,
    graph: &DependencyGraph,
    key: NodeId,
    indices: &[usize],
) -> Result<PruningPlan, DepGraphError> {
    let steps = plan_steps(model, graph, key, indices)?;

    let mut changes = Vec::with_capacity(steps.len());
    for step in steps {
        let layer = model
            .find_mut(step.layer)
            .ok_or(DepGraphError::LayerNotFound(step.layer))?;
        let before = step.op.dim(layer)?;
        step.op.apply(layer, &step.indices)?;
        let after = step.op.dim(layer)?;
        debug!(layer = %step.layer, op = %step.op, before, after, "pruned layer");

        changes.push(LayerChange {
            layer: step.layer,
            type_name: layer.type_name().to_string(),
            op: step.op,
            removed: step.indices,
            before,
            after,
        });
    }

    info!(key = %key, layers = changes.len(), "propagated channel pruning");
    Ok(PruningPlan { key, changes })
}

fn plan_steps(
    model: &Model,
    graph: &DependencyGraph,
    key: NodeId,
    indices: &[usize],
) -> Result<Vec<Step>, DepGraphError> {
    let key_node = graph.node(key).ok_or(DepGraphError::UnknownNode(key))?;
    let chain = graph.chain(key).ok_or(DepGraphError::NotAKey(key))?;
    let (owner, op) = key_node
        .layer()
        .zip(key_node.prune_op(ChannelRole::OutChannels))
        .ok_or(DepGraphError::NotAKey(key))?;
    let reused = graph.reused_layers();
    if reused.contains(&owner.id) {
        return Err(DepGraphError::ReusedLayer(owner.id));
    }

    let removed: Vec<usize> = indices.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
    let layer = model
        .find(owner.id)
        .ok_or(DepGraphError::LayerNotFound(owner.id))?;
    op.validate(layer, &removed)?;

    let mut width = op.dim(layer)?;
    let mut steps = vec![Step {
        layer: owner.id,
        op,
        indices: removed.clone(),
    }];
    let mut flattened = false;

    for &id in chain {
        let node = graph.node(id).ok_or(DepGraphError::UnknownNode(id))?;
        let Some(op) = node.prune_op(ChannelRole::InChannels) else {
            flattened |= node.op_type() == OpType::Flatten;
            continue;
        };
        let owner = node.layer().ok_or(DepGraphError::UnknownNode(id))?;
        if reused.contains(&owner.id) {
            return Err(DepGraphError::ReusedLayer(owner.id));
        }
        let layer = model
            .find(owner.id)
            .ok_or(DepGraphError::LayerNotFound(owner.id))?;

        let dim = op.dim(layer)?;
        let mapped = if dim == width {
            removed.clone()
        } else if flattened && width > 0 && dim % width == 0 {
            expand_flattened(&removed, dim / width)
        } else {
            return Err(DepGraphError::IncompatibleFlatten {
                channels: width,
                features: dim,
            });
        };
        op.validate(layer, &mapped)?;

        if !steps.iter().any(|s| s.layer == owner.id && s.op == op) {
            steps.push(Step {
                layer: owner.id,
                op,
                indices: mapped,
            });
        }
        width = dim;
    }

    Ok(steps)
}
