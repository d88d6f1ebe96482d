//! Coupling-chain resolution.
//!
//! Removing output channels of a convolution or fully-connected layer
//! forces every layer its output flows through to shrink as well, up to
//! and including the input side of the next convolution or fully-connected
//! layer. Normalization layers in between shrink along with it; activations
//! and reshapes are carried through unchanged.

use tracing::{debug, warn};

use super::config::BranchPolicy;
use super::dependency::DependencyMap;
use super::error::DepGraphError;
use super::node::{ChannelRole, Node, NodeId, OpType};
use super::structured::PruneOp;

fn out_op(kind: OpType) -> Option<PruneOp> {
    match kind {
        OpType::Conv => Some(PruneOp::PruneConvOut),
        OpType::Linear => Some(PruneOp::PruneLinearOut),
        _ => None,
    }
}

fn in_op(kind: OpType) -> Option<PruneOp> {
    match kind {
        OpType::Conv => Some(PruneOp::PruneConvIn),
        OpType::Linear => Some(PruneOp::PruneLinearIn),
        OpType::BatchNorm => Some(PruneOp::PruneBatchNormIn),
        _ => None,
    }
}

/// Number of distinct nodes feeding each node.
fn fan_in(nodes: &[Node]) -> Vec<usize> {
    let mut counts = vec![0; nodes.len()];
    for node in nodes {
        for &to in node.outputs() {
            if let Some(count) = counts.get_mut(to.index()) {
                *count += 1;
            }
        }
    }
    counts
}

/// Successor to step to from `id`, enforcing the branch policy on the
/// fan-out of `id` and the fan-in of the successor.
fn step(
    nodes: &[Node],
    fan_in: &[usize],
    id: NodeId,
    policy: BranchPolicy,
) -> Result<Option<NodeId>, DepGraphError> {
    let node = nodes
        .get(id.index())
        .ok_or(DepGraphError::UnknownNode(id))?;
    let successors = node.outputs().len();
    if successors > 1 {
        match policy {
            BranchPolicy::Reject => {
                return Err(DepGraphError::UnsupportedBranching {
                    node: id,
                    successors,
                });
            }
            BranchPolicy::FirstSuccessor => {
                warn!(node = %id, successors, "following first successor of a branching node");
            }
        }
    }

    let Some(next) = node.successor() else {
        return Ok(None);
    };
    let predecessors = fan_in.get(next.index()).copied().unwrap_or_default();
    if predecessors > 1 {
        match policy {
            BranchPolicy::Reject => {
                return Err(DepGraphError::UnsupportedMerge {
                    node: next,
                    predecessors,
                });
            }
            BranchPolicy::FirstSuccessor => {
                warn!(node = %next, predecessors, "walking through a merging node");
            }
        }
    }
    Ok(Some(next))
}

/// Build the chain of every prunable node in `order` and assign the
/// `prune_fn` slots along the way.
pub(crate) fn resolve(
    nodes: &mut [Node],
    order: &[NodeId],
    policy: BranchPolicy,
) -> Result<DependencyMap, DepGraphError> {
    let mut dependencies = DependencyMap::new();
    let inputs = fan_in(nodes);

    for &key in order {
        let kind = nodes
            .get(key.index())
            .ok_or(DepGraphError::UnknownNode(key))?
            .op_type();
        let Some(op) = out_op(kind) else {
            continue;
        };
        nodes[key.index()].set_prune_fn(ChannelRole::OutChannels, op);

        let mut chain = Vec::new();
        let mut current = key;
        while let Some(next) = step(nodes, &inputs, current, policy)? {
            let node = nodes
                .get_mut(next.index())
                .ok_or(DepGraphError::UnknownNode(next))?;
            let next_kind = node.op_type();
            if let Some(op) = in_op(next_kind) {
                node.set_prune_fn(ChannelRole::InChannels, op);
            }
            chain.push(next);
            if next_kind.is_prunable() {
                break;
            }
            current = next;
        }

        debug!(key = %key, %kind, chain_len = chain.len(), "resolved coupling chain");
        dependencies.insert(key, chain);
    }

    Ok(dependencies)
}
