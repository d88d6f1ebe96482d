//! Structured channel removal on concrete layers.
//!
//! Each mutator removes whole channels (or features) from one side of a
//! layer and leaves the remaining ones in their original order:
//!
//! | Operation            | Layer           | Weight axis | Also sliced                     |
//! |----------------------|-----------------|-------------|---------------------------------|
//! | `prune_conv_out`     | `Conv2d`        | 0           | bias                            |
//! | `prune_conv_in`      | `Conv2d`        | 1           |                                 |
//! | `prune_linear_out`   | `Linear`        | 0           | bias                            |
//! | `prune_linear_in`    | `Linear`        | 1           |                                 |
//! | `prune_batchnorm_in` | `BatchNorm1d/2d`| 0           | bias, running mean and variance |
//!
//! All mutators validate before touching the layer, so a rejected call
//! leaves it unchanged.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::DepGraphError;
use super::node::ChannelRole;
use crate::nn::{BatchNorm1d, BatchNorm2d, Conv2d, Linear, Module};

/// Named structural mutator stored in a node's `prune_fn` slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PruneOp {
    /// Remove input channels of a convolution.
    PruneConvIn,
    /// Remove output channels of a convolution.
    PruneConvOut,
    /// Remove input features of a fully-connected layer.
    PruneLinearIn,
    /// Remove output features of a fully-connected layer.
    PruneLinearOut,
    /// Remove features of a batch normalization.
    PruneBatchNormIn,
}

impl PruneOp {
    /// Mutator name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            PruneOp::PruneConvIn => "prune_conv_in",
            PruneOp::PruneConvOut => "prune_conv_out",
            PruneOp::PruneLinearIn => "prune_linear_in",
            PruneOp::PruneLinearOut => "prune_linear_out",
            PruneOp::PruneBatchNormIn => "prune_batchnorm_in",
        }
    }

    /// Side of the layer this operation resizes.
    #[must_use]
    pub fn role(self) -> ChannelRole {
        match self {
            PruneOp::PruneConvOut | PruneOp::PruneLinearOut => ChannelRole::OutChannels,
            PruneOp::PruneConvIn | PruneOp::PruneLinearIn | PruneOp::PruneBatchNormIn => {
                ChannelRole::InChannels
            }
        }
    }

    /// Whether `layer` is of the kind this operation mutates.
    #[must_use]
    pub fn accepts(self, layer: &dyn Module) -> bool {
        let any = layer.as_any();
        match self {
            PruneOp::PruneConvIn | PruneOp::PruneConvOut => any.is::<Conv2d>(),
            PruneOp::PruneLinearIn | PruneOp::PruneLinearOut => any.is::<Linear>(),
            PruneOp::PruneBatchNormIn => any.is::<BatchNorm1d>() || any.is::<BatchNorm2d>(),
        }
    }

    /// Current size of the dimension this operation resizes on `layer`.
    pub fn dim(self, layer: &dyn Module) -> Result<usize, DepGraphError> {
        let dims = layer
            .channels()
            .filter(|_| self.accepts(layer))
            .ok_or(DepGraphError::NotPrunable {
                op: self.name(),
                layer: layer.type_name(),
            })?;
        Ok(match self.role() {
            ChannelRole::InChannels => dims.in_channels,
            ChannelRole::OutChannels => dims.out_channels,
        })
    }

    /// Check that `indices` could be removed from `layer` without changing it.
    pub fn validate(self, layer: &dyn Module, indices: &[usize]) -> Result<(), DepGraphError> {
        let size = self.dim(layer)?;
        kept_indices(self.name(), size, indices).map(|_| ())
    }

    /// Remove the channels at `indices` from `layer`.
    pub fn apply(self, layer: &mut dyn Module, indices: &[usize]) -> Result<(), DepGraphError> {
        match self {
            PruneOp::PruneConvIn => prune_conv_in(layer, indices),
            PruneOp::PruneConvOut => prune_conv_out(layer, indices),
            PruneOp::PruneLinearIn => prune_linear_in(layer, indices),
            PruneOp::PruneLinearOut => prune_linear_out(layer, indices),
            PruneOp::PruneBatchNormIn => prune_batchnorm_in(layer, indices),
        }
    }
}

impl fmt::Display for PruneOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Ordered complement of `indices` in `0..size`.
///
/// Duplicate indices count once.
pub fn kept_indices(
    op: &'static str,
    size: usize,
    indices: &[usize],
) -> Result<Vec<usize>, DepGraphError> {
    let removed: BTreeSet<usize> = indices.iter().copied().collect();
    if let Some(&index) = removed.iter().next_back().filter(|&&i| i >= size) {
        return Err(DepGraphError::IndexOutOfRange { index, size });
    }
    if removed.len() == size {
        return Err(DepGraphError::WouldRemoveAll { op, size });
    }
    Ok((0..size).filter(|i| !removed.contains(i)).collect())
}

fn not_prunable(op: PruneOp, layer: &dyn Module) -> DepGraphError {
    DepGraphError::NotPrunable {
        op: op.name(),
        layer: layer.type_name(),
    }
}

fn conv_mut(op: PruneOp, layer: &mut dyn Module) -> Result<&mut Conv2d, DepGraphError> {
    let err = not_prunable(op, layer);
    layer.as_any_mut().downcast_mut::<Conv2d>().ok_or(err)
}

fn linear_mut(op: PruneOp, layer: &mut dyn Module) -> Result<&mut Linear, DepGraphError> {
    let err = not_prunable(op, layer);
    layer.as_any_mut().downcast_mut::<Linear>().ok_or(err)
}

/// Remove input channels of a `Conv2d`.
pub fn prune_conv_in(layer: &mut dyn Module, indices: &[usize]) -> Result<(), DepGraphError> {
    let conv = conv_mut(PruneOp::PruneConvIn, layer)?;
    let keep = kept_indices(PruneOp::PruneConvIn.name(), conv.in_channels(), indices)?;
    conv.retain_in_channels(&keep);
    Ok(())
}

/// Remove output channels (filters) of a `Conv2d`.
pub fn prune_conv_out(layer: &mut dyn Module, indices: &[usize]) -> Result<(), DepGraphError> {
    let conv = conv_mut(PruneOp::PruneConvOut, layer)?;
    let keep = kept_indices(PruneOp::PruneConvOut.name(), conv.out_channels(), indices)?;
    conv.retain_out_channels(&keep);
    Ok(())
}

/// Remove input features of a `Linear`.
pub fn prune_linear_in(layer: &mut dyn Module, indices: &[usize]) -> Result<(), DepGraphError> {
    let linear = linear_mut(PruneOp::PruneLinearIn, layer)?;
    let keep = kept_indices(PruneOp::PruneLinearIn.name(), linear.in_features(), indices)?;
    linear.retain_in_features(&keep);
    Ok(())
}

/// Remove output features of a `Linear`.
pub fn prune_linear_out(layer: &mut dyn Module, indices: &[usize]) -> Result<(), DepGraphError> {
    let linear = linear_mut(PruneOp::PruneLinearOut, layer)?;
    let keep = kept_indices(PruneOp::PruneLinearOut.name(), linear.out_features(), indices)?;
    linear.retain_out_features(&keep);
    Ok(())
}

/// Remove features of a `BatchNorm1d` or `BatchNorm2d`.
pub fn prune_batchnorm_in(layer: &mut dyn Module, indices: &[usize]) -> Result<(), DepGraphError> {
    let op = PruneOp::PruneBatchNormIn;
    let err = not_prunable(op, layer);
    let any = layer.as_any_mut();
    if let Some(bn) = any.downcast_mut::<BatchNorm2d>() {
        let keep = kept_indices(op.name(), bn.num_features(), indices)?;
        bn.retain_features(&keep);
        return Ok(());
    }
    if let Some(bn) = any.downcast_mut::<BatchNorm1d>() {
        let keep = kept_indices(op.name(), bn.num_features(), indices)?;
        bn.retain_features(&keep);
        return Ok(());
    }
    Err(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::{Model, ReLU, Sequential};
    use crate::trace::Tensor;

    #[test]
    fn test_kept_indices_is_ordered_complement() {
        let keep = kept_indices("op", 6, &[4, 1, 4]).expect("valid");
        assert_eq!(keep, vec![0, 2, 3, 5]);
    }

    #[test]
    fn test_kept_indices_rejects_out_of_range() {
        let err = kept_indices("op", 3, &[0, 3]).unwrap_err();
        assert!(matches!(
            err,
            DepGraphError::IndexOutOfRange { index: 3, size: 3 }
        ));
    }

    #[test]
    fn test_kept_indices_rejects_removing_everything() {
        let err = kept_indices("prune_linear_out", 2, &[1, 0]).unwrap_err();
        assert!(matches!(err, DepGraphError::WouldRemoveAll { size: 2, .. }));
    }

    #[test]
    fn test_empty_indices_keep_everything() {
        let mut conv = Conv2d::new(3, 4, 1);
        prune_conv_out(&mut conv, &[]).expect("no-op");
        assert_eq!(conv.out_channels(), 4);
    }

    #[test]
    fn test_prune_conv_out_slices_weight_and_bias() {
        let mut conv = Conv2d::new(2, 4, 1);
        let before = conv.weight().clone();
        prune_conv_out(&mut conv, &[1, 2]).expect("prune");

        assert_eq!(conv.out_channels(), 2);
        assert_eq!(conv.weight().shape(), &[2, 2, 1, 1]);
        assert_eq!(conv.weight(), &before.select(0, &[0, 3]));
        assert_eq!(conv.bias().map(Tensor::shape), Some(&[2usize][..]));
    }

    #[test]
    fn test_prune_conv_in_slices_axis_one() {
        let mut conv = Conv2d::new(4, 2, 3);
        prune_conv_in(&mut conv, &[0]).expect("prune");
        assert_eq!(conv.in_channels(), 3);
        assert_eq!(conv.weight().shape(), &[2, 3, 3, 3]);
        assert_eq!(conv.bias().map(Tensor::numel), Some(2));
    }

    #[test]
    fn test_prune_linear_both_sides() {
        let mut linear = Linear::new(5, 3);
        prune_linear_in(&mut linear, &[0, 4]).expect("in");
        prune_linear_out(&mut linear, &[2]).expect("out");

        assert_eq!(linear.in_features(), 3);
        assert_eq!(linear.out_features(), 2);
        assert_eq!(linear.weight().shape(), &[2, 3]);
    }

    #[test]
    fn test_prune_batchnorm_in_both_variants() {
        let mut bn2 = BatchNorm2d::new(4);
        prune_batchnorm_in(&mut bn2, &[3]).expect("2d");
        assert_eq!(bn2.num_features(), 3);
        assert_eq!(bn2.running_mean().shape(), &[3]);

        let mut bn1 = BatchNorm1d::new(4);
        prune_batchnorm_in(&mut bn1, &[0, 1]).expect("1d");
        assert_eq!(bn1.num_features(), 2);
    }

    #[test]
    fn test_wrong_layer_kind_is_not_prunable() {
        let mut relu = ReLU::new();
        let err = PruneOp::PruneConvOut.apply(&mut relu, &[0]).unwrap_err();
        assert!(matches!(
            err,
            DepGraphError::NotPrunable {
                op: "prune_conv_out",
                layer: "ReLU"
            }
        ));

        let mut linear = Linear::new(2, 2);
        assert!(PruneOp::PruneBatchNormIn.apply(&mut linear, &[0]).is_err());
        assert_eq!(linear.in_features(), 2);
    }

    #[test]
    fn test_rejected_call_leaves_layer_unchanged() {
        let mut conv = Conv2d::new(2, 3, 1);
        let before = conv.weight().clone();
        assert!(prune_conv_out(&mut conv, &[0, 7]).is_err());
        assert_eq!(conv.weight(), &before);
        assert_eq!(conv.out_channels(), 3);
    }

    #[test]
    fn test_dim_and_validate() {
        let conv = Conv2d::new(3, 8, 3);
        assert_eq!(PruneOp::PruneConvIn.dim(&conv).expect("conv"), 3);
        assert_eq!(PruneOp::PruneConvOut.dim(&conv).expect("conv"), 8);
        assert!(PruneOp::PruneLinearIn.dim(&conv).is_err());
        assert!(PruneOp::PruneConvOut.validate(&conv, &[7]).is_ok());
        assert!(PruneOp::PruneConvOut.validate(&conv, &[8]).is_err());
    }

    #[test]
    fn test_roles_and_names() {
        assert_eq!(PruneOp::PruneConvOut.role(), ChannelRole::OutChannels);
        assert_eq!(PruneOp::PruneBatchNormIn.role(), ChannelRole::InChannels);
        assert_eq!(PruneOp::PruneLinearIn.to_string(), "prune_linear_in");
    }

    #[test]
    fn test_pruned_pair_still_runs() {
        let mut model = Model::new(
            Sequential::new()
                .add(Linear::with_seed(4, 6, Some(3)))
                .add(ReLU::new())
                .add(Linear::with_seed(6, 2, Some(4))),
        );
        let ids: Vec<_> = model.modules().iter().map(|m| m.id()).collect();

        let first = model.find_mut(ids[1]).expect("first linear");
        PruneOp::PruneLinearOut.apply(first, &[0, 5]).expect("out");
        let last = model.find_mut(ids[3]).expect("last linear");
        PruneOp::PruneLinearIn.apply(last, &[0, 5]).expect("in");

        let trace = model.forward(&Tensor::ones(&[1, 4])).expect("forward");
        assert_eq!(trace.output.shape(), &[1, 2]);
    }
}
