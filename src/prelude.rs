//! Convenience re-exports for common usage.
//!
//! # Usage
//!
//! ```
//! use aprender_depgraph::prelude::*;
//! ```

pub use crate::nn::{
    BatchNorm1d, BatchNorm2d, Conv2d, Flatten, LayerId, LayerRole, Linear, Model, Module, ReLU,
    Residual, Sequential,
};
pub use crate::pruning::{
    propagate_channel_pruning, BranchPolicy, DepGraphError, DependencyGraph, GraphConfig, OpType,
    PruneOp,
};
pub use crate::trace::Tensor;
