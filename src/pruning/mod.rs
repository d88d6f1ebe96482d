//! Dependency analysis for structured channel pruning.
//!
//! Answers one question for a trained model: when output channels of one
//! convolution or fully-connected layer are removed, which other layers
//! have to shrink with it? The answer is derived from a traced forward
//! evaluation, not from the declared module tree.
//!
//! # Example
//!
//! ```
//! use aprender_depgraph::nn::{Conv2d, Flatten, Linear, Model, Sequential};
//! use aprender_depgraph::pruning::{propagate_channel_pruning, DependencyGraph};
//! use aprender_depgraph::trace::Tensor;
//!
//! let mut model = Model::new(
//!     Sequential::new()
//!         .add(Conv2d::new(3, 8, 3))
//!         .add(Flatten::new())
//!         .add(Linear::new(8 * 2 * 2, 10)),
//! );
//! let input = Tensor::ones(&[1, 3, 4, 4]);
//!
//! let graph = DependencyGraph::build(&model, &input).unwrap();
//! let conv = graph.node_for_layer(model.modules()[1].id()).unwrap();
//! let plan = propagate_channel_pruning(&mut model, &graph, conv, &[0, 5]).unwrap();
//!
//! assert_eq!(plan.changes[1].after, 6 * 2 * 2);
//! assert_eq!(model.forward(&input).unwrap().output.shape(), &[1, 10]);
//! ```
//!
//! Importance scoring, i.e. choosing which channels to remove, is left to
//! the caller.
//!
//! # References
//! - Li, H., et al. (2017). Pruning filters for efficient `ConvNets`. ICLR.
//! - Fang, G., et al. (2023). `DepGraph`: Towards any structural pruning. CVPR.

mod builder;
mod cleaner;
mod config;
mod dependency;
mod error;
mod graph;
mod node;
mod order;
mod propagate;
mod report;
mod resolver;
mod structured;

pub use builder::classify;
pub use config::{BranchPolicy, GraphConfig, OwnerlessFallback};
pub use dependency::DependencyMap;
pub use error::DepGraphError;
pub use graph::DependencyGraph;
pub use node::{ChannelRole, LayerRef, Node, NodeId, NodeKey, OpType};
pub use order::{topological_order, topological_order_all};
pub use propagate::{propagate_channel_pruning, LayerChange, PruningPlan};
pub use report::{ChainEntry, DependencyEntry, DependencyReport};
pub use structured::{
    kept_indices, prune_batchnorm_in, prune_conv_in, prune_conv_out, prune_linear_in,
    prune_linear_out, PruneOp,
};
