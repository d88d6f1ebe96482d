//! Aprender-depgraph: trace-based layer dependency analysis for structured
//! pruning.
//!
//! Removing output channels from one convolution or fully-connected layer
//! forces the layers that consume those channels to shrink in lock-step.
//! This crate recovers which layers those are from an actual forward
//! evaluation of the model, then applies a pruning decision across all of
//! them.
//!
//! # Quick Start
//!
//! ```
//! use aprender_depgraph::prelude::*;
//!
//! let model = Model::new(
//!     Sequential::new()
//!         .add(Conv2d::new(3, 16, 3))
//!         .add(BatchNorm2d::new(16))
//!         .add(ReLU::new())
//!         .add(Conv2d::new(16, 32, 3)),
//! );
//!
//! let graph = DependencyGraph::build(&model, &Tensor::ones(&[1, 3, 8, 8])).unwrap();
//! assert_eq!(graph.dependencies().len(), 2);
//!
//! let report = graph.report();
//! assert_eq!(report.entries[0].chain.len(), 3);
//! ```
//!
//! # Modules
//!
//! - [`trace`]: Explicit computation trace and the tensor type that refers to it
//! - [`nn`]: Layers, containers and the traceable [`nn::Model`] root
//! - [`pruning`]: Dependency graph, coupling chains and structured mutators

pub mod nn;
pub mod prelude;
pub mod pruning;
pub mod trace;
