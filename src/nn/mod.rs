//! Neural network layers that record into an explicit trace.
//!
//! # Architecture
//!
//! The nn module is organized around the [`Module`] trait. Every layer
//! reports a [`LayerRole`] tag describing its structural role, records its
//! computation on the [`Tape`](crate::trace::Tape) and exposes channel
//! metadata for structured pruning:
//!
//! - **Layers**: [`Linear`], [`Conv2d`], [`Flatten`]
//! - **Activations**: [`ReLU`]
//! - **Normalization**: [`BatchNorm1d`], [`BatchNorm2d`]
//! - **Containers**: [`Sequential`], [`Residual`]
//! - **Root**: [`Model`], which owns the forward-hook registry
//!
//! # Example
//!
//! ```
//! use aprender_depgraph::nn::{BatchNorm2d, Conv2d, Model, ReLU, Sequential};
//! use aprender_depgraph::trace::Tensor;
//!
//! let model = Model::new(
//!     Sequential::new()
//!         .add(Conv2d::new(3, 16, 3))
//!         .add(BatchNorm2d::new(16))
//!         .add(ReLU::new())
//!         .add(Conv2d::new(16, 32, 3)),
//! );
//!
//! let trace = model.forward(&Tensor::ones(&[1, 3, 8, 8])).unwrap();
//! assert_eq!(trace.output.shape(), &[1, 32, 4, 4]);
//! ```
//!
//! # References
//!
//! - Paszke, A., et al. (2019). `PyTorch`: An imperative style, high-performance
//!   deep learning library. `NeurIPS`.

mod activation;
mod container;
mod conv;
mod error;
pub mod functional;
mod hooks;
pub mod init;
mod linear;
mod model;
mod module;
mod normalization;

pub use activation::ReLU;
pub use container::{Residual, Sequential};
pub use conv::{Conv2d, Flatten};
pub use error::ModelError;
pub use functional as F;
pub use hooks::{ForwardContext, ForwardHook, HookGuard, HookId, HookRegistry};
pub use linear::Linear;
pub use model::Model;
pub use module::{ChannelDims, LayerId, LayerRole, Module};
pub use normalization::{BatchNorm1d, BatchNorm2d};
