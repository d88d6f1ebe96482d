//! Explicit computation trace for forward evaluation.
//!
//! Every differentiable operation executed during a forward pass appends a
//! [`TraceRecord`] to the [`Tape`]. The record names the operation and lists
//! its predecessors in input order: either another recorded operation or a
//! learnable-parameter accumulation point. Tensors produced by a recorded
//! operation carry its [`TraceHandle`] as their computation history.
//!
//! # Architecture
//!
//! The trace is define-by-run and framework-agnostic:
//! - Operations are recorded in execution order during the forward pass
//! - Tensors without history (raw inputs, constants) contribute no predecessor
//! - Parameters contribute a [`Predecessor::Parameter`] leaf, never a record
//!
//! Because a record can only reference handles that already exist when it is
//! appended, a tape is acyclic by construction.
//!
//! # Example
//!
//! ```
//! use aprender_depgraph::trace::{Predecessor, Tape, Tensor};
//!
//! let mut tape = Tape::new();
//! let x = Tensor::ones(&[1, 4]);
//!
//! // A parameterized op always produces history.
//! let h = tape.record_op("AddmmBackward", &[&x], 2).expect("parameters give history");
//! let record = tape.get(h).expect("recorded");
//! assert_eq!(record.predecessors(), &[Predecessor::Parameter, Predecessor::Parameter]);
//! ```
//!
//! # References
//!
//! - Baydin, A. G., et al. (2018). Automatic differentiation in machine learning: a survey. JMLR.
//! - Paszke, A., et al. (2019). `PyTorch`: An imperative style, high-performance
//!   deep learning library. `NeurIPS`.

mod tape;
mod tensor;

pub use tape::{ForwardTrace, Predecessor, Tape, TraceHandle, TraceRecord};
pub use tensor::Tensor;
