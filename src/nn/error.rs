//! Errors raised while evaluating a model.

use thiserror::Error;

/// Forward-evaluation failures.
///
/// Layers validate their input shape before computing anything, so a
/// mismatched model fails fast instead of reading out of bounds.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// Input has the wrong number of dimensions.
    #[error("{layer} expects {expected}D input, got {got}D")]
    InvalidRank {
        /// Layer type that rejected the input
        layer: &'static str,
        /// Accepted rank(s)
        expected: &'static str,
        /// Rank of the offending input
        got: usize,
    },

    /// Channel or feature dimension does not match the layer.
    #[error("{layer} expected {expected} input channels, got {got}")]
    ChannelMismatch {
        /// Layer type that rejected the input
        layer: &'static str,
        /// Channels the layer was built for
        expected: usize,
        /// Channels found in the input
        got: usize,
    },

    /// Element-wise operands have different shapes.
    #[error("shape mismatch in {op}: {lhs:?} vs {rhs:?}")]
    ShapeMismatch {
        /// Operation name
        op: &'static str,
        /// Left operand shape
        lhs: Vec<usize>,
        /// Right operand shape
        rhs: Vec<usize>,
    },

    /// Kernel does not fit inside the padded input.
    #[error("{layer}: kernel {kernel:?} larger than padded input {input:?}")]
    KernelTooLarge {
        /// Layer type
        layer: &'static str,
        /// Kernel height and width
        kernel: (usize, usize),
        /// Padded input height and width
        input: (usize, usize),
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_rank_message() {
        let err = ModelError::InvalidRank {
            layer: "Conv2d",
            expected: "4",
            got: 2,
        };
        assert_eq!(err.to_string(), "Conv2d expects 4D input, got 2D");
    }

    #[test]
    fn test_channel_mismatch_message() {
        let err = ModelError::ChannelMismatch {
            layer: "Linear",
            expected: 16,
            got: 8,
        };
        let msg = err.to_string();
        assert!(msg.contains("16"));
        assert!(msg.contains("8"));
    }

    #[test]
    fn test_error_implements_std_error() {
        fn assert_error<T: std::error::Error>() {}
        assert_error::<ModelError>();
    }
}
