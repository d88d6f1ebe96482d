//! Convolution and reshaping layers.
//!
//! # References
//!
//! - `LeCun`, Y., et al. (1998). Gradient-based learning applied to document
//!   recognition. Proceedings of the IEEE.

use std::any::Any;

use super::error::ModelError;
use super::functional;
use super::hooks::ForwardContext;
use super::init::kaiming_uniform;
use super::module::{ChannelDims, LayerId, LayerRole, Module};
use crate::trace::Tensor;

/// 2D convolution over NCHW input.
///
/// # Shape
///
/// - Input: `(N, C_in, H, W)`
/// - Output: `(N, C_out, H_out, W_out)` where
///   `H_out = (H + 2*padding_h - kernel_h) / stride_h + 1`
///
/// # Example
///
/// ```
/// use aprender_depgraph::nn::{Conv2d, Model};
/// use aprender_depgraph::trace::Tensor;
///
/// let model = Model::new(Conv2d::new(3, 16, 3));
/// let y = model.forward(&Tensor::ones(&[1, 3, 8, 8])).unwrap().output;
/// assert_eq!(y.shape(), &[1, 16, 6, 6]);
/// ```
pub struct Conv2d {
    /// Weight tensor, shape: [`out_channels`, `in_channels`, `kernel_h`, `kernel_w`]
    weight: Tensor,
    /// Bias tensor, shape: [`out_channels`], or None
    bias: Option<Tensor>,
    in_channels: usize,
    out_channels: usize,
    kernel: (usize, usize),
    stride: (usize, usize),
    padding: (usize, usize),
    id: LayerId,
}

impl Conv2d {
    /// Create a Conv2d layer with a square kernel, stride 1 and no padding.
    #[must_use]
    pub fn new(in_channels: usize, out_channels: usize, kernel_size: usize) -> Self {
        Self::with_options(
            in_channels,
            out_channels,
            (kernel_size, kernel_size),
            (1, 1),
            (0, 0),
            None,
        )
    }

    /// Create a Conv2d layer with explicit geometry and optional seed.
    ///
    /// Zero strides are clamped to 1.
    #[must_use]
    pub fn with_options(
        in_channels: usize,
        out_channels: usize,
        kernel: (usize, usize),
        stride: (usize, usize),
        padding: (usize, usize),
        seed: Option<u64>,
    ) -> Self {
        let fan_in = in_channels * kernel.0 * kernel.1;
        let weight = kaiming_uniform(
            &[out_channels, in_channels, kernel.0, kernel.1],
            fan_in,
            seed,
        );
        Self {
            weight,
            bias: Some(Tensor::zeros(&[out_channels])),
            in_channels,
            out_channels,
            kernel,
            stride: (stride.0.max(1), stride.1.max(1)),
            padding,
            id: LayerId::new(),
        }
    }

    /// Drop the bias term.
    #[must_use]
    pub fn without_bias(mut self) -> Self {
        self.bias = None;
        self
    }

    /// Number of input channels.
    #[must_use]
    pub fn in_channels(&self) -> usize {
        self.in_channels
    }

    /// Number of output channels.
    #[must_use]
    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    /// Kernel height and width.
    #[must_use]
    pub fn kernel_size(&self) -> (usize, usize) {
        self.kernel
    }

    /// Weight tensor.
    #[must_use]
    pub fn weight(&self) -> &Tensor {
        &self.weight
    }

    /// Bias tensor, if any.
    #[must_use]
    pub fn bias(&self) -> Option<&Tensor> {
        self.bias.as_ref()
    }

    /// Keep only the output channels at `keep`.
    ///
    /// # Panics
    ///
    /// Panics if an index is out of range; callers validate first.
    pub fn retain_out_channels(&mut self, keep: &[usize]) {
        self.weight = self.weight.select(0, keep);
        self.bias = self.bias.as_ref().map(|b| b.select(0, keep));
        self.out_channels = keep.len();
    }

    /// Keep only the input channels at `keep`.
    ///
    /// # Panics
    ///
    /// Panics if an index is out of range; callers validate first.
    pub fn retain_in_channels(&mut self, keep: &[usize]) {
        self.weight = self.weight.select(1, keep);
        self.in_channels = keep.len();
    }

    fn convolve(&self, input: &Tensor) -> Result<Tensor, ModelError> {
        let shape = input.shape();
        let (batch, channels, in_h, in_w) = (shape[0], shape[1], shape[2], shape[3]);
        let (kh, kw) = self.kernel;
        let (sh, sw) = self.stride;
        let (ph, pw) = self.padding;

        let padded = (in_h + 2 * ph, in_w + 2 * pw);
        if padded.0 < kh || padded.1 < kw {
            return Err(ModelError::KernelTooLarge {
                layer: "Conv2d",
                kernel: self.kernel,
                input: padded,
            });
        }
        let out_h = (padded.0 - kh) / sh + 1;
        let out_w = (padded.1 - kw) / sw + 1;

        let x = input.data();
        let w = self.weight.data();
        let mut output = vec![0.0; batch * self.out_channels * out_h * out_w];

        for n in 0..batch {
            for oc in 0..self.out_channels {
                let bias = self.bias.as_ref().map_or(0.0, |b| b.data()[oc]);
                for oh in 0..out_h {
                    for ow in 0..out_w {
                        let mut sum = bias;
                        for ic in 0..channels {
                            for ki in 0..kh {
                                let ih = oh * sh + ki;
                                if ih < ph || ih >= in_h + ph {
                                    continue;
                                }
                                for kj in 0..kw {
                                    let iw = ow * sw + kj;
                                    if iw < pw || iw >= in_w + pw {
                                        continue;
                                    }
                                    let x_idx =
                                        ((n * channels + ic) * in_h + (ih - ph)) * in_w + (iw - pw);
                                    let w_idx = ((oc * channels + ic) * kh + ki) * kw + kj;
                                    sum += x[x_idx] * w[w_idx];
                                }
                            }
                        }
                        output[((n * self.out_channels + oc) * out_h + oh) * out_w + ow] = sum;
                    }
                }
            }
        }

        Ok(Tensor::from_vec(
            output,
            &[batch, self.out_channels, out_h, out_w],
        ))
    }
}

impl Module for Conv2d {
    fn forward(&self, input: &Tensor, ctx: &mut ForwardContext<'_>) -> Result<Tensor, ModelError> {
        if input.ndim() != 4 {
            return Err(ModelError::InvalidRank {
                layer: "Conv2d",
                expected: "4",
                got: input.ndim(),
            });
        }
        if input.shape()[1] != self.in_channels {
            return Err(ModelError::ChannelMismatch {
                layer: "Conv2d",
                expected: self.in_channels,
                got: input.shape()[1],
            });
        }

        let output = self.convolve(input)?;
        let parameters = 1 + usize::from(self.bias.is_some());
        let history = ctx
            .tape()
            .record_op("ConvolutionBackward", &[input], parameters);
        Ok(output.with_history(history))
    }

    fn id(&self) -> LayerId {
        self.id
    }

    fn role(&self) -> LayerRole {
        LayerRole::Convolution
    }

    fn type_name(&self) -> &'static str {
        "Conv2d"
    }

    fn channels(&self) -> Option<ChannelDims> {
        Some(ChannelDims {
            in_channels: self.in_channels,
            out_channels: self.out_channels,
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl std::fmt::Debug for Conv2d {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conv2d")
            .field("in_channels", &self.in_channels)
            .field("out_channels", &self.out_channels)
            .field("kernel_size", &self.kernel)
            .field("stride", &self.stride)
            .field("padding", &self.padding)
            .field("bias", &self.bias.is_some())
            .finish_non_exhaustive()
    }
}

/// Flattens a contiguous range of dimensions.
///
/// # Shape
///
/// - Input: `(N, *dims)`
/// - Output: `(N, prod(dims))`
#[derive(Debug)]
pub struct Flatten {
    start_dim: usize,
    id: LayerId,
}

impl Flatten {
    /// Create a new Flatten layer.
    ///
    /// By default, flattens from dimension 1 onwards (preserving batch).
    #[must_use]
    pub fn new() -> Self {
        Self::from_dim(1)
    }

    /// Create Flatten with custom start dimension.
    #[must_use]
    pub fn from_dim(start_dim: usize) -> Self {
        Self {
            start_dim,
            id: LayerId::new(),
        }
    }
}

impl Default for Flatten {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for Flatten {
    fn forward(&self, input: &Tensor, ctx: &mut ForwardContext<'_>) -> Result<Tensor, ModelError> {
        Ok(functional::flatten(input, self.start_dim, ctx.tape()))
    }

    fn id(&self) -> LayerId {
        self.id
    }

    fn role(&self) -> LayerRole {
        LayerRole::ShapeReinterpretation
    }

    fn type_name(&self) -> &'static str {
        "Flatten"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
