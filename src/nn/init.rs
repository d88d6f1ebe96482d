//! Weight initialization for the layer library.
//!
//! - Xavier/Glorot (Glorot & Bengio, 2010) for fully-connected layers
//! - Kaiming/He (He et al., 2015) for convolutions feeding `ReLU`
//!
//! # References
//!
//! - Glorot, X., & Bengio, Y. (2010). Understanding the difficulty of training
//!   deep feedforward neural networks. AISTATS.
//! - He, K., et al. (2015). Delving deep into rectifiers: Surpassing human-level
//!   performance on `ImageNet` classification. ICCV.

use crate::trace::Tensor;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Xavier uniform initialization.
///
/// Samples from U(-a, a) where a = sqrt(6 / (`fan_in` + `fan_out`)).
#[must_use]
pub fn xavier_uniform(shape: &[usize], fan_in: usize, fan_out: usize, seed: Option<u64>) -> Tensor {
    let a = (6.0 / (fan_in + fan_out).max(1) as f32).sqrt();
    uniform(shape, -a, a, seed)
}

/// Kaiming uniform initialization.
///
/// Samples from U(-bound, bound) where bound = sqrt(6 / `fan_in`).
#[must_use]
pub fn kaiming_uniform(shape: &[usize], fan_in: usize, seed: Option<u64>) -> Tensor {
    let bound = (6.0 / fan_in.max(1) as f32).sqrt();
    uniform(shape, -bound, bound, seed)
}

/// Uniform distribution initialization.
///
/// Samples from U(low, high).
pub(crate) fn uniform(shape: &[usize], low: f32, high: f32, seed: Option<u64>) -> Tensor {
    let numel: usize = shape.iter().product();
    let mut rng = match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };

    let data: Vec<f32> = (0..numel).map(|_| rng.gen_range(low..high)).collect();

    Tensor::from_vec(data, shape)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kaiming_uniform_bounds() {
        let t = kaiming_uniform(&[8, 4, 3, 3], 36, Some(7));
        let bound = (6.0_f32 / 36.0).sqrt();
        assert_eq!(t.shape(), &[8, 4, 3, 3]);
        assert!(t.data().iter().all(|&v| v >= -bound && v < bound));
    }

    #[test]
    fn test_seed_is_reproducible() {
        let a = xavier_uniform(&[4, 4], 4, 4, Some(42));
        let b = xavier_uniform(&[4, 4], 4, 4, Some(42));
        assert_eq!(a.data(), b.data());
    }
}
