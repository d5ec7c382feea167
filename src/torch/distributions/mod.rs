//! Torch statistical distributions
//!
//! A distribution object is stateless; its parameters are passed explicitly as a typed record.
//! Parameters may have arbitrary batch shape. Statistics are tensors with that batch shape,
//! and samples are prefixed by the requested sample shape.
mod categorical;
mod deterministic;
mod gaussian;

pub use categorical::{CategoricalParams, CategoricalPd};
pub use deterministic::{DeterministicParams, DeterministicPd};
pub use gaussian::{GaussianParams, GaussianPd};

use super::batch::{Batch, BatchError};
use tch::{Kind, Tensor};

/// Distribution parameters that can be stored in and read back from a batch.
pub trait DistributionParams: Sized {
    /// Read parameters stored in a batch (the distribution that collected the data).
    fn from_batch(batch: &Batch) -> Result<Self, BatchError>;

    /// Apply `f` to each parameter tensor.
    fn map<F: FnMut(&Tensor) -> Tensor>(&self, f: F) -> Self;

    /// A copy of the parameters detached from the computation graph.
    fn detach(&self) -> Self {
        self.map(Tensor::detach)
    }
}

/// A family of distributions described by a parameter record.
pub trait ParameterizedDistribution {
    /// Distribution parameters
    type Params: DistributionParams;

    /// Sample elements.
    ///
    /// # Returns
    /// A tensor of shape `[SAMPLE_SHAPE.., BATCH_SHAPE.., ELEMENT_SHAPE..]`.
    /// Where the distribution supports it, samples are differentiable functions of the
    /// parameters (reparameterization).
    fn sample(&self, params: &Self::Params, sample_shape: &[i64]) -> Tensor;

    /// Log probability (density) of each element.
    ///
    /// `elements` may have additional leading sample dimensions.
    fn log_likelihood(&self, elements: &Tensor, params: &Self::Params) -> Tensor;

    /// Entropy of each distribution in the batch.
    fn entropy(&self, params: &Self::Params) -> Tensor;

    /// KL divergence `KL(p || q)` for each pair of distributions in the batch.
    fn kl_divergence(&self, p: &Self::Params, q: &Self::Params) -> Tensor;
}

/// Clamp float values to be >= the smallest finite float value.
fn clamp_float_min(x: &Tensor) -> Result<Tensor, Kind> {
    match x.kind() {
        Kind::Float => Ok(x.clamp_min(f64::from(f32::MIN))),
        Kind::Double => Ok(x.clamp_min(f64::MIN)),
        kind => Err(kind),
    }
}

/// Shape of the broadcast of two shapes, if they are compatible.
fn broadcast_shapes<'a>(mut a: &'a [i64], mut b: &'a [i64]) -> Option<Vec<i64>> {
    // Ensure that b is not longer. It will be prepended with 1s
    if b.len() > a.len() {
        std::mem::swap(&mut a, &mut b);
    }
    let mut broadcasted = Vec::new();
    for (&ai, &bi) in a
        .iter()
        .rev()
        .zip(b.iter().rev().chain(std::iter::repeat(&1)))
    {
        if ai == bi || bi == 1 {
            broadcasted.push(ai);
        } else if ai == 1 {
            broadcasted.push(bi)
        } else {
            return None;
        }
    }
    broadcasted.reverse();
    Some(broadcasted)
}

/// Prefix `shape` with `sample_shape`.
fn sampled_shape(sample_shape: &[i64], shape: &[i64]) -> Vec<i64> {
    sample_shape.iter().chain(shape).copied().collect()
}
