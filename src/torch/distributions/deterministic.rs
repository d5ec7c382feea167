//! Deterministic distribution
use super::{broadcast_shapes, sampled_shape, DistributionParams, ParameterizedDistribution};
use crate::torch::batch::{Batch, BatchError};
use tch::{Kind, Tensor};

/// Batch field holding the stored deterministic action.
pub const MEAN: &str = "mean";

/// Parameters of deterministic distribution(s).
#[derive(Debug)]
pub struct DeterministicParams {
    /// The single supported element. Shape `[BATCH_SHAPE.., D]`.
    pub mean: Tensor,
}

impl DistributionParams for DeterministicParams {
    fn from_batch(batch: &Batch) -> Result<Self, BatchError> {
        Ok(Self {
            mean: batch.get(MEAN)?.shallow_clone(),
        })
    }

    fn map<F: FnMut(&Tensor) -> Tensor>(&self, mut f: F) -> Self {
        Self {
            mean: f(&self.mean),
        }
    }
}

/// Point-mass distributions over vectors.
///
/// Samples are the mean itself so gradients flow through them.
/// The log likelihood, entropy and KL divergence are all taken to be zero.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct DeterministicPd;

/// Batch shape of a tensor with one trailing element dimension.
fn batch_shape(x: &Tensor) -> Vec<i64> {
    let mut shape = x.size();
    shape.pop();
    shape
}

impl ParameterizedDistribution for DeterministicPd {
    type Params = DeterministicParams;

    fn sample(&self, params: &Self::Params, sample_shape: &[i64]) -> Tensor {
        params
            .mean
            .expand(&sampled_shape(sample_shape, &params.mean.size()), false)
    }

    fn log_likelihood(&self, elements: &Tensor, params: &Self::Params) -> Tensor {
        let shape = broadcast_shapes(&batch_shape(elements), &batch_shape(&params.mean))
            .unwrap_or_else(|| batch_shape(elements));
        Tensor::zeros(&shape, (Kind::Float, params.mean.device()))
    }

    fn entropy(&self, params: &Self::Params) -> Tensor {
        Tensor::zeros(&batch_shape(&params.mean), (Kind::Float, params.mean.device()))
    }

    fn kl_divergence(&self, p: &Self::Params, q: &Self::Params) -> Tensor {
        let p_shape = batch_shape(&p.mean);
        let shape = broadcast_shapes(&p_shape, &batch_shape(&q.mean)).unwrap_or(p_shape);
        Tensor::zeros(&shape, (Kind::Float, p.mean.device()))
    }
}
