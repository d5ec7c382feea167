//! Diagonal Gaussian distribution
use super::{sampled_shape, DistributionParams, ParameterizedDistribution};
use crate::torch::batch::{Batch, BatchError};
use std::f64::consts::PI;
use tch::{Kind, Tensor};

/// Batch field holding stored Gaussian means.
pub const MEAN: &str = "mean";
/// Batch field holding stored Gaussian log standard deviations.
pub const LOG_STD: &str = "log_std";

/// Parameters of diagonal Gaussian distribution(s).
#[derive(Debug)]
pub struct GaussianParams {
    /// Mean. Shape `[BATCH_SHAPE.., D]`.
    pub mean: Tensor,
    /// Log standard deviation. Broadcastable to the shape of `mean`.
    pub log_std: Tensor,
}

impl GaussianParams {
    pub const fn new(mean: Tensor, log_std: Tensor) -> Self {
        Self { mean, log_std }
    }

    /// Log standard deviation expanded to the shape of the mean.
    fn full_log_std(&self) -> Tensor {
        self.log_std.expand_as(&self.mean)
    }
}

impl DistributionParams for GaussianParams {
    fn from_batch(batch: &Batch) -> Result<Self, BatchError> {
        Ok(Self {
            mean: batch.get(MEAN)?.shallow_clone(),
            log_std: batch.get(LOG_STD)?.shallow_clone(),
        })
    }

    fn map<F: FnMut(&Tensor) -> Tensor>(&self, mut f: F) -> Self {
        Self {
            mean: f(&self.mean),
            log_std: f(&self.log_std),
        }
    }
}

/// Multivariate Gaussian distributions with diagonal covariance.
///
/// Samples are reparameterized: `mean + std * noise` with standard normal noise.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct GaussianPd;

impl ParameterizedDistribution for GaussianPd {
    type Params = GaussianParams;

    fn sample(&self, params: &Self::Params, sample_shape: &[i64]) -> Tensor {
        let shape = sampled_shape(sample_shape, &params.mean.size());
        let noise = Tensor::randn(&shape, (params.mean.kind(), params.mean.device()));
        params.mean.expand(&shape, false) + noise * params.full_log_std().exp()
    }

    fn log_likelihood(&self, elements: &Tensor, params: &Self::Params) -> Tensor {
        let log_std = params.full_log_std();
        let dim = params.mean.size().last().copied().unwrap_or(1);
        let normalized = (elements - &params.mean) / log_std.exp();
        let squared_norm = normalized
            .square()
            .sum_dim_intlist(&[-1], false, Kind::Float);
        let log_det = log_std.sum_dim_intlist(&[-1], false, Kind::Float);
        #[allow(clippy::cast_precision_loss)]
        let log_normalizer = 0.5 * (2.0 * PI).ln() * dim as f64;
        squared_norm * -0.5 - log_det - log_normalizer
    }

    fn entropy(&self, params: &Self::Params) -> Tensor {
        let per_dim = params.full_log_std() + 0.5 * (2.0 * PI * std::f64::consts::E).ln();
        per_dim.sum_dim_intlist(&[-1], false, Kind::Float)
    }

    fn kl_divergence(&self, p: &Self::Params, q: &Self::Params) -> Tensor {
        let p_log_std = p.full_log_std();
        let q_log_std = q.full_log_std();
        let p_var = (&p_log_std * 2.0).exp();
        let q_var = (&q_log_std * 2.0).exp();
        let numerator = p_var + (&p.mean - &q.mean).square();
        let per_dim = &q_log_std - &p_log_std + numerator / (q_var * 2.0) - 0.5;
        per_dim.sum_dim_intlist(&[-1], false, Kind::Float)
    }
}
