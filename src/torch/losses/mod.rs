//! Reinforcement learning loss functions
//!
//! Each loss function takes the models it trains or evaluates, a [`Batch`][crate::Batch],
//! a configuration and a statistics logger.
//! The batch is parsed into a typed view before any model is evaluated.
//! Returned losses keep their gradient graph for the differentiable paths;
//! bootstrapped targets and reference distributions are detached.
//!
//! Diagnostics are logged as one group per call under the loss name.
mod action_gradient;
mod bellman;
mod imitation;
mod policy_gradient;
mod r2d2;
mod sac;
#[cfg(test)]
pub mod testing;
mod value;

pub use action_gradient::{ag, AgConfig};
pub use bellman::{
    bellman, clipped_double_bellman, BellmanConfig, BellmanLossType, ClippedDoubleBellmanConfig,
    LossReduction,
};
pub use imitation::{
    cross_ent, density_ratio_adv_cross_ent, density_ratio_rew_cross_ent, log_likelihood,
    shannon_cross_entropy, CrossEntConfig, DensityRatioAdvConfig, DensityRatioRewConfig,
    DiscriminatorLabel,
};
pub use policy_gradient::{pg, pg_clip, pg_kl, PgClipConfig, PgConfig, PgKlConfig};
pub use r2d2::{r2d2_sac, R2d2SacConfig, R2d2SacLosses};
pub use sac::{sac, SacConfig, SacLosses};
pub use value::{dynamics, monte_carlo, DynamicsConfig, DynamicsTarget, MonteCarloConfig};

use crate::error::LossError;
use tch::{Kind, Tensor};

/// Mean of `values * mask` over all elements.
///
/// Entries where the mask is zero contribute exactly zero, even if the value is NaN or infinite.
pub fn masked_mean(values: &Tensor, mask: &Tensor) -> Tensor {
    (values.masked_fill(&mask.eq(0.0), 0.0) * mask).mean(Kind::Float)
}

/// Expand `x` with a leading sample dimension of size `sampling`.
fn expand_samples(x: &Tensor, sampling: i64) -> Tensor {
    let mut shape = x.size();
    shape.insert(0, sampling);
    x.expand(&shape, false)
}

/// `1 - dones`
fn not_done(dones: &Tensor) -> Tensor {
    dones.ones_like() - dones
}

/// Value of a scalar tensor for logging.
fn scalar(x: &Tensor) -> f64 {
    f64::from(x.detach())
}

/// Check that a sample count is positive.
fn check_sampling(sampling: i64) -> Result<(), LossError> {
    if sampling < 1 {
        return Err(LossError::InvalidConfig(format!(
            "sampling must be positive, got {}",
            sampling
        )));
    }
    Ok(())
}

/// Elementwise minimum over an ensemble of tensors.
fn fold_min<I: IntoIterator<Item = Tensor>>(tensors: I) -> Result<Tensor, LossError> {
    tensors
        .into_iter()
        .reduce(|a, b| a.min_other(&b))
        .ok_or(LossError::EmptyEnsemble)
}

/// Elementwise maximum over an ensemble of tensors.
fn fold_max<I: IntoIterator<Item = Tensor>>(tensors: I) -> Result<Tensor, LossError> {
    tensors
        .into_iter()
        .reduce(|a, b| a.max_other(&b))
        .ok_or(LossError::EmptyEnsemble)
}
