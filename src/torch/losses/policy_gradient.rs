//! Policy gradient losses
use super::{masked_mean, scalar};
use crate::error::LossError;
use crate::logging::{LogGroup, StatsLogger};
use crate::torch::batch::{Batch, PolicyBatch};
use crate::torch::distributions::{DistributionParams, ParameterizedDistribution};
use crate::torch::models::{ParamsOf, Policy};
use serde::{Deserialize, Serialize};
use tch::{Kind, Tensor};

/// Configuration for [`pg`].
#[derive(Debug, Default, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PgConfig {
    /// Entropy bonus coefficient.
    pub ent_beta: f64,
}

/// Vanilla policy gradient (REINFORCE) loss.
///
/// `-mean(llh(acs) * advs * mask) - ent_beta * mean(entropy)`
///
/// Advantages are used as given; the caller is responsible for detaching them.
///
/// # Batch Fields
/// `obs`, `acs`, `advs` and, for recurrent policies, `h_masks` and `out_masks`.
pub fn pg<P: Policy>(
    pol: &P,
    batch: &Batch,
    config: &PgConfig,
    logger: &mut dyn StatsLogger,
) -> Result<Tensor, LossError> {
    let batch = PolicyBatch::from_batch(batch, pol.is_recurrent())?;
    let mask = &batch.masks.out_masks;
    let pd = pol.pd();

    let params = pol.forward(&batch.obs, None, batch.masks.h_masks()).params;
    let llh = pd.log_likelihood(&batch.acs, &params);
    let entropy = masked_mean(&pd.entropy(&params), mask);
    let loss = masked_mean(&(llh * &batch.advs), mask).neg() - &entropy * config.ent_beta;

    let mut group = LogGroup::new(logger, "pg");
    group.log_scalar("loss", scalar(&loss))?;
    group.log_scalar("entropy", scalar(&entropy))?;
    Ok(loss)
}

/// Configuration for [`pg_clip`].
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PgClipConfig {
    /// Likelihood ratios are clipped to `[1 - clip_param, 1 + clip_param]`.
    pub clip_param: f64,
    /// Entropy bonus coefficient.
    pub ent_beta: f64,
}

impl Default for PgClipConfig {
    fn default() -> Self {
        Self {
            clip_param: 0.2,
            ent_beta: 0.0,
        }
    }
}

/// Clipped surrogate policy loss of Proximal Policy Optimization (PPO).
///
/// The reference log likelihoods are computed from the distribution parameters stored in the
/// batch (the policy that collected the data) and are treated as constants.
///
/// `mean(max(-ratio * advs, -clip(ratio, 1 - ε, 1 + ε) * advs) * mask) - ent_beta * mean(entropy)`
///
/// # Reference
/// [Proximal Policy Optimization Algorithms][ppo] by Schulman et al.
///
/// [ppo]: https://arxiv.org/abs/1707.06347
pub fn pg_clip<P: Policy>(
    pol: &P,
    batch: &Batch,
    config: &PgClipConfig,
    logger: &mut dyn StatsLogger,
) -> Result<Tensor, LossError> {
    if !(config.clip_param >= 0.0) {
        return Err(LossError::InvalidConfig(format!(
            "clip_param must be non-negative, got {}",
            config.clip_param
        )));
    }
    let view = PolicyBatch::from_batch(batch, pol.is_recurrent())?;
    let old_params = <ParamsOf<P> as DistributionParams>::from_batch(batch)?
        .map(|p| view.masks.fill_padding(p).detach());
    let batch = view;
    let mask = &batch.masks.out_masks;
    let pd = pol.pd();

    let old_llh = pd.log_likelihood(&batch.acs, &old_params);
    let params = pol.forward(&batch.obs, None, batch.masks.h_masks()).params;
    let new_llh = pd.log_likelihood(&batch.acs, &params);

    let ratio = (new_llh - old_llh).exp();
    let clipped_ratio = ratio.clamp(1.0 - config.clip_param, 1.0 + config.clip_param);
    let unclipped_loss = (&ratio * &batch.advs).neg();
    let clipped_loss = (clipped_ratio * &batch.advs).neg();
    let surrogate = unclipped_loss.max_other(&clipped_loss);

    let entropy = masked_mean(&pd.entropy(&params), mask);
    let loss = masked_mean(&surrogate, mask) - &entropy * config.ent_beta;

    let mut group = LogGroup::new(logger, "pg_clip");
    group.log_scalar("loss", scalar(&loss))?;
    group.log_scalar("ratio_mean", scalar(&masked_mean(&ratio, mask)))?;
    let clipped = (&ratio - 1.0).abs().gt(config.clip_param).to_kind(Kind::Float);
    group.log_scalar("clip_fraction", scalar(&masked_mean(&clipped, mask)))?;
    group.log_scalar("entropy", scalar(&entropy))?;
    Ok(loss)
}

/// Configuration for [`pg_kl`].
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PgKlConfig {
    /// KL divergence penalty coefficient.
    pub kl_beta: f64,
    /// Entropy bonus coefficient.
    pub ent_beta: f64,
}

impl Default for PgKlConfig {
    fn default() -> Self {
        Self {
            kl_beta: 1.0,
            ent_beta: 0.0,
        }
    }
}

/// Importance-weighted policy loss with a KL divergence penalty.
///
/// `-mean((ratio * advs - kl_beta * KL(old || new)) * mask) - ent_beta * mean(entropy)`
///
/// The old distribution is read from the parameters stored in the batch.
pub fn pg_kl<P: Policy>(
    pol: &P,
    batch: &Batch,
    config: &PgKlConfig,
    logger: &mut dyn StatsLogger,
) -> Result<Tensor, LossError> {
    let view = PolicyBatch::from_batch(batch, pol.is_recurrent())?;
    let old_params = <ParamsOf<P> as DistributionParams>::from_batch(batch)?
        .map(|p| view.masks.fill_padding(p).detach());
    let batch = view;
    let mask = &batch.masks.out_masks;
    let pd = pol.pd();

    let old_llh = pd.log_likelihood(&batch.acs, &old_params);
    let params = pol.forward(&batch.obs, None, batch.masks.h_masks()).params;
    let new_llh = pd.log_likelihood(&batch.acs, &params);
    let ratio = (new_llh - old_llh).exp();

    let kl = pd.kl_divergence(&old_params, &params);
    let objective = &ratio * &batch.advs - &kl * config.kl_beta;
    let entropy = masked_mean(&pd.entropy(&params), mask);
    let loss = masked_mean(&objective, mask).neg() - &entropy * config.ent_beta;

    let mut group = LogGroup::new(logger, "pg_kl");
    group.log_scalar("loss", scalar(&loss))?;
    group.log_scalar("kl", scalar(&masked_mean(&kl, mask)))?;
    group.log_scalar("ratio_mean", scalar(&masked_mean(&ratio, mask)))?;
    group.log_scalar("entropy", scalar(&entropy))?;
    Ok(loss)
}
