//! Imitation learning and adversarial discriminator losses
use super::{masked_mean, not_done, scalar};
use crate::error::LossError;
use crate::logging::{LogGroup, StatsLogger};
use crate::torch::batch::{Batch, ObsActionBatch, ObservationBatch, StateTransitionBatch};
use crate::torch::distributions::ParameterizedDistribution;
use crate::torch::models::{Policy, StateActionValue, StateValue};
use serde::{Deserialize, Serialize};
use tch::{Kind, Reduction, Tensor};

/// Shannon cross entropy between a teacher and a student policy (policy distillation).
///
/// `mean((KL(teacher || student) - entropy(teacher)) * mask)`
///
/// The teacher is evaluated without gradient tracking.
/// Masks are read if either policy is recurrent.
pub fn shannon_cross_entropy<S, T>(
    student: &S,
    teacher: &T,
    batch: &Batch,
    logger: &mut dyn StatsLogger,
) -> Result<Tensor, LossError>
where
    S: Policy,
    T: Policy<Pd = S::Pd>,
{
    let batch = ObservationBatch::from_batch(
        batch,
        student.is_recurrent() || teacher.is_recurrent(),
    )?;
    let mask = &batch.masks.out_masks;
    let h_masks = batch.masks.h_masks();

    let student_params = student.forward(&batch.obs, None, h_masks).params;
    let teacher_params = tch::no_grad(|| teacher.forward(&batch.obs, None, h_masks).params);

    let pd = student.pd();
    let kl = pd.kl_divergence(&teacher_params, &student_params);
    let teacher_entropy = pd.entropy(&teacher_params);
    let loss = masked_mean(&(&kl - &teacher_entropy), mask);

    let mut group = LogGroup::new(logger, "shannon_cross_entropy");
    group.log_scalar("loss", scalar(&loss))?;
    group.log_scalar("kl", scalar(&masked_mean(&kl, mask)))?;
    Ok(loss)
}

/// Negative log likelihood of the batch actions (behavior cloning).
///
/// `-mean(llh(acs) * mask)`
pub fn log_likelihood<P: Policy>(
    pol: &P,
    batch: &Batch,
    logger: &mut dyn StatsLogger,
) -> Result<Tensor, LossError> {
    let batch = ObsActionBatch::from_batch(batch, pol.is_recurrent())?;
    let params = pol.forward(&batch.obs, None, batch.masks.h_masks()).params;
    let llh = pol.pd().log_likelihood(&batch.acs, &params);
    let loss = masked_mean(&llh, &batch.masks.out_masks).neg();

    let mut group = LogGroup::new(logger, "log_likelihood");
    group.log_scalar("loss", scalar(&loss))?;
    Ok(loss)
}

/// Which data source a discriminator batch comes from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscriminatorLabel {
    /// Data generated by the agent. Label 0.
    Agent,
    /// Expert demonstrations. Label 1.
    Expert,
}

impl Default for DiscriminatorLabel {
    fn default() -> Self {
        Self::Expert
    }
}

impl DiscriminatorLabel {
    /// Binary classification target.
    pub const fn value(self) -> f64 {
        match self {
            Self::Agent => 0.0,
            Self::Expert => 1.0,
        }
    }
}

/// Elementwise binary cross entropy of logits against a constant label.
fn label_cross_entropy(logits: &Tensor, label: DiscriminatorLabel) -> Tensor {
    let target = logits.full_like(label.value());
    logits.binary_cross_entropy_with_logits::<&Tensor>(&target, None, None, Reduction::None)
}

/// Configuration for [`cross_ent`].
#[derive(Debug, Default, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrossEntConfig {
    pub label: DiscriminatorLabel,
    /// Coefficient of the discriminator entropy bonus.
    pub ent_beta: f64,
}

/// Cross entropy loss of a discriminator on a batch with a single label (GAIL).
///
/// The discriminator outputs logits of the expert label.
/// The Bernoulli entropy of the discriminator output is subtracted, weighted by `ent_beta`.
pub fn cross_ent<D: StateActionValue>(
    discrim: &D,
    batch: &Batch,
    config: &CrossEntConfig,
    logger: &mut dyn StatsLogger,
) -> Result<Tensor, LossError> {
    let batch = ObsActionBatch::from_batch(batch, discrim.is_recurrent())?;
    let mask = &batch.masks.out_masks;
    let logits = discrim
        .forward(&batch.obs, &batch.acs, None, batch.masks.h_masks())
        .value;

    let discrim_loss = masked_mean(&label_cross_entropy(&logits, config.label), mask);
    let entropy = (logits.ones_like() - logits.sigmoid()) * &logits - logits.log_sigmoid();
    let entropy = masked_mean(&entropy, mask);
    let loss = &discrim_loss - &entropy * config.ent_beta;

    let mut group = LogGroup::new(logger, "cross_ent");
    group.log_scalar("loss", scalar(&loss))?;
    group.log_scalar("entropy", scalar(&entropy))?;
    group.log_scalar(
        "expert_prob",
        scalar(&masked_mean(&logits.sigmoid(), mask)),
    )?;
    Ok(loss)
}

/// Configuration for [`density_ratio_rew_cross_ent`].
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DensityRatioRewConfig {
    pub label: DiscriminatorLabel,
    /// Discount factor of the reward shaping term.
    pub gamma: f64,
}

impl Default for DensityRatioRewConfig {
    fn default() -> Self {
        Self {
            label: DiscriminatorLabel::default(),
            gamma: 0.99,
        }
    }
}

/// Discriminator loss with logits `energy - llh(acs)`.
fn density_ratio_loss<P: Policy>(
    pol: &P,
    obs: &Tensor,
    acs: &Tensor,
    energies: &Tensor,
    label: DiscriminatorLabel,
) -> (Tensor, Tensor) {
    let llh = tch::no_grad(|| {
        let params = pol.forward(obs, None, None).params;
        pol.pd().log_likelihood(acs, &params)
    });
    let logits = energies - llh;
    let loss = label_cross_entropy(&logits, label).mean(Kind::Float);
    (loss, logits)
}

/// Discriminator loss of adversarial inverse reinforcement learning with a shaped reward.
///
/// The discriminator logits are `r(s) + (1 - done) γ V(s') - V(s) - log π(a|s)` where `r` is
/// the learned reward, `V` the shaping value function and `π` the current policy (no gradient).
///
/// # Reference
/// [Learning Robust Rewards with Adversarial Inverse Reinforcement Learning][airl]
/// by Fu et al.
///
/// [airl]: https://arxiv.org/abs/1710.11248
pub fn density_ratio_rew_cross_ent<R, V, P>(
    rewf: &R,
    shaping_vf: &V,
    pol: &P,
    batch: &Batch,
    config: &DensityRatioRewConfig,
    logger: &mut dyn StatsLogger,
) -> Result<Tensor, LossError>
where
    R: StateValue,
    V: StateValue,
    P: Policy,
{
    let batch = StateTransitionBatch::from_batch(batch)?;
    let rews = rewf.forward(&batch.obs, None, None).value;
    let vs = shaping_vf.forward(&batch.obs, None, None).value;
    let next_vs = shaping_vf.forward(&batch.next_obs, None, None).value;
    let energies = rews + not_done(&batch.dones) * next_vs * config.gamma - vs;

    let (loss, logits) = density_ratio_loss(pol, &batch.obs, &batch.acs, &energies, config.label);

    let mut group = LogGroup::new(logger, "density_ratio_rew_cross_ent");
    group.log_scalar("loss", scalar(&loss))?;
    group.log_scalar("logits_mean", scalar(&logits.mean(Kind::Float)))?;
    Ok(loss)
}

/// Configuration for [`density_ratio_adv_cross_ent`].
#[derive(Debug, Default, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DensityRatioAdvConfig {
    pub label: DiscriminatorLabel,
}

/// Discriminator loss of adversarial inverse reinforcement learning with a learned advantage.
///
/// The discriminator logits are `A(s, a) - log π(a|s)`.
pub fn density_ratio_adv_cross_ent<A, P>(
    advf: &A,
    pol: &P,
    batch: &Batch,
    config: &DensityRatioAdvConfig,
    logger: &mut dyn StatsLogger,
) -> Result<Tensor, LossError>
where
    A: StateActionValue,
    P: Policy,
{
    let batch = ObsActionBatch::from_batch(batch, false)?;
    let energies = advf.forward(&batch.obs, &batch.acs, None, None).value;

    let (loss, logits) = density_ratio_loss(pol, &batch.obs, &batch.acs, &energies, config.label);

    let mut group = LogGroup::new(logger, "density_ratio_adv_cross_ent");
    group.log_scalar("loss", scalar(&loss))?;
    group.log_scalar("logits_mean", scalar(&logits.mean(Kind::Float)))?;
    Ok(loss)
}
