//! Soft actor-critic losses
use super::{check_sampling, expand_samples, fold_max, fold_min, not_done, scalar};
use crate::error::LossError;
use crate::logging::{LogError, LogGroup, StatsLogger};
use crate::torch::batch::{Batch, TransitionBatch};
use crate::torch::distributions::ParameterizedDistribution;
use crate::torch::models::{Policy, StateActionValue};
use serde::{Deserialize, Serialize};
use tch::{Kind, Tensor};

/// Configuration for [`sac`].
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SacConfig {
    /// Discount factor.
    pub gamma: f64,
    /// Number of actions sampled per observation to estimate expectations.
    pub sampling: i64,
    /// Use the reparameterization gradient for the policy loss.
    ///
    /// Otherwise the score function (likelihood ratio) gradient is used.
    pub reparam: bool,
    /// Standardize the score function weights. Ignored with `reparam`.
    pub normalize: bool,
    /// Added to the weight standard deviation when normalizing.
    pub eps: f64,
    /// Target for the policy log likelihood in the temperature loss.
    ///
    /// Defaults to the number of action elements.
    pub target_entropy: Option<f64>,
}

impl Default for SacConfig {
    fn default() -> Self {
        Self {
            gamma: 0.99,
            sampling: 1,
            reparam: true,
            normalize: false,
            eps: 1e-6,
            target_entropy: None,
        }
    }
}

/// Losses of soft actor-critic with an ensemble of `N` Q-functions.
#[derive(Debug)]
pub struct SacLosses<const N: usize> {
    /// Policy loss.
    pub pol_loss: Tensor,
    /// Loss of each Q-function against the shared (detached) soft Bellman target.
    pub qf_losses: [Tensor; N],
    /// Temperature loss. Differentiable with respect to `log_alpha` only.
    pub alpha_loss: Tensor,
}

/// Soft actor-critic losses.
///
/// # Args
/// * `pol` - Policy.
/// * `qfs` - Q-function ensemble. The policy is trained against the most pessimistic member.
/// * `targ_qfs` - Target Q-functions. The soft value target is the minimum over the ensemble.
/// * `log_alpha` - Log of the entropy temperature.
///
/// # Batch Fields
/// `obs`, `acs`, `rews`, `next_obs` and `dones`, all with leading dimension `[B]`.
///
/// # Reference
/// [Soft Actor-Critic Algorithms and Applications][sac] by Haarnoja et al.
///
/// [sac]: https://arxiv.org/abs/1812.05905
pub fn sac<P, Q, T, const N: usize>(
    pol: &P,
    qfs: &[Q; N],
    targ_qfs: &[T; N],
    log_alpha: &Tensor,
    batch: &Batch,
    config: &SacConfig,
    logger: &mut dyn StatsLogger,
) -> Result<SacLosses<N>, LossError>
where
    P: Policy,
    Q: StateActionValue,
    T: StateActionValue,
{
    if N == 0 {
        return Err(LossError::EmptyEnsemble);
    }
    check_sampling(config.sampling)?;
    let batch = TransitionBatch::from_batch(batch)?;
    let sampling = config.sampling;
    let alpha = log_alpha.exp();
    let pd = pol.pd();

    let params = pol.forward(&batch.obs, None, None).params;
    let next_params = pol.forward(&batch.next_obs, None, None).params;

    let sampled_obs = expand_samples(&batch.obs, sampling);
    let sampled_next_obs = expand_samples(&batch.next_obs, sampling);
    let sampled_acs = pd.sample(&params, &[sampling]);
    let sampled_next_acs = pd.sample(&next_params, &[sampling]);
    let sampled_llh = pd.log_likelihood(&sampled_acs.detach(), &params);
    let sampled_next_llh = pd.log_likelihood(&sampled_next_acs, &next_params);

    let sampled_qs: Vec<_> = qfs
        .iter()
        .map(|qf| qf.forward(&sampled_obs, &sampled_acs, None, None).value)
        .collect();
    let q_targ = tch::no_grad(|| -> Result<_, LossError> {
        let next_v = soft_next_value(
            &alpha,
            &sampled_next_llh,
            targ_qfs.iter().map(|targ_qf| {
                targ_qf
                    .forward(&sampled_next_obs, &sampled_next_acs, None, None)
                    .value
            }),
        )?;
        Ok(soft_target(&batch.rews, &batch.dones, &next_v, config.gamma))
    })?;
    let qs: [Tensor; N] =
        array_init::array_init(|i| qfs[i].forward(&batch.obs, &batch.acs, None, None).value);

    let target_entropy = config
        .target_entropy
        .unwrap_or_else(|| pol.action_dim() as f64);
    let losses = SacLosses {
        pol_loss: policy_loss(&alpha, &sampled_llh, sampled_qs, config)?,
        qf_losses: array_init::array_init(|i| q_loss(&qs[i], &q_targ)),
        alpha_loss: temperature_loss(log_alpha, &sampled_llh, target_entropy),
    };

    let mut group = LogGroup::new(logger, "sac");
    log_losses(&mut group, &losses, &alpha, &sampled_llh, &q_targ)?;
    Ok(losses)
}

/// Soft value of the next state: the ensemble minimum of `mean_s(Q_targ - α llh)`.
///
/// `sampled_next_qs` and `sampled_next_llh` have a leading sample dimension.
pub(super) fn soft_next_value<I>(
    alpha: &Tensor,
    sampled_next_llh: &Tensor,
    sampled_next_qs: I,
) -> Result<Tensor, LossError>
where
    I: IntoIterator<Item = Tensor>,
{
    fold_min(sampled_next_qs.into_iter().map(|q| {
        (q - alpha * sampled_next_llh).mean_dim(&[0], false, Kind::Float)
    }))
}

/// Detached soft Bellman target `rews + γ next_v (1 - dones)`.
pub(super) fn soft_target(rews: &Tensor, dones: &Tensor, next_v: &Tensor, gamma: f64) -> Tensor {
    (rews + next_v * not_done(dones) * gamma).detach()
}

/// Half mean squared error of a Q-function against its target.
pub(super) fn q_loss(q: &Tensor, q_targ: &Tensor) -> Tensor {
    ((q - q_targ).square() * 0.5).mean(Kind::Float)
}

/// Policy loss from the sampled action values of each ensemble member.
///
/// The per-member loss `mean_s(α llh - Q)` is reduced with an elementwise maximum over the
/// ensemble before taking the mean.
pub(super) fn policy_loss<I>(
    alpha: &Tensor,
    sampled_llh: &Tensor,
    sampled_qs: I,
    config: &SacConfig,
) -> Result<Tensor, LossError>
where
    I: IntoIterator<Item = Tensor>,
{
    let worst = fold_max(
        sampled_qs
            .into_iter()
            .map(|q| (alpha * sampled_llh - q).mean_dim(&[0], false, Kind::Float)),
    )?;
    if config.reparam {
        return Ok(worst.mean(Kind::Float));
    }

    let mut weight = worst.detach();
    if config.normalize {
        weight = (&weight - weight.mean(Kind::Float)) / (weight.std(true) + config.eps);
    }
    Ok((sampled_llh.mean_dim(&[0], false, Kind::Float) * weight).mean(Kind::Float))
}

/// Temperature loss `-mean(log_alpha (llh - target_entropy))` with the likelihoods detached.
pub(super) fn temperature_loss(
    log_alpha: &Tensor,
    sampled_llh: &Tensor,
    target_entropy: f64,
) -> Tensor {
    (log_alpha * (sampled_llh - target_entropy).detach())
        .mean(Kind::Float)
        .neg()
}

pub(super) fn log_losses<const N: usize>(
    group: &mut LogGroup,
    losses: &SacLosses<N>,
    alpha: &Tensor,
    sampled_llh: &Tensor,
    q_targ: &Tensor,
) -> Result<(), LogError> {
    group.log_scalar("pol_loss", scalar(&losses.pol_loss))?;
    let qf_loss = losses.qf_losses.iter().map(scalar).sum::<f64>() / N as f64;
    group.log_scalar("qf_loss", qf_loss)?;
    group.log_scalar("alpha_loss", scalar(&losses.alpha_loss))?;
    group.log_scalar("alpha", scalar(alpha))?;
    group.log_scalar("entropy", -scalar(&sampled_llh.mean(Kind::Float)))?;
    group.log_scalar("q_target_mean", scalar(&q_targ.mean(Kind::Float)))?;
    Ok(())
}
