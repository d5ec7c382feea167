//! Recurrent soft actor-critic with stored states and burn-in
use super::sac::{
    log_losses, policy_loss, q_loss, soft_next_value, soft_target, temperature_loss, SacConfig,
    SacLosses,
};
use super::{check_sampling, expand_samples, scalar};
use crate::error::LossError;
use crate::logging::{LogGroup, StatsLogger};
use crate::torch::batch::{Batch, SequenceBatch};
use crate::torch::distributions::ParameterizedDistribution;
use crate::torch::models::{ParamsOf, Policy, RecurrentState, StateActionValue};
use serde::{Deserialize, Serialize};
use tch::{Kind, Tensor};

/// Configuration for [`r2d2_sac`].
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct R2d2SacConfig {
    #[serde(flatten)]
    pub sac: SacConfig,
    /// Number of leading steps of each sequence used only to warm up recurrent states.
    pub burn_in_length: usize,
}

impl Default for R2d2SacConfig {
    fn default() -> Self {
        Self {
            sac: SacConfig::default(),
            burn_in_length: 40,
        }
    }
}

/// Losses of recurrent soft actor-critic.
#[derive(Debug)]
pub struct R2d2SacLosses<const N: usize> {
    pub losses: SacLosses<N>,
    /// Ensemble mean of the temporal difference errors `Q - target`. Shape `[train_length, B]`.
    pub td_losses: Tensor,
}

/// Soft actor-critic losses for recurrent models trained on stored sequences.
///
/// The policy starts from the state stored in `hs` and is stepped one time step at a time:
/// the burn-in window without gradient tracking, then the training window with it.
/// Next-step distribution parameters are the parameters of the following step.
///
/// Every Q-function (and every action sample) starts from its own stored state
/// (`q_hs<i>` / `targ_q_hs<i>`), is warmed up on the burn-in window without gradient tracking
/// and is then evaluated on the training window.
///
/// # Batch Fields
/// Time-major `[T, B, ..]`: `obs`, `acs`, `rews`, `next_obs`, `dones`, `h_masks`, `hs`,
/// `q_hs<i>` and `targ_q_hs<i>` for `i` in `0..N`.
///
/// # Reference
/// [Recurrent Experience Replay in Distributed Reinforcement Learning][r2d2]
/// by Kapturowski et al.
///
/// [r2d2]: https://openreview.net/forum?id=r1lyTjAqYX
pub fn r2d2_sac<P, Q, T, const N: usize>(
    pol: &P,
    qfs: &[Q; N],
    targ_qfs: &[T; N],
    log_alpha: &Tensor,
    batch: &Batch,
    config: &R2d2SacConfig,
    logger: &mut dyn StatsLogger,
) -> Result<R2d2SacLosses<N>, LossError>
where
    P: Policy,
    Q: StateActionValue,
    T: StateActionValue,
{
    if N == 0 {
        return Err(LossError::EmptyEnsemble);
    }
    let sac_config = &config.sac;
    check_sampling(sac_config.sampling)?;
    let seq = SequenceBatch::<N>::from_batch(batch, config.burn_in_length)?;
    let sampling = sac_config.sampling;
    let length = seq.obs.size()[0];
    let alpha = log_alpha.exp();
    let pd = pol.pd();

    // Policy distribution parameters for each time step.
    let mut step_params: Vec<ParamsOf<P>> = Vec::new();
    let mut pol_state = Some(seq.policy_state.shallow_clone());
    for t in 0..length {
        let warming_up = t < seq.burn_in_length;
        let _no_grad = warming_up.then(tch::no_grad_guard);
        let output = pol.forward(
            &seq.obs.narrow(0, t, 1),
            pol_state.as_ref(),
            Some(&seq.h_masks.narrow(0, t, 1)),
        );
        step_params.push(output.params);
        pol_state = output.state.map(|state| if warming_up { state.detach() } else { state });
    }
    let burn_in = config.burn_in_length;
    let num_steps = step_params.len();
    let train = burn_in..(num_steps - 1);
    let train_next = (burn_in + 1)..num_steps;

    let (sampled_acs, sampled_llh) = sample_steps(pd, &step_params[train], sampling, true);
    let (sampled_next_acs, sampled_next_llh) =
        sample_steps(pd, &step_params[train_next], sampling, false);
    let sampled_obs = expand_samples(&seq.train(&seq.obs), sampling);
    let sampled_next_obs = expand_samples(&seq.train(&seq.next_obs), sampling);

    // Actions sampled on the burn-in window, used only to warm up the Q-function states.
    let burn_in_acs = if burn_in > 0 {
        tch::no_grad(|| {
            Some((
                sample_steps(pd, &step_params[0..burn_in], sampling, true).0,
                sample_steps(pd, &step_params[1..burn_in + 1], sampling, true).0,
            ))
        })
    } else {
        None
    };

    let h_masks = seq.train(&seq.h_masks);
    let next_h_masks = seq.train_next(&seq.h_masks);
    let burn_in_h_masks = seq.burn_in(&seq.h_masks);
    let burn_in_next_h_masks = seq.burn_in_next(&seq.h_masks);
    let burn_in_obs = seq.burn_in(&seq.obs);
    let burn_in_next_obs = seq.burn_in(&seq.next_obs);

    let sampled_qs: Vec<Tensor> = qfs
        .iter()
        .zip(&seq.q_states)
        .map(|(qf, state)| {
            Tensor::stack(
                &(0..sampling)
                    .map(|j| {
                        let warm_up = burn_in_acs.as_ref().map(|(acs, _)| WarmUp {
                            obs: &burn_in_obs,
                            acs: acs.get(j),
                            h_masks: &burn_in_h_masks,
                        });
                        warm_forward(
                            qf,
                            state,
                            warm_up,
                            &sampled_obs.get(j),
                            &sampled_acs.get(j),
                            &h_masks,
                        )
                    })
                    .collect::<Vec<_>>(),
                0,
            )
        })
        .collect();

    let q_targ = tch::no_grad(|| -> Result<_, LossError> {
        let sampled_next_qs = targ_qfs.iter().zip(&seq.target_q_states).map(|(qf, state)| {
            Tensor::stack(
                &(0..sampling)
                    .map(|j| {
                        let warm_up = burn_in_acs.as_ref().map(|(_, next_acs)| WarmUp {
                            obs: &burn_in_next_obs,
                            acs: next_acs.get(j),
                            h_masks: &burn_in_next_h_masks,
                        });
                        warm_forward(
                            qf,
                            state,
                            warm_up,
                            &sampled_next_obs.get(j),
                            &sampled_next_acs.get(j),
                            &next_h_masks,
                        )
                    })
                    .collect::<Vec<_>>(),
                0,
            )
        });
        let next_v = soft_next_value(&alpha, &sampled_next_llh, sampled_next_qs)?;
        Ok(soft_target(
            &seq.train(&seq.rews),
            &seq.train(&seq.dones),
            &next_v,
            sac_config.gamma,
        ))
    })?;

    let burn_in_data_acs = seq.burn_in(&seq.acs);
    let qs: [Tensor; N] = array_init::array_init(|i| {
        let warm_up = (burn_in > 0).then(|| WarmUp {
            obs: &burn_in_obs,
            acs: burn_in_data_acs.shallow_clone(),
            h_masks: &burn_in_h_masks,
        });
        warm_forward(
            &qfs[i],
            &seq.q_states[i],
            warm_up,
            &seq.train(&seq.obs),
            &seq.train(&seq.acs),
            &h_masks,
        )
    });

    let td_losses = Tensor::stack(
        &qs.iter().map(|q| q - &q_targ).collect::<Vec<_>>(),
        0,
    )
    .mean_dim(&[0], false, Kind::Float);

    let target_entropy = sac_config
        .target_entropy
        .unwrap_or_else(|| pol.action_dim() as f64);
    let losses = SacLosses {
        pol_loss: policy_loss(&alpha, &sampled_llh, sampled_qs, sac_config)?,
        qf_losses: array_init::array_init(|i| q_loss(&qs[i], &q_targ)),
        alpha_loss: temperature_loss(log_alpha, &sampled_llh, target_entropy),
    };

    let mut group = LogGroup::new(logger, "r2d2_sac");
    log_losses(&mut group, &losses, &alpha, &sampled_llh, &q_targ)?;
    group.log_scalar("td_abs_mean", scalar(&td_losses.abs().mean(Kind::Float)))?;
    Ok(R2d2SacLosses { losses, td_losses })
}

/// Sample actions for a sequence of per-step distribution parameters.
///
/// # Args
/// * `params` - Parameters with batch shape `[1, B]` for each step.
/// * `detach_llh` - Evaluate the log likelihood of detached samples.
///
/// # Returns
/// Actions `[S, T, B, ..]` and their log likelihoods `[S, T, B]`.
fn sample_steps<D: ParameterizedDistribution>(
    pd: &D,
    params: &[D::Params],
    sampling: i64,
    detach_llh: bool,
) -> (Tensor, Tensor) {
    let (acs, llh): (Vec<_>, Vec<_>) = params
        .iter()
        .map(|step_params| {
            let acs = pd.sample(step_params, &[sampling]);
            let llh = if detach_llh {
                pd.log_likelihood(&acs.detach(), step_params)
            } else {
                pd.log_likelihood(&acs, step_params)
            };
            (acs, llh)
        })
        .unzip();
    (Tensor::cat(&acs, 1), Tensor::cat(&llh, 1))
}

/// Burn-in inputs of a Q-function.
struct WarmUp<'a> {
    obs: &'a Tensor,
    acs: Tensor,
    h_masks: &'a Tensor,
}

/// Evaluate a Q-function on the training window after warming up its state.
///
/// The state after the burn-in window is computed without gradient tracking and detached.
fn warm_forward<Q: StateActionValue>(
    qf: &Q,
    stored_state: &RecurrentState,
    warm_up: Option<WarmUp>,
    obs: &Tensor,
    acs: &Tensor,
    h_masks: &Tensor,
) -> Tensor {
    let mut state = Some(stored_state.shallow_clone());
    if let Some(warm_up) = warm_up {
        state = tch::no_grad(|| {
            qf.forward(warm_up.obs, &warm_up.acs, state.as_ref(), Some(warm_up.h_masks))
                .state
        })
        .map(|state| state.detach());
    }
    qf.forward(obs, acs, state.as_ref(), Some(h_masks)).value
}
