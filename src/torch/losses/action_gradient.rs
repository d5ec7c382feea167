//! Deterministic policy gradient through a Q-function
use super::{check_sampling, expand_samples, scalar};
use crate::error::LossError;
use crate::logging::{LogGroup, StatsLogger};
use crate::torch::batch::{Batch, ObservationBatch};
use crate::torch::distributions::ParameterizedDistribution;
use crate::torch::models::{Policy, StateActionValue};
use serde::{Deserialize, Serialize};
use tch::{Kind, Tensor};

/// Configuration for [`ag`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgConfig {
    /// Number of actions sampled per observation.
    pub sampling: i64,
    /// Evaluate the policy without exploration noise.
    pub no_noise: bool,
}

impl Default for AgConfig {
    fn default() -> Self {
        Self {
            sampling: 1,
            no_noise: false,
        }
    }
}

/// Action gradient loss: `-mean(mean_a Q(obs, a))` with `a ~ π(obs)` (reparameterized).
///
/// The gradient flows into the policy through the sampled actions, as in DDPG and SVG(0).
pub fn ag<P, Q>(
    pol: &P,
    qf: &Q,
    batch: &Batch,
    config: &AgConfig,
    logger: &mut dyn StatsLogger,
) -> Result<Tensor, LossError>
where
    P: Policy,
    Q: StateActionValue,
{
    check_sampling(config.sampling)?;
    let batch = ObservationBatch::from_batch(batch, false)?;
    let params = if config.no_noise {
        pol.forward_no_noise(&batch.obs, None, None).params
    } else {
        pol.forward(&batch.obs, None, None).params
    };
    let acs = pol.pd().sample(&params, &[config.sampling]);
    let sampled_obs = expand_samples(&batch.obs, config.sampling);
    let q = qf
        .forward(&sampled_obs, &acs, None, None)
        .value
        .mean_dim(&[0], false, Kind::Float);
    let loss = q.mean(Kind::Float).neg();

    let mut group = LogGroup::new(logger, "ag");
    group.log_scalar("loss", scalar(&loss))?;
    Ok(loss)
}
