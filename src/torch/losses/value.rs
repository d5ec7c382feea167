//! Regression losses for value functions and dynamics models
use super::{masked_mean, scalar};
use crate::error::LossError;
use crate::logging::{LogGroup, StatsLogger};
use crate::torch::batch::{fields, Batch, DynamicsBatch, ValueBatch};
use crate::torch::models::{Dynamics, StateValue};
use serde::{Deserialize, Serialize};
use tch::{Kind, Tensor};

/// Configuration for [`monte_carlo`].
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonteCarloConfig {
    /// Maximum change of the value estimates from the stored values when clipping.
    pub clip_param: f64,
    /// Clip the value estimates around the stored values `vs`.
    pub clip: bool,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            clip_param: 0.2,
            clip: false,
        }
    }
}

/// Regression of a state value function onto Monte Carlo returns.
///
/// `0.5 mean((V(obs) - rets)² * mask)`
///
/// With clipping, the elementwise loss is the larger of the unclipped error and the error of
/// `vs + clamp(V(obs) - vs, -clip_param, clip_param)` where `vs` are the stored estimates.
pub fn monte_carlo<V: StateValue>(
    vf: &V,
    batch: &Batch,
    config: &MonteCarloConfig,
    logger: &mut dyn StatsLogger,
) -> Result<Tensor, LossError> {
    let batch = ValueBatch::from_batch(batch, vf.is_recurrent(), config.clip)?;
    let mask = &batch.masks.out_masks;
    let vs = vf.forward(&batch.obs, None, batch.masks.h_masks()).value;

    let unclipped = (&vs - &batch.rets).square();
    let elementwise = match &batch.old_vs {
        Some(old_vs) => {
            let clipped_vs =
                old_vs + (&vs - old_vs).clamp(-config.clip_param, config.clip_param);
            unclipped.max_other(&(clipped_vs - &batch.rets).square())
        }
        None => unclipped,
    };
    let loss = masked_mean(&elementwise, mask) * 0.5;

    let mut group = LogGroup::new(logger, "monte_carlo");
    group.log_scalar("loss", scalar(&loss))?;
    group.log_scalar("v_mean", scalar(&masked_mean(&vs, mask)))?;
    Ok(loss)
}

/// Prediction target of a dynamics model.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DynamicsTarget {
    /// The next observation (or its difference from the current observation).
    NextObs,
    /// The reward.
    Rews,
}

impl Default for DynamicsTarget {
    fn default() -> Self {
        Self::NextObs
    }
}

impl DynamicsTarget {
    /// Batch field holding the target.
    pub const fn field(self) -> &'static str {
        match self {
            Self::NextObs => fields::NEXT_OBS,
            Self::Rews => fields::REWS,
        }
    }
}

/// Configuration for [`dynamics`].
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DynamicsConfig {
    pub target: DynamicsTarget,
    /// Predict the change `next_obs - obs` instead of `next_obs`.
    ///
    /// Has no effect when predicting rewards.
    pub td: bool,
}

impl Default for DynamicsConfig {
    fn default() -> Self {
        Self {
            target: DynamicsTarget::default(),
            td: true,
        }
    }
}

/// Squared error loss of a dynamics model.
///
/// `0.5 mean(mean_lastdim((prediction - target)²) * mask)`
pub fn dynamics<M: Dynamics>(
    dm: &M,
    batch: &Batch,
    config: &DynamicsConfig,
    logger: &mut dyn StatsLogger,
) -> Result<Tensor, LossError> {
    let difference = config.td && config.target == DynamicsTarget::NextObs;
    let batch = DynamicsBatch::from_batch(
        batch,
        dm.is_recurrent(),
        config.target.field(),
        difference,
    )?;
    let mask = &batch.masks.out_masks;
    let prediction = dm
        .forward(&batch.obs, &batch.acs, None, batch.masks.h_masks())
        .prediction;

    let errors = (prediction - &batch.target)
        .square()
        .mean_dim(&[-1], false, Kind::Float);
    let loss = masked_mean(&errors, mask) * 0.5;

    let mut group = LogGroup::new(logger, "dynamics");
    group.log_scalar("loss", scalar(&loss))?;
    Ok(loss)
}
