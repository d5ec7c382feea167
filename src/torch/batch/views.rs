//! Typed views of a [`Batch`] for each family of loss functions.
//!
//! Each view reads its required fields from the batch and checks their leading dimensions.
//! Views hold shallow clones of the batch tensors.
use super::{
    check_leading, fields, get_leading, q_hidden_field, target_q_hidden_field, Batch, BatchError,
};
use crate::torch::models::RecurrentState;
use tch::{Kind, Tensor};

/// Step masks for a (possibly recurrent) model.
#[derive(Debug)]
pub struct Masks {
    /// Episode start masks passed to recurrent models. `None` for feed-forward models.
    pub h_masks: Option<Tensor>,
    /// Output weights; 0 on padding steps. All ones for feed-forward models.
    pub out_masks: Tensor,
}

impl Masks {
    /// Read the masks for steps with leading shape `step_shape`.
    ///
    /// Recurrent models require `h_masks` and `out_masks` in the batch.
    /// Feed-forward models get a unit output mask.
    pub fn from_batch(
        batch: &Batch,
        recurrent: bool,
        step_shape: &[i64],
    ) -> Result<Self, BatchError> {
        if recurrent {
            Ok(Self {
                h_masks: Some(get_step_field(batch, fields::H_MASKS, step_shape)?),
                out_masks: get_step_field(batch, fields::OUT_MASKS, step_shape)?,
            })
        } else {
            // Feed-forward batches may still carry masks; they are not needed.
            let device = batch.get(fields::OBS)?.device();
            Ok(Self {
                h_masks: None,
                out_masks: Tensor::ones(step_shape, (Kind::Float, device)),
            })
        }
    }

    /// Episode start masks as an optional reference.
    pub fn h_masks(&self) -> Option<&Tensor> {
        self.h_masks.as_ref()
    }

    /// Zero the entries of `x` at padding steps (where `out_masks` is 0).
    ///
    /// `x` must have the step shape as its leading dimensions.
    /// Padding values (possibly NaN) must not reach the graph, even in masked terms,
    /// or their gradients become NaN.
    /// Feed-forward masks have no padding and `x` is returned as is.
    pub fn fill_padding(&self, x: &Tensor) -> Tensor {
        if self.h_masks.is_none() {
            return x.shallow_clone();
        }
        let mut shape = self.out_masks.size();
        shape.resize(x.dim(), 1);
        x.masked_fill(&self.out_masks.eq(0.0).reshape(&shape), 0.0)
    }
}

/// Get a per-step field that must have exactly the shape `step_shape`.
fn get_step_field(batch: &Batch, name: &str, step_shape: &[i64]) -> Result<Tensor, BatchError> {
    let tensor = batch.get(name)?;
    if tensor.size() != step_shape {
        return Err(BatchError::ShapeMismatch {
            field: name.into(),
            expected: step_shape.to_vec(),
            actual: tensor.size(),
        });
    }
    Ok(tensor.shallow_clone())
}

/// Leading step shape of observations: `[T, B]` for recurrent models and `[B]` otherwise.
fn observation_step_shape(batch: &Batch, recurrent: bool) -> Result<Vec<i64>, BatchError> {
    let obs = batch.get(fields::OBS)?;
    let n = if recurrent { 2 } else { 1 };
    let size = obs.size();
    if size.len() < n {
        return Err(BatchError::ShapeMismatch {
            field: fields::OBS.into(),
            expected: vec![-1; n],
            actual: size,
        });
    }
    Ok(size[..n].to_vec())
}

/// Batch for policy gradient losses.
#[derive(Debug)]
pub struct PolicyBatch {
    pub obs: Tensor,
    pub acs: Tensor,
    pub advs: Tensor,
    pub masks: Masks,
}

impl PolicyBatch {
    pub fn from_batch(batch: &Batch, recurrent: bool) -> Result<Self, BatchError> {
        let advs = batch.get(fields::ADVS)?;
        let step_shape = advs.size();
        let masks = Masks::from_batch(batch, recurrent, &step_shape)?;
        Ok(Self {
            obs: masks.fill_padding(&get_leading(batch, fields::OBS, &step_shape)?),
            acs: masks.fill_padding(&get_leading(batch, fields::ACS, &step_shape)?),
            advs: masks.fill_padding(advs),
            masks,
        })
    }
}

/// Batch of observations only.
#[derive(Debug)]
pub struct ObservationBatch {
    pub obs: Tensor,
    pub masks: Masks,
}

impl ObservationBatch {
    pub fn from_batch(batch: &Batch, recurrent: bool) -> Result<Self, BatchError> {
        let step_shape = observation_step_shape(batch, recurrent)?;
        let masks = Masks::from_batch(batch, recurrent, &step_shape)?;
        Ok(Self {
            obs: masks.fill_padding(batch.get(fields::OBS)?),
            masks,
        })
    }
}

/// Batch of observation-action pairs.
#[derive(Debug)]
pub struct ObsActionBatch {
    pub obs: Tensor,
    pub acs: Tensor,
    pub masks: Masks,
}

impl ObsActionBatch {
    pub fn from_batch(batch: &Batch, recurrent: bool) -> Result<Self, BatchError> {
        let step_shape = observation_step_shape(batch, recurrent)?;
        let masks = Masks::from_batch(batch, recurrent, &step_shape)?;
        Ok(Self {
            obs: masks.fill_padding(batch.get(fields::OBS)?),
            acs: masks.fill_padding(&get_leading(batch, fields::ACS, &step_shape)?),
            masks,
        })
    }
}

/// Batch of flat transitions `(s, a, r, s', done)` with leading dimension `[B]`.
#[derive(Debug)]
pub struct TransitionBatch {
    pub obs: Tensor,
    pub acs: Tensor,
    pub rews: Tensor,
    pub next_obs: Tensor,
    pub dones: Tensor,
}

impl TransitionBatch {
    pub fn from_batch(batch: &Batch) -> Result<Self, BatchError> {
        let rews = batch.get(fields::REWS)?;
        let step_shape = rews.size();
        Ok(Self {
            obs: get_leading(batch, fields::OBS, &step_shape)?,
            acs: get_leading(batch, fields::ACS, &step_shape)?,
            rews: rews.shallow_clone(),
            next_obs: get_leading(batch, fields::NEXT_OBS, &step_shape)?,
            dones: get_step_field(batch, fields::DONES, &step_shape)?,
        })
    }
}

/// Batch of flat state transitions without rewards.
#[derive(Debug)]
pub struct StateTransitionBatch {
    pub obs: Tensor,
    pub acs: Tensor,
    pub next_obs: Tensor,
    pub dones: Tensor,
}

impl StateTransitionBatch {
    pub fn from_batch(batch: &Batch) -> Result<Self, BatchError> {
        let dones = batch.get(fields::DONES)?;
        let step_shape = dones.size();
        Ok(Self {
            obs: get_leading(batch, fields::OBS, &step_shape)?,
            acs: get_leading(batch, fields::ACS, &step_shape)?,
            next_obs: get_leading(batch, fields::NEXT_OBS, &step_shape)?,
            dones: dones.shallow_clone(),
        })
    }
}

/// Batch for fitting a state value function to returns.
#[derive(Debug)]
pub struct ValueBatch {
    pub obs: Tensor,
    pub rets: Tensor,
    /// Value estimates cached when the batch was collected. Read only if requested.
    pub old_vs: Option<Tensor>,
    pub masks: Masks,
}

impl ValueBatch {
    pub fn from_batch(
        batch: &Batch,
        recurrent: bool,
        with_old_values: bool,
    ) -> Result<Self, BatchError> {
        let rets = batch.get(fields::RETS)?;
        let step_shape = rets.size();
        let masks = Masks::from_batch(batch, recurrent, &step_shape)?;
        let old_vs = if with_old_values {
            Some(masks.fill_padding(&get_step_field(batch, fields::VS, &step_shape)?))
        } else {
            None
        };
        Ok(Self {
            obs: masks.fill_padding(&get_leading(batch, fields::OBS, &step_shape)?),
            rets: masks.fill_padding(rets),
            old_vs,
            masks,
        })
    }
}

/// Batch for fitting a dynamics model.
#[derive(Debug)]
pub struct DynamicsBatch {
    pub obs: Tensor,
    pub acs: Tensor,
    /// Prediction target with a trailing feature dimension.
    pub target: Tensor,
    pub masks: Masks,
}

impl DynamicsBatch {
    /// # Args
    /// * `target_field` - Name of the field holding the prediction target.
    /// * `difference` - Predict the difference between the target and `obs`.
    pub fn from_batch(
        batch: &Batch,
        recurrent: bool,
        target_field: &str,
        difference: bool,
    ) -> Result<Self, BatchError> {
        let step_shape = observation_step_shape(batch, recurrent)?;
        let obs = batch.get(fields::OBS)?;
        let mut target = get_leading(batch, target_field, &step_shape)?;
        if target.dim() == step_shape.len() {
            // Scalar targets (rewards) get a unit feature dimension
            target = target.unsqueeze(-1);
        }
        if difference {
            let obs_size = obs.size();
            if target.size() != obs_size {
                return Err(BatchError::ShapeMismatch {
                    field: target_field.into(),
                    expected: obs_size,
                    actual: target.size(),
                });
            }
            target = target - obs;
        }
        let masks = Masks::from_batch(batch, recurrent, &step_shape)?;
        Ok(Self {
            obs: masks.fill_padding(obs),
            acs: masks.fill_padding(&get_leading(batch, fields::ACS, &step_shape)?),
            target: masks.fill_padding(&target),
            masks,
        })
    }
}

/// Time-major sequence batch for recurrent soft actor-critic with burn-in.
///
/// The first `burn_in_length` steps only warm up the recurrent states.
/// The following `train_length = T - burn_in_length - 1` steps are trained on.
/// The final step supplies the episode start mask for the last next-step policy evaluation.
#[derive(Debug)]
pub struct SequenceBatch<const N: usize> {
    /// Observations `[T, B, ..]`
    pub obs: Tensor,
    pub acs: Tensor,
    /// Rewards `[T, B]`
    pub rews: Tensor,
    pub next_obs: Tensor,
    pub dones: Tensor,
    pub h_masks: Tensor,
    /// Policy state at the first step.
    pub policy_state: RecurrentState,
    /// State of each Q-function at the first step.
    pub q_states: [RecurrentState; N],
    /// State of each target Q-function at the first step.
    pub target_q_states: [RecurrentState; N],
    pub burn_in_length: i64,
    pub train_length: i64,
}

impl<const N: usize> SequenceBatch<N> {
    pub fn from_batch(batch: &Batch, burn_in_length: usize) -> Result<Self, BatchError> {
        let rews = batch.get(fields::REWS)?;
        let step_shape = rews.size();
        if step_shape.len() != 2 {
            return Err(BatchError::ShapeMismatch {
                field: fields::REWS.into(),
                expected: vec![-1, -1],
                actual: step_shape,
            });
        }
        let length = step_shape[0];
        // Burn-in lengths beyond i64 are necessarily too long.
        let burn_in = i64::try_from(burn_in_length).unwrap_or(i64::MAX);
        if length < burn_in.saturating_add(2) {
            return Err(BatchError::SequenceTooShort {
                length,
                burn_in_length,
            });
        }

        let read_state = |name: &str| -> Result<RecurrentState, BatchError> {
            let stored = batch.get(name)?;
            check_leading(name, stored, &step_shape)?;
            let size = stored.size();
            if size.len() != 4 || size[2] != 2 {
                return Err(BatchError::ShapeMismatch {
                    field: name.into(),
                    expected: vec![step_shape[0], step_shape[1], 2, -1],
                    actual: size,
                });
            }
            Ok(RecurrentState::from_stored(stored))
        };

        Ok(Self {
            obs: get_leading(batch, fields::OBS, &step_shape)?,
            acs: get_leading(batch, fields::ACS, &step_shape)?,
            rews: rews.shallow_clone(),
            next_obs: get_leading(batch, fields::NEXT_OBS, &step_shape)?,
            dones: get_step_field(batch, fields::DONES, &step_shape)?,
            h_masks: get_step_field(batch, fields::H_MASKS, &step_shape)?,
            policy_state: read_state(fields::HS)?,
            q_states: array_init::try_array_init(|i| read_state(&q_hidden_field(i)))?,
            target_q_states: array_init::try_array_init(|i| {
                read_state(&target_q_hidden_field(i))
            })?,
            burn_in_length: burn_in,
            train_length: length - burn_in - 1,
        })
    }

    /// Slice the burn-in window `[0, burn_in_length)` of a time-major tensor.
    pub fn burn_in(&self, x: &Tensor) -> Tensor {
        x.narrow(0, 0, self.burn_in_length)
    }

    /// Slice the training window `[burn_in_length, T - 1)` of a time-major tensor.
    pub fn train(&self, x: &Tensor) -> Tensor {
        x.narrow(0, self.burn_in_length, self.train_length)
    }

    /// Slice the training window shifted one step forward `[burn_in_length + 1, T)`.
    pub fn train_next(&self, x: &Tensor) -> Tensor {
        x.narrow(0, self.burn_in_length + 1, self.train_length)
    }

    /// Slice the burn-in window shifted one step forward `[1, burn_in_length + 1)`.
    pub fn burn_in_next(&self, x: &Tensor) -> Tensor {
        x.narrow(0, 1, self.burn_in_length)
    }
}
