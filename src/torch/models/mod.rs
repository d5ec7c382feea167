//! Policy, value and dynamics models
//!
//! Models are borrowed immutably by the loss functions.
//! Recurrent models take their state as an explicit argument and return the updated state
//! alongside their outputs, so one model can be shared between loss evaluations.
//!
//! # Input Shapes
//! Feed-forward models accept inputs with any number of leading batch dimensions.
//! Recurrent models take time-major sequences `[T, B, ..]` together with an optional
//! `h_masks` tensor of shape `[T, B]` that marks episode starts.
mod dynamics;
mod heads;
mod lstm;
mod mlp;

pub use dynamics::GaussianDynamics;
pub use heads::{CategoricalHead, DeterministicHead, DistributionHead, GaussianHead};
pub use lstm::{LstmPolicy, LstmStateActionValue};
pub use mlp::{
    DeterministicPolicy, MlpDiscreteQ, MlpPolicy, MlpStateActionValue, MlpStateValue,
    RandomShootingConfig,
};

use super::distributions::ParameterizedDistribution;
use crate::error::LossError;
use tch::{Device, IndexOp, Kind, Tensor};

/// Recurrent state of an LSTM-backed model.
#[derive(Debug)]
pub struct RecurrentState {
    /// Hidden state. Shape `[B, H]`.
    pub hidden: Tensor,
    /// Cell state. Shape `[B, H]`.
    pub cell: Tensor,
}

impl RecurrentState {
    pub const fn new(hidden: Tensor, cell: Tensor) -> Self {
        Self { hidden, cell }
    }

    /// All-zero state for a new batch of sequences.
    pub fn zeros(batch_size: i64, hidden_size: i64, device: Device) -> Self {
        let hidden = Tensor::zeros(&[batch_size, hidden_size], (Kind::Float, device));
        let cell = hidden.zeros_like();
        Self { hidden, cell }
    }

    /// Read the state stored for the first time step of a batch.
    ///
    /// # Args
    /// * `stored` - Stored states of shape `[T, B, 2, H]`.
    ///     Index 0 on the third dimension is the hidden state and index 1 the cell state.
    pub fn from_stored(stored: &Tensor) -> Self {
        Self {
            hidden: stored.i((0, .., 0)),
            cell: stored.i((0, .., 1)),
        }
    }

    /// A copy of the state detached from the computation graph.
    pub fn detach(&self) -> Self {
        Self {
            hidden: self.hidden.detach(),
            cell: self.cell.detach(),
        }
    }

    pub fn shallow_clone(&self) -> Self {
        Self {
            hidden: self.hidden.shallow_clone(),
            cell: self.cell.shallow_clone(),
        }
    }

    /// Zero the state of each batch element where `h_mask` is 1.
    ///
    /// # Args
    /// * `h_mask` - Episode start mask of shape `[B]`.
    pub fn masked(&self, h_mask: &Tensor) -> Self {
        let keep = (h_mask.ones_like() - h_mask)
            .to_kind(self.hidden.kind())
            .unsqueeze(-1);
        Self {
            hidden: &self.hidden * &keep,
            cell: &self.cell * &keep,
        }
    }

    /// Batch size of the state.
    pub fn batch_size(&self) -> i64 {
        self.hidden.size()[0]
    }
}

/// Distribution parameters type of a policy.
pub type ParamsOf<P> = <<P as Policy>::Pd as ParameterizedDistribution>::Params;

/// Output of a policy forward pass.
#[derive(Debug)]
pub struct PolicyOutput<D> {
    /// Action distribution parameters.
    pub params: D,
    /// Recurrent state after the last input step. `None` for feed-forward policies.
    pub state: Option<RecurrentState>,
}

/// Output of a value function forward pass.
#[derive(Debug)]
pub struct ValueOutput {
    /// Value estimates with the leading (batch) shape of the input.
    pub value: Tensor,
    pub state: Option<RecurrentState>,
}

/// Output of a dynamics model forward pass.
#[derive(Debug)]
pub struct DynamicsOutput {
    /// Prediction sampled from the model.
    pub prediction: Tensor,
    /// Mean of the predictive distribution.
    pub mean: Tensor,
    pub state: Option<RecurrentState>,
}

/// A policy: maps observations to action distribution parameters.
pub trait Policy {
    /// Action distribution
    type Pd: ParameterizedDistribution;

    /// The action distribution object.
    fn pd(&self) -> &Self::Pd;

    /// Number of elements in a single action.
    ///
    /// The default target entropy of soft actor-critic is derived from this value.
    fn action_dim(&self) -> i64;

    /// Whether the policy is recurrent.
    fn is_recurrent(&self) -> bool {
        false
    }

    /// Recurrent state at the start of new sequences. `None` for feed-forward policies.
    fn initial_state(&self, _batch_size: i64) -> Option<RecurrentState> {
        None
    }

    /// Compute action distribution parameters.
    ///
    /// # Args
    /// * `obs` - Observations. Time-major `[T, B, ..]` for recurrent policies.
    /// * `state` - Recurrent state before the first step. Uses the initial state if `None`.
    /// * `h_masks` - Episode start masks `[T, B]`. Ignored by feed-forward policies.
    fn forward(
        &self,
        obs: &Tensor,
        state: Option<&RecurrentState>,
        h_masks: Option<&Tensor>,
    ) -> PolicyOutput<ParamsOf<Self>>;

    /// Compute action distribution parameters without exploration noise.
    fn forward_no_noise(
        &self,
        obs: &Tensor,
        state: Option<&RecurrentState>,
        h_masks: Option<&Tensor>,
    ) -> PolicyOutput<ParamsOf<Self>> {
        self.forward(obs, state, h_masks)
    }
}

/// A state value function (V-function).
pub trait StateValue {
    fn is_recurrent(&self) -> bool {
        false
    }

    fn initial_state(&self, _batch_size: i64) -> Option<RecurrentState> {
        None
    }

    /// Estimate the value of each observation.
    fn forward(
        &self,
        obs: &Tensor,
        state: Option<&RecurrentState>,
        h_masks: Option<&Tensor>,
    ) -> ValueOutput;
}

/// A state-action value function.
///
/// Used for Q-functions as well as for discriminators and advantage functions.
pub trait StateActionValue {
    fn is_recurrent(&self) -> bool {
        false
    }

    fn initial_state(&self, _batch_size: i64) -> Option<RecurrentState> {
        None
    }

    /// Estimate the value of each observation-action pair.
    ///
    /// `obs` and `acs` share the same leading dimensions.
    fn forward(
        &self,
        obs: &Tensor,
        acs: &Tensor,
        state: Option<&RecurrentState>,
        h_masks: Option<&Tensor>,
    ) -> ValueOutput;

    /// The maximum value over actions at each observation and the maximizing action.
    fn max(&self, _obs: &Tensor) -> Result<(Tensor, Tensor), LossError> {
        Err(LossError::Unsupported(
            "maximization over actions for this Q-function",
        ))
    }
}

/// A dynamics model: predicts the next state (or reward) from an observation and action.
pub trait Dynamics {
    fn is_recurrent(&self) -> bool {
        false
    }

    fn initial_state(&self, _batch_size: i64) -> Option<RecurrentState> {
        None
    }

    fn forward(
        &self,
        obs: &Tensor,
        acs: &Tensor,
        state: Option<&RecurrentState>,
        h_masks: Option<&Tensor>,
    ) -> DynamicsOutput;
}
