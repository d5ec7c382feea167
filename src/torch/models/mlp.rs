//! Feed-forward models built on [`Mlp`].
use super::{
    DeterministicHead, DistributionHead, ParamsOf, Policy, PolicyOutput, RecurrentState,
    StateActionValue, StateValue, ValueOutput,
};
use crate::error::LossError;
use crate::torch::modules::{Mlp, MlpConfig};
use serde::{Deserialize, Serialize};
use tch::{nn::Module, nn::Path, Kind, Tensor};

/// Feed-forward policy: an MLP trunk followed by a distribution head.
#[derive(Debug)]
pub struct MlpPolicy<H> {
    mlp: Mlp,
    head: H,
}

/// Feed-forward deterministic policy with optional exploration noise.
pub type DeterministicPolicy = MlpPolicy<DeterministicHead>;

impl<H: DistributionHead> MlpPolicy<H> {
    pub fn new(vs: &Path, obs_dim: usize, config: &MlpConfig, head: H) -> Self {
        let mlp = config.build(&(vs / "mlp"), obs_dim, head.num_features());
        Self { mlp, head }
    }
}

impl<H: DistributionHead> Policy for MlpPolicy<H> {
    type Pd = H::Pd;

    fn pd(&self) -> &Self::Pd {
        self.head.pd()
    }

    fn action_dim(&self) -> i64 {
        self.head.action_dim()
    }

    fn forward(
        &self,
        obs: &Tensor,
        _state: Option<&RecurrentState>,
        _h_masks: Option<&Tensor>,
    ) -> PolicyOutput<ParamsOf<Self>> {
        PolicyOutput {
            params: self.head.params(&self.mlp.forward(obs), true),
            state: None,
        }
    }

    fn forward_no_noise(
        &self,
        obs: &Tensor,
        _state: Option<&RecurrentState>,
        _h_masks: Option<&Tensor>,
    ) -> PolicyOutput<ParamsOf<Self>> {
        PolicyOutput {
            params: self.head.params(&self.mlp.forward(obs), false),
            state: None,
        }
    }
}

/// Feed-forward state value function.
#[derive(Debug)]
pub struct MlpStateValue {
    mlp: Mlp,
}

impl MlpStateValue {
    pub fn new(vs: &Path, obs_dim: usize, config: &MlpConfig) -> Self {
        Self {
            mlp: config.build(&(vs / "mlp"), obs_dim, 1),
        }
    }
}

impl StateValue for MlpStateValue {
    fn forward(
        &self,
        obs: &Tensor,
        _state: Option<&RecurrentState>,
        _h_masks: Option<&Tensor>,
    ) -> ValueOutput {
        ValueOutput {
            value: self.mlp.forward(obs).squeeze_dim(-1),
            state: None,
        }
    }
}

/// Random shooting maximization over a box action space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomShootingConfig {
    /// Number of uniformly sampled candidate actions per observation.
    pub num_candidates: i64,
    /// Lower bound of every action element.
    pub low: f64,
    /// Upper bound of every action element.
    pub high: f64,
}

impl Default for RandomShootingConfig {
    fn default() -> Self {
        Self {
            num_candidates: 100,
            low: -1.0,
            high: 1.0,
        }
    }
}

/// Feed-forward Q-function over continuous actions.
///
/// The observation and action are concatenated along the feature dimension.
#[derive(Debug)]
pub struct MlpStateActionValue {
    mlp: Mlp,
    action_dim: i64,
    pub shooting: RandomShootingConfig,
}

impl MlpStateActionValue {
    #[allow(clippy::cast_possible_wrap)]
    pub fn new(vs: &Path, obs_dim: usize, action_dim: usize, config: &MlpConfig) -> Self {
        Self {
            mlp: config.build(&(vs / "mlp"), obs_dim + action_dim, 1),
            action_dim: action_dim as i64,
            shooting: RandomShootingConfig::default(),
        }
    }
}

impl StateActionValue for MlpStateActionValue {
    fn forward(
        &self,
        obs: &Tensor,
        acs: &Tensor,
        _state: Option<&RecurrentState>,
        _h_masks: Option<&Tensor>,
    ) -> ValueOutput {
        let input = Tensor::cat(&[obs, &acs.to_kind(obs.kind())], -1);
        ValueOutput {
            value: self.mlp.forward(&input).squeeze_dim(-1),
            state: None,
        }
    }

    /// Approximate maximization by evaluating uniformly sampled candidate actions.
    fn max(&self, obs: &Tensor) -> Result<(Tensor, Tensor), LossError> {
        let RandomShootingConfig {
            num_candidates,
            low,
            high,
        } = self.shooting;
        if num_candidates < 1 || low > high {
            return Err(LossError::InvalidConfig(format!(
                "random shooting with {} candidates over [{}, {}]",
                num_candidates, low, high
            )));
        }
        let mut batch_shape = obs.size();
        batch_shape.pop();

        // [N, BATCH.., A]
        let mut candidate_shape = vec![num_candidates];
        candidate_shape.extend(&batch_shape);
        candidate_shape.push(self.action_dim);
        let candidates =
            Tensor::rand(&candidate_shape, (obs.kind(), obs.device())) * (high - low) + low;

        let mut obs_shape = obs.size();
        obs_shape.insert(0, num_candidates);
        let values = self
            .forward(&obs.expand(&obs_shape, false), &candidates, None, None)
            .value;
        let (max_values, indices) = values.max_dim(0, false);

        let mut index_shape = vec![1];
        index_shape.extend(&batch_shape);
        index_shape.push(self.action_dim);
        let best = candidates
            .gather(
                0,
                &indices.unsqueeze(0).unsqueeze(-1).expand(&index_shape, false),
                false,
            )
            .squeeze_dim(0);
        Ok((max_values, best))
    }
}

/// Feed-forward Q-function over a discrete action set.
///
/// The network outputs one value per action; actions are integer indices without an element
/// dimension.
#[derive(Debug)]
pub struct MlpDiscreteQ {
    mlp: Mlp,
}

impl MlpDiscreteQ {
    pub fn new(vs: &Path, obs_dim: usize, num_actions: usize, config: &MlpConfig) -> Self {
        Self {
            mlp: config.build(&(vs / "mlp"), obs_dim, num_actions),
        }
    }
}

impl StateActionValue for MlpDiscreteQ {
    fn forward(
        &self,
        obs: &Tensor,
        acs: &Tensor,
        _state: Option<&RecurrentState>,
        _h_masks: Option<&Tensor>,
    ) -> ValueOutput {
        let all_values = self.mlp.forward(obs);
        let value = all_values
            .gather(-1, &acs.to_kind(Kind::Int64).unsqueeze(-1), false)
            .squeeze_dim(-1);
        ValueOutput { value, state: None }
    }

    fn max(&self, obs: &Tensor) -> Result<(Tensor, Tensor), LossError> {
        Ok(self.mlp.forward(obs).max_dim(-1, false))
    }
}
