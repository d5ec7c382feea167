//! Recurrent models built on [`Lstm`].
use super::{
    DistributionHead, ParamsOf, Policy, PolicyOutput, RecurrentState, StateActionValue,
    ValueOutput,
};
use crate::torch::distributions::ParameterizedDistribution;
use crate::torch::modules::{IterativeModule, Lstm, Mlp, MlpConfig};
use tch::{nn::Module, nn::Path, Tensor};

/// Recurrent policy: an LSTM followed by an MLP and a distribution head.
#[derive(Debug)]
pub struct LstmPolicy<H> {
    lstm: Lstm,
    mlp: Mlp,
    head: H,
}

impl<H: DistributionHead> LstmPolicy<H> {
    pub fn new(vs: &Path, obs_dim: usize, hidden_size: usize, config: &MlpConfig, head: H) -> Self {
        let lstm = Lstm::new(&(vs / "lstm"), obs_dim, hidden_size, true);
        let mlp = config.build(&(vs / "mlp"), hidden_size, head.num_features());
        Self { lstm, mlp, head }
    }

    fn forward_explore(
        &self,
        obs: &Tensor,
        state: Option<&RecurrentState>,
        h_masks: Option<&Tensor>,
        explore: bool,
    ) -> PolicyOutput<<H::Pd as ParameterizedDistribution>::Params> {
        let (features, state) = self.lstm.unroll(obs, state, h_masks);
        PolicyOutput {
            params: self.head.params(&self.mlp.forward(&features), explore),
            state: Some(state),
        }
    }
}

impl<H: DistributionHead> Policy for LstmPolicy<H> {
    type Pd = H::Pd;

    fn pd(&self) -> &Self::Pd {
        self.head.pd()
    }

    fn action_dim(&self) -> i64 {
        self.head.action_dim()
    }

    fn is_recurrent(&self) -> bool {
        true
    }

    fn initial_state(&self, batch_size: i64) -> Option<RecurrentState> {
        Some(self.lstm.initial_state(batch_size))
    }

    fn forward(
        &self,
        obs: &Tensor,
        state: Option<&RecurrentState>,
        h_masks: Option<&Tensor>,
    ) -> PolicyOutput<ParamsOf<Self>> {
        self.forward_explore(obs, state, h_masks, true)
    }

    fn forward_no_noise(
        &self,
        obs: &Tensor,
        state: Option<&RecurrentState>,
        h_masks: Option<&Tensor>,
    ) -> PolicyOutput<ParamsOf<Self>> {
        self.forward_explore(obs, state, h_masks, false)
    }
}

/// Recurrent Q-function over continuous actions.
#[derive(Debug)]
pub struct LstmStateActionValue {
    lstm: Lstm,
    mlp: Mlp,
}

impl LstmStateActionValue {
    pub fn new(
        vs: &Path,
        obs_dim: usize,
        action_dim: usize,
        hidden_size: usize,
        config: &MlpConfig,
    ) -> Self {
        Self {
            lstm: Lstm::new(&(vs / "lstm"), obs_dim + action_dim, hidden_size, true),
            mlp: config.build(&(vs / "mlp"), hidden_size, 1),
        }
    }
}

impl StateActionValue for LstmStateActionValue {
    fn is_recurrent(&self) -> bool {
        true
    }

    fn initial_state(&self, batch_size: i64) -> Option<RecurrentState> {
        Some(self.lstm.initial_state(batch_size))
    }

    fn forward(
        &self,
        obs: &Tensor,
        acs: &Tensor,
        state: Option<&RecurrentState>,
        h_masks: Option<&Tensor>,
    ) -> ValueOutput {
        let input = Tensor::cat(&[obs, &acs.to_kind(obs.kind())], -1);
        let (features, state) = self.lstm.unroll(&input, state, h_masks);
        ValueOutput {
            value: self.mlp.forward(&features).squeeze_dim(-1),
            state: Some(state),
        }
    }
}
