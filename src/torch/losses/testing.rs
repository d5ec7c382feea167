//! Loss test utilities.
//!
//! Models with closed-form outputs so that losses can be compared against hand-computed values.
//! The recurrent variants accept and return a state but their outputs do not depend on it.
use crate::torch::distributions::{DeterministicParams, ParameterizedDistribution};
use crate::torch::models::{
    Dynamics, DynamicsOutput, Policy, PolicyOutput, RecurrentState, StateActionValue, StateValue,
    ValueOutput,
};
use crate::LossError;
use tch::{Device, Kind, Tensor};

/// Unit-variance distribution whose samples are always the mean.
///
/// * `log_likelihood(x) = -0.5 ||x - mean||²`
/// * `entropy = 0`
/// * `KL(p || q) = 0.5 ||p.mean - q.mean||²`
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct MeanPd;

fn sum_last(x: &Tensor) -> Tensor {
    x.sum_dim_intlist(&[-1], false, Kind::Float)
}

impl ParameterizedDistribution for MeanPd {
    type Params = DeterministicParams;

    fn sample(&self, params: &Self::Params, sample_shape: &[i64]) -> Tensor {
        let shape: Vec<i64> = sample_shape
            .iter()
            .copied()
            .chain(params.mean.size())
            .collect();
        params.mean.expand(&shape, false)
    }

    fn log_likelihood(&self, elements: &Tensor, params: &Self::Params) -> Tensor {
        sum_last(&(elements - &params.mean).square()) * -0.5
    }

    fn entropy(&self, params: &Self::Params) -> Tensor {
        sum_last(&params.mean).zeros_like()
    }

    fn kl_divergence(&self, p: &Self::Params, q: &Self::Params) -> Tensor {
        sum_last(&(&p.mean - &q.mean).square()) * 0.5
    }
}

/// Scalar parameter tensor that requires a gradient.
pub fn parameter(value: f64) -> Tensor {
    Tensor::full(&[], value, (Kind::Float, Device::Cpu)).set_requires_grad(true)
}

/// Stored recurrent states of shape `[T, B, 2, 1]`.
pub fn stored_states(length: i64, batch_size: i64) -> Tensor {
    Tensor::zeros(&[length, batch_size, 2, 1], (Kind::Float, Device::Cpu))
}

/// Pass through the given recurrent state, or start a new one.
fn pass_state(
    recurrent: bool,
    obs: &Tensor,
    state: Option<&RecurrentState>,
) -> Option<RecurrentState> {
    if !recurrent {
        return None;
    }
    Some(match state {
        Some(state) => state.shallow_clone(),
        None => RecurrentState::zeros(obs.size()[1], 1, obs.device()),
    })
}

fn initial_state(recurrent: bool, batch_size: i64) -> Option<RecurrentState> {
    if recurrent {
        Some(RecurrentState::zeros(batch_size, 1, Device::Cpu))
    } else {
        None
    }
}

/// Policy with action mean `obs * weight` over [`MeanPd`].
#[derive(Debug)]
pub struct LinearPolicy {
    pub weight: Tensor,
    recurrent: bool,
    pd: MeanPd,
}

impl LinearPolicy {
    pub fn new(weight: f64) -> Self {
        Self {
            weight: parameter(weight),
            recurrent: false,
            pd: MeanPd,
        }
    }

    /// A state-free policy that reports itself as recurrent.
    pub fn recurrent(weight: f64) -> Self {
        Self {
            recurrent: true,
            ..Self::new(weight)
        }
    }

    pub fn mean(&self, obs: &Tensor) -> Tensor {
        obs * &self.weight
    }
}

impl Policy for LinearPolicy {
    type Pd = MeanPd;

    fn pd(&self) -> &Self::Pd {
        &self.pd
    }

    fn action_dim(&self) -> i64 {
        1
    }

    fn is_recurrent(&self) -> bool {
        self.recurrent
    }

    fn initial_state(&self, batch_size: i64) -> Option<RecurrentState> {
        initial_state(self.recurrent, batch_size)
    }

    fn forward(
        &self,
        obs: &Tensor,
        state: Option<&RecurrentState>,
        _h_masks: Option<&Tensor>,
    ) -> PolicyOutput<DeterministicParams> {
        PolicyOutput {
            params: DeterministicParams {
                mean: self.mean(obs),
            },
            state: pass_state(self.recurrent, obs, state),
        }
    }
}

/// Q-function `sum(obs) * obs_weight + sum(acs) * act_weight`.
///
/// Maximizes over actions in the box `[-1, 1]` with the same dimension as the observations.
#[derive(Debug)]
pub struct LinearQ {
    pub obs_weight: Tensor,
    pub act_weight: Tensor,
    recurrent: bool,
}

impl LinearQ {
    pub fn new(obs_weight: f64, act_weight: f64) -> Self {
        Self {
            obs_weight: parameter(obs_weight),
            act_weight: parameter(act_weight),
            recurrent: false,
        }
    }

    /// A state-free Q-function that reports itself as recurrent.
    pub fn recurrent(obs_weight: f64, act_weight: f64) -> Self {
        Self {
            recurrent: true,
            ..Self::new(obs_weight, act_weight)
        }
    }

    pub fn value(&self, obs: &Tensor, acs: &Tensor) -> Tensor {
        sum_last(obs) * &self.obs_weight + sum_last(acs) * &self.act_weight
    }
}

impl StateActionValue for LinearQ {
    fn is_recurrent(&self) -> bool {
        self.recurrent
    }

    fn initial_state(&self, batch_size: i64) -> Option<RecurrentState> {
        initial_state(self.recurrent, batch_size)
    }

    fn forward(
        &self,
        obs: &Tensor,
        acs: &Tensor,
        state: Option<&RecurrentState>,
        _h_masks: Option<&Tensor>,
    ) -> ValueOutput {
        ValueOutput {
            value: self.value(obs, acs),
            state: pass_state(self.recurrent, obs, state),
        }
    }

    fn max(&self, obs: &Tensor) -> Result<(Tensor, Tensor), LossError> {
        let acs = obs.ones_like() * self.act_weight.detach().sign();
        Ok((self.value(obs, &acs), acs))
    }
}

/// State value function `sum(obs) * weight`.
#[derive(Debug)]
pub struct LinearV {
    pub weight: Tensor,
    recurrent: bool,
}

impl LinearV {
    pub fn new(weight: f64) -> Self {
        Self {
            weight: parameter(weight),
            recurrent: false,
        }
    }

    /// A state-free value function that reports itself as recurrent.
    pub fn recurrent(weight: f64) -> Self {
        Self {
            recurrent: true,
            ..Self::new(weight)
        }
    }
}

impl StateValue for LinearV {
    fn is_recurrent(&self) -> bool {
        self.recurrent
    }

    fn initial_state(&self, batch_size: i64) -> Option<RecurrentState> {
        initial_state(self.recurrent, batch_size)
    }

    fn forward(
        &self,
        obs: &Tensor,
        state: Option<&RecurrentState>,
        _h_masks: Option<&Tensor>,
    ) -> ValueOutput {
        ValueOutput {
            value: sum_last(obs) * &self.weight,
            state: pass_state(self.recurrent, obs, state),
        }
    }
}

/// Dynamics model predicting `obs * weight + acs` exactly.
#[derive(Debug)]
pub struct LinearDynamics {
    pub weight: Tensor,
}

impl LinearDynamics {
    pub fn new(weight: f64) -> Self {
        Self {
            weight: parameter(weight),
        }
    }
}

impl Dynamics for LinearDynamics {
    fn forward(
        &self,
        obs: &Tensor,
        acs: &Tensor,
        _state: Option<&RecurrentState>,
        _h_masks: Option<&Tensor>,
    ) -> DynamicsOutput {
        let mean = obs * &self.weight + acs;
        DynamicsOutput {
            prediction: mean.shallow_clone(),
            mean,
            state: None,
        }
    }
}

/// Assert that a scalar tensor is close to an expected value.
pub fn assert_scalar_eq(actual: &Tensor, expected: f64) {
    let actual = f64::from(actual);
    assert!(
        (actual - expected).abs() <= 1e-5 * (1.0 + expected.abs()),
        "{} != {}",
        actual,
        expected
    );
}

/// Assert that two tensors are elementwise close.
pub fn assert_allclose(actual: &Tensor, expected: &Tensor) {
    assert_eq!(actual.size(), expected.size());
    assert!(
        actual.allclose(expected, 1e-5, 1e-6, false),
        "{:?} != {:?}",
        actual,
        expected
    );
}
