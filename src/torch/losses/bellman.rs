//! Bellman error losses for Q-functions
use super::{check_sampling, expand_samples, not_done, scalar};
use crate::error::LossError;
use crate::logging::{LogGroup, StatsLogger};
use crate::torch::batch::{Batch, TransitionBatch};
use crate::torch::distributions::ParameterizedDistribution;
use crate::torch::models::{Policy, StateActionValue};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tch::{Kind, Reduction, Tensor};

/// Reduction applied to elementwise losses.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossReduction {
    /// Mean over all elements.
    ElementwiseMean,
    /// Sum over all elements.
    Sum,
    /// No reduction; the loss has the batch shape.
    None,
}

impl Default for LossReduction {
    fn default() -> Self {
        Self::ElementwiseMean
    }
}

impl LossReduction {
    fn reduce(self, x: Tensor) -> Tensor {
        match self {
            Self::ElementwiseMean => x.mean(Kind::Float),
            Self::Sum => x.sum(Kind::Float),
            Self::None => x,
        }
    }
}

/// Configuration for [`bellman`].
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BellmanConfig {
    /// Discount factor.
    pub gamma: f64,
    /// Whether the action space is continuous. Only continuous actions are supported.
    pub continuous: bool,
    /// Number of next actions sampled to estimate the next-state value.
    pub sampling: i64,
    pub reduction: LossReduction,
}

impl Default for BellmanConfig {
    fn default() -> Self {
        Self {
            gamma: 0.99,
            continuous: true,
            sampling: 1,
            reduction: LossReduction::default(),
        }
    }
}

/// Bellman error of a Q-function with a target Q-function and target policy.
///
/// The target `rews + γ mean_a' Q_targ(next_obs, a') (1 - dones)` with `a' ~ π_targ(next_obs)`
/// is detached. The loss is `0.5 (Q(obs, acs) - target)²` reduced according to the config.
///
/// # Batch Fields
/// `obs`, `acs`, `rews`, `next_obs` and `dones`, all with leading dimension `[B]`.
pub fn bellman<Q, T, P>(
    qf: &Q,
    targ_qf: &T,
    targ_pol: &P,
    batch: &Batch,
    config: &BellmanConfig,
    logger: &mut dyn StatsLogger,
) -> Result<Tensor, LossError>
where
    Q: StateActionValue,
    T: StateActionValue,
    P: Policy,
{
    if !config.continuous {
        return Err(LossError::Unsupported(
            "Bellman loss for Q-functions over discrete actions",
        ));
    }
    check_sampling(config.sampling)?;
    let batch = TransitionBatch::from_batch(batch)?;

    let targ = tch::no_grad(|| {
        let params = targ_pol.forward(&batch.next_obs, None, None).params;
        let next_acs = targ_pol.pd().sample(&params, &[config.sampling]);
        let next_obs = expand_samples(&batch.next_obs, config.sampling);
        let next_q = targ_qf
            .forward(&next_obs, &next_acs, None, None)
            .value
            .mean_dim(&[0], false, Kind::Float);
        (&batch.rews + next_q * not_done(&batch.dones) * config.gamma).detach()
    });
    let q = qf.forward(&batch.obs, &batch.acs, None, None).value;
    let td = &q - &targ;
    let loss = config.reduction.reduce(td.square() * 0.5);

    let mut group = LogGroup::new(logger, "bellman");
    group.log_scalar("q_mean", scalar(&q.mean(Kind::Float)))?;
    group.log_scalar("target_mean", scalar(&targ.mean(Kind::Float)))?;
    group.log_scalar("td_abs_mean", scalar(&td.abs().mean(Kind::Float)))?;
    Ok(loss)
}

/// Loss function comparing Q-values to their target in [`clipped_double_bellman`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BellmanLossType {
    /// Binary cross entropy. Q-values and targets must lie in `[0, 1]`.
    Bce,
    /// Half mean squared error.
    Mse,
}

impl Default for BellmanLossType {
    fn default() -> Self {
        Self::Bce
    }
}

impl FromStr for BellmanLossType {
    type Err = LossError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bce" => Ok(Self::Bce),
            "mse" => Ok(Self::Mse),
            _ => Err(LossError::InvalidConfig(format!(
                "unknown Bellman loss type {:?}; expected \"bce\" or \"mse\"",
                s
            ))),
        }
    }
}

impl fmt::Display for BellmanLossType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Bce => write!(f, "bce"),
            Self::Mse => write!(f, "mse"),
        }
    }
}

/// Configuration for [`clipped_double_bellman`].
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClippedDoubleBellmanConfig {
    /// Discount factor.
    pub gamma: f64,
    pub loss_type: BellmanLossType,
}

impl Default for ClippedDoubleBellmanConfig {
    fn default() -> Self {
        Self {
            gamma: 0.99,
            loss_type: BellmanLossType::default(),
        }
    }
}

/// Bellman loss of clipped double Q-learning.
///
/// The greedy next action is chosen by `targ_qf1` and both target Q-functions are evaluated
/// on it. The detached target is `rews + γ min(Q_targ1, Q_targ2)(next_obs, a*) (1 - dones)`.
///
/// # Reference
/// [Addressing Function Approximation Error in Actor-Critic Methods][td3] by Fujimoto et al.
///
/// [td3]: https://arxiv.org/abs/1802.09477
pub fn clipped_double_bellman<Q, T1, T2>(
    qf: &Q,
    targ_qf1: &T1,
    targ_qf2: &T2,
    batch: &Batch,
    config: &ClippedDoubleBellmanConfig,
    logger: &mut dyn StatsLogger,
) -> Result<Tensor, LossError>
where
    Q: StateActionValue,
    T1: StateActionValue,
    T2: StateActionValue,
{
    let batch = TransitionBatch::from_batch(batch)?;

    let targ = {
        let _no_grad = tch::no_grad_guard();
        let (targ_q1, next_acs) = targ_qf1.max(&batch.next_obs)?;
        let targ_q2 = targ_qf2.forward(&batch.next_obs, &next_acs, None, None).value;
        let targ_q = targ_q1.min_other(&targ_q2);
        (&batch.rews + targ_q * not_done(&batch.dones) * config.gamma).detach()
    };
    let q = qf.forward(&batch.obs, &batch.acs, None, None).value;

    let loss = match config.loss_type {
        BellmanLossType::Bce => q.binary_cross_entropy::<&Tensor>(&targ, None, Reduction::Mean),
        BellmanLossType::Mse => ((&q - &targ).square() * 0.5).mean(Kind::Float),
    };

    let mut group = LogGroup::new(logger, "clipped_double_bellman");
    group.log_scalar("loss", scalar(&loss))?;
    group.log_scalar("q_mean", scalar(&q.mean(Kind::Float)))?;
    group.log_scalar("target_mean", scalar(&targ.mean(Kind::Float)))?;
    Ok(loss)
}

#[cfg(test)]
mod tests {
    use super::super::testing::{assert_allclose, assert_scalar_eq, LinearPolicy, LinearQ};
    use super::*;
    use crate::logging::testing::RecordingLogger;
    use crate::torch::batch::fields;
    use rstest::{fixture, rstest};

    #[fixture]
    fn batch() -> Batch {
        Batch::new()
            .with(
                fields::OBS,
                Tensor::of_slice(&[1.0f32, 2.0, -1.0, 0.5]).reshape(&[4, 1]),
            )
            .with(
                fields::ACS,
                Tensor::of_slice(&[0.5f32, -0.5, 1.0, 0.0]).reshape(&[4, 1]),
            )
            .with(fields::REWS, Tensor::of_slice(&[1.0f32, 0.0, -1.0, 2.0]))
            .with(
                fields::NEXT_OBS,
                Tensor::of_slice(&[2.0f32, -1.0, 0.5, 3.0]).reshape(&[4, 1]),
            )
            .with(fields::DONES, Tensor::of_slice(&[0.0f32, 0.0, 1.0, 0.0]))
    }

    /// Expected elementwise Bellman loss for `Q = obs + acs`, `Q_targ = 2 next_obs + acs`
    /// and target policy mean `0.5 next_obs` with discount 0.5.
    fn expected_bellman_elements() -> Tensor {
        let q = Tensor::of_slice(&[1.5f32, 1.5, 0.0, 0.5]);
        let next_q = Tensor::of_slice(&[5.0f32, -2.5, 1.25, 7.5]);
        let targ = Tensor::of_slice(&[1.0f32, 0.0, -1.0, 2.0])
            + next_q * Tensor::of_slice(&[1.0f32, 1.0, 0.0, 1.0]) * 0.5;
        (q - targ).square() * 0.5
    }

    #[rstest]
    #[case::mean(LossReduction::ElementwiseMean)]
    #[case::sum(LossReduction::Sum)]
    #[case::none(LossReduction::None)]
    fn bellman_reduction(batch: Batch, #[case] reduction: LossReduction) {
        let qf = LinearQ::new(1.0, 1.0);
        let targ_qf = LinearQ::new(2.0, 1.0);
        let targ_pol = LinearPolicy::new(0.5);
        let config = BellmanConfig {
            gamma: 0.5,
            sampling: 3,
            reduction,
            ..BellmanConfig::default()
        };
        let loss = bellman(&qf, &targ_qf, &targ_pol, &batch, &config, &mut ()).unwrap();
        let expected = expected_bellman_elements();
        match reduction {
            LossReduction::ElementwiseMean => {
                assert_scalar_eq(&loss, f64::from(expected.mean(Kind::Float)))
            }
            LossReduction::Sum => assert_scalar_eq(&loss, f64::from(expected.sum(Kind::Float))),
            LossReduction::None => assert_allclose(&loss, &expected),
        }
    }

    #[rstest]
    fn bellman_target_is_detached(batch: Batch) {
        let qf = LinearQ::new(1.0, 1.0);
        let targ_qf = LinearQ::new(2.0, 1.0);
        let targ_pol = LinearPolicy::new(0.5);
        let loss = bellman(
            &qf,
            &targ_qf,
            &targ_pol,
            &batch,
            &BellmanConfig::default(),
            &mut (),
        )
        .unwrap();
        loss.backward();
        assert!(qf.obs_weight.grad().defined());
        assert!(!targ_qf.obs_weight.grad().defined());
        assert!(!targ_pol.weight.grad().defined());
    }

    #[rstest]
    fn bellman_discrete_unsupported(batch: Batch) {
        let qf = LinearQ::new(1.0, 1.0);
        let targ_pol = LinearPolicy::new(0.5);
        let config = BellmanConfig {
            continuous: false,
            ..BellmanConfig::default()
        };
        assert!(matches!(
            bellman(&qf, &qf, &targ_pol, &batch, &config, &mut ()),
            Err(LossError::Unsupported(_))
        ));
    }

    #[test]
    fn bellman_missing_field() {
        let qf = LinearQ::new(1.0, 1.0);
        let targ_pol = LinearPolicy::new(0.5);
        let batch = Batch::new().with(fields::REWS, Tensor::of_slice(&[1.0f32]));
        assert!(matches!(
            bellman(&qf, &qf, &targ_pol, &batch, &BellmanConfig::default(), &mut ()),
            Err(LossError::Batch(_))
        ));
    }

    #[rstest]
    fn clipped_double_mse(batch: Batch) {
        let qf = LinearQ::new(1.0, 1.0);
        // Greedy action is +1 so Q_targ1 = 0.5 next_obs + 2
        let targ_qf1 = LinearQ::new(0.5, 2.0);
        // Q_targ2 = next_obs - 1 at the greedy action
        let targ_qf2 = LinearQ::new(1.0, -1.0);
        let config = ClippedDoubleBellmanConfig {
            gamma: 0.9,
            loss_type: BellmanLossType::Mse,
        };
        let mut logger = RecordingLogger::default();
        let loss =
            clipped_double_bellman(&qf, &targ_qf1, &targ_qf2, &batch, &config, &mut logger)
                .unwrap();

        let next_obs = Tensor::of_slice(&[2.0f32, -1.0, 0.5, 3.0]);
        let targ_q = (&next_obs * 0.5 + 2.0).min_other(&(&next_obs - 1.0));
        let targ = Tensor::of_slice(&[1.0f32, 0.0, -1.0, 2.0])
            + targ_q * Tensor::of_slice(&[1.0f32, 1.0, 0.0, 1.0]) * 0.9;
        let q = Tensor::of_slice(&[1.5f32, 1.5, 0.0, 0.5]);
        let expected = ((q - targ).square() * 0.5).mean(Kind::Float);
        assert_scalar_eq(&loss, f64::from(expected));
        assert!(logger.scalar("clipped_double_bellman/loss").is_some());
    }

    #[test]
    fn clipped_double_bce() {
        let obs = Tensor::of_slice(&[0.2f32, 0.8, 1.2]).reshape(&[3, 1]);
        let batch = Batch::new()
            .with(fields::OBS, obs.shallow_clone())
            .with(fields::ACS, obs.zeros_like())
            .with(fields::REWS, Tensor::of_slice(&[0.5f32, 0.2, 0.9]))
            .with(fields::NEXT_OBS, obs)
            .with(fields::DONES, Tensor::of_slice(&[1.0f32, 1.0, 1.0]));
        // Q = [0.1, 0.4, 0.6]; every transition is terminal so the target is the reward
        let qf = LinearQ::new(0.5, 0.0);
        let loss = clipped_double_bellman(
            &qf,
            &qf,
            &qf,
            &batch,
            &ClippedDoubleBellmanConfig::default(),
            &mut (),
        )
        .unwrap();
        let expected: f64 = [(0.1f64, 0.5f64), (0.4, 0.2), (0.6, 0.9)]
            .iter()
            .map(|&(q, t)| -(t * q.ln() + (1.0 - t) * (1.0 - q).ln()))
            .sum::<f64>()
            / 3.0;
        assert_scalar_eq(&loss, expected);
    }

    #[rstest]
    fn clipped_double_requires_max(batch: Batch) {
        struct NoMax(LinearQ);
        impl StateActionValue for NoMax {
            fn forward(
                &self,
                obs: &Tensor,
                acs: &Tensor,
                state: Option<&crate::torch::models::RecurrentState>,
                h_masks: Option<&Tensor>,
            ) -> crate::torch::models::ValueOutput {
                self.0.forward(obs, acs, state, h_masks)
            }
        }
        let qf = NoMax(LinearQ::new(1.0, 1.0));
        assert!(matches!(
            clipped_double_bellman(
                &qf,
                &qf,
                &qf,
                &batch,
                &ClippedDoubleBellmanConfig::default(),
                &mut ()
            ),
            Err(LossError::Unsupported(_))
        ));
    }

    #[rstest]
    #[case("bce", BellmanLossType::Bce)]
    #[case("mse", BellmanLossType::Mse)]
    fn loss_type_from_str(#[case] s: &str, #[case] expected: BellmanLossType) {
        assert_eq!(s.parse::<BellmanLossType>().unwrap(), expected);
        assert_eq!(expected.to_string(), s);
    }

    #[test]
    fn loss_type_unknown_is_invalid() {
        assert!(matches!(
            "huber".parse::<BellmanLossType>(),
            Err(LossError::InvalidConfig(_))
        ));
    }

    #[test]
    fn bellman_config_from_json() {
        let config: BellmanConfig =
            serde_json::from_str(r#"{"sampling": 4, "reduction": "sum"}"#).unwrap();
        assert_eq!(config.sampling, 4);
        assert_eq!(config.reduction, LossReduction::Sum);
        assert_eq!(config.gamma, 0.99);
        assert!(config.continuous);
    }
}
