//! Gaussian state dynamics model
use super::{DistributionHead, Dynamics, DynamicsOutput, GaussianHead, RecurrentState};
use crate::torch::distributions::ParameterizedDistribution;
use crate::torch::modules::{Mlp, MlpConfig};
use tch::{nn::Module, nn::Path, Tensor};

/// Dynamics model with a diagonal Gaussian predictive distribution.
///
/// The mean is an MLP of the concatenated observation and action;
/// the log standard deviation is a learned state-independent vector.
/// The prediction is a reparameterized sample.
#[derive(Debug)]
pub struct GaussianDynamics {
    mlp: Mlp,
    head: GaussianHead,
}

impl GaussianDynamics {
    /// # Args
    /// * `out_dim` - Size of the prediction: the observation size to predict (differences of)
    ///     next observations, or 1 to predict rewards.
    pub fn new(
        vs: &Path,
        obs_dim: usize,
        action_dim: usize,
        out_dim: usize,
        config: &MlpConfig,
        initial_log_std: f64,
    ) -> Self {
        Self {
            mlp: config.build(&(vs / "mlp"), obs_dim + action_dim, out_dim),
            head: GaussianHead::new(&(vs / "head"), out_dim, initial_log_std),
        }
    }
}

impl Dynamics for GaussianDynamics {
    fn forward(
        &self,
        obs: &Tensor,
        acs: &Tensor,
        _state: Option<&RecurrentState>,
        _h_masks: Option<&Tensor>,
    ) -> DynamicsOutput {
        let input = Tensor::cat(&[obs, &acs.to_kind(obs.kind())], -1);
        let mean = self.mlp.forward(&input);
        let params = self.head.params(&mean, true);
        DynamicsOutput {
            prediction: self.head.pd().sample(&params, &[]),
            mean,
            state: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{nn::VarStore, Device, Kind};

    #[test]
    fn deterministic_limit_prediction_is_mean() {
        let vs = VarStore::new(Device::Cpu);
        // exp(-30) noise is far below float tolerance
        let dm = GaussianDynamics::new(&vs.root(), 3, 2, 3, &MlpConfig::default(), -30.0);
        let obs = Tensor::randn(&[6, 3], (Kind::Float, Device::Cpu));
        let acs = Tensor::randn(&[6, 2], (Kind::Float, Device::Cpu));
        let output = dm.forward(&obs, &acs, None, None);
        assert_eq!(output.prediction.size(), vec![6, 3]);
        assert!(output.prediction.allclose(&output.mean, 1e-5, 1e-6, false));
    }
}
