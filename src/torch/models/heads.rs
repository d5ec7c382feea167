//! Action distribution heads
//!
//! A head turns the output features of a network trunk into distribution parameters.
use crate::torch::distributions::{
    CategoricalParams, CategoricalPd, DeterministicParams, DeterministicPd, GaussianParams,
    GaussianPd, ParameterizedDistribution,
};
use tch::{
    nn::{Init, Path},
    Tensor,
};

/// Maps network output features to action distribution parameters.
pub trait DistributionHead {
    type Pd: ParameterizedDistribution;

    fn pd(&self) -> &Self::Pd;

    /// Number of elements in a single action.
    fn action_dim(&self) -> i64;

    /// Number of network output features consumed by the head.
    fn num_features(&self) -> usize;

    /// Distribution parameters from features of shape `[BATCH_SHAPE.., num_features]`.
    ///
    /// Exploration noise (if any) is only added when `explore` is true.
    fn params(
        &self,
        features: &Tensor,
        explore: bool,
    ) -> <Self::Pd as ParameterizedDistribution>::Params;
}

/// Diagonal Gaussian head with a learned state-independent log standard deviation.
#[derive(Debug)]
pub struct GaussianHead {
    pd: GaussianPd,
    log_std: Tensor,
    action_dim: usize,
}

impl GaussianHead {
    #[allow(clippy::cast_possible_wrap)]
    pub fn new(vs: &Path, action_dim: usize, initial_log_std: f64) -> Self {
        Self {
            pd: GaussianPd,
            log_std: vs.var("log_std", &[action_dim as i64], Init::Const(initial_log_std)),
            action_dim,
        }
    }
}

impl DistributionHead for GaussianHead {
    type Pd = GaussianPd;

    fn pd(&self) -> &Self::Pd {
        &self.pd
    }

    #[allow(clippy::cast_possible_wrap)]
    fn action_dim(&self) -> i64 {
        self.action_dim as i64
    }

    fn num_features(&self) -> usize {
        self.action_dim
    }

    fn params(&self, features: &Tensor, _explore: bool) -> GaussianParams {
        GaussianParams::new(features.shallow_clone(), self.log_std.expand_as(features))
    }
}

/// Categorical head; features are the unnormalized logits.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct CategoricalHead {
    pd: CategoricalPd,
    num_actions: usize,
}

impl CategoricalHead {
    pub const fn new(num_actions: usize) -> Self {
        Self {
            pd: CategoricalPd,
            num_actions,
        }
    }
}

impl DistributionHead for CategoricalHead {
    type Pd = CategoricalPd;

    fn pd(&self) -> &Self::Pd {
        &self.pd
    }

    /// Actions are scalar indices.
    fn action_dim(&self) -> i64 {
        1
    }

    fn num_features(&self) -> usize {
        self.num_actions
    }

    fn params(&self, features: &Tensor, _explore: bool) -> CategoricalParams {
        CategoricalParams::new(features)
    }
}

/// Deterministic head with optional Gaussian exploration noise.
#[derive(Debug, Default, Copy, Clone, PartialEq)]
pub struct DeterministicHead {
    pd: DeterministicPd,
    action_dim: usize,
    /// Standard deviation of the exploration noise.
    pub noise_std: f64,
}

impl DeterministicHead {
    pub const fn new(action_dim: usize, noise_std: f64) -> Self {
        Self {
            pd: DeterministicPd,
            action_dim,
            noise_std,
        }
    }
}

impl DistributionHead for DeterministicHead {
    type Pd = DeterministicPd;

    fn pd(&self) -> &Self::Pd {
        &self.pd
    }

    #[allow(clippy::cast_possible_wrap)]
    fn action_dim(&self) -> i64 {
        self.action_dim as i64
    }

    fn num_features(&self) -> usize {
        self.action_dim
    }

    fn params(&self, features: &Tensor, explore: bool) -> DeterministicParams {
        let mean = if explore && self.noise_std > 0.0 {
            features + features.randn_like() * self.noise_std
        } else {
            features.shallow_clone()
        };
        DeterministicParams { mean }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{nn::VarStore, Device, Kind};

    #[test]
    fn gaussian_log_std_expanded() {
        let vs = VarStore::new(Device::Cpu);
        let head = GaussianHead::new(&vs.root(), 2, -0.5);
        let params = head.params(&Tensor::zeros(&[3, 2], (Kind::Float, Device::Cpu)), true);
        assert_eq!(
            params.log_std,
            Tensor::full(&[3, 2], -0.5, (Kind::Float, Device::Cpu))
        );
    }

    #[test]
    fn deterministic_noise_only_when_exploring() {
        let head = DeterministicHead::new(2, 1.0);
        let features = Tensor::zeros(&[100, 2], (Kind::Float, Device::Cpu));
        let quiet = head.params(&features, false);
        assert_eq!(quiet.mean, features);
        let noisy = head.params(&features, true);
        assert!(f64::from(noisy.mean.abs().sum(Kind::Float)) > 0.0);
    }

    #[test]
    fn categorical_action_dim_is_scalar() {
        let head = CategoricalHead::new(5);
        assert_eq!(head.action_dim(), 1);
        assert_eq!(head.num_features(), 5);
    }
}
