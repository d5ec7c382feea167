//! Multi-layer perceptron
use super::Activation;
use serde::{Deserialize, Serialize};
use std::iter;
use tch::{
    nn::{self, Linear, Module, Path},
    Tensor,
};

/// Configuration for the [`Mlp`] module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct MlpConfig {
    /// Sizes of the hidden layers
    pub hidden_sizes: Vec<usize>,
    /// Activation function between hidden layers.
    pub activation: Activation,
    /// Activation function on the output.
    pub output_activation: Activation,
    /// Whether the linear layers have a bias term.
    pub bias: bool,
}

impl Default for MlpConfig {
    fn default() -> Self {
        Self {
            hidden_sizes: vec![128],
            activation: Activation::Relu,
            output_activation: Activation::Identity,
            bias: true,
        }
    }
}

impl MlpConfig {
    pub fn build(&self, vs: &Path, in_dim: usize, out_dim: usize) -> Mlp {
        Mlp::new(vs, in_dim, out_dim, self)
    }
}

/// Multi-layer perceptron
#[derive(Debug)]
pub struct Mlp {
    layers: Vec<Linear>,
    activation: Option<fn(&Tensor) -> Tensor>,
    output_activation: Option<fn(&Tensor) -> Tensor>,
}

impl Mlp {
    pub fn new(vs: &Path, in_dim: usize, out_dim: usize, config: &MlpConfig) -> Self {
        let in_dims = iter::once(&in_dim).chain(&config.hidden_sizes);
        let out_dims = config.hidden_sizes.iter().chain(iter::once(&out_dim));
        let linear_config = nn::LinearConfig {
            bias: config.bias,
            ..nn::LinearConfig::default()
        };

        #[allow(clippy::cast_possible_wrap)]
        let layers: Vec<_> = in_dims
            .zip(out_dims)
            .enumerate()
            .map(|(i, (in_, out_))| {
                nn::linear(
                    vs / format!("layer_{}", i),
                    *in_ as i64,
                    *out_ as i64,
                    linear_config,
                )
            })
            .collect();

        Self {
            layers,
            activation: config.activation.maybe_function(),
            output_activation: config.output_activation.maybe_function(),
        }
    }
}

impl Module for Mlp {
    fn forward(&self, input: &Tensor) -> Tensor {
        let mut hidden = input.shallow_clone();
        for (i, layer) in self.layers.iter().enumerate() {
            if i > 0 {
                if let Some(activation) = self.activation {
                    hidden = activation(&hidden);
                }
            }
            hidden = layer.forward(&hidden);
        }
        if let Some(output_activation) = self.output_activation {
            hidden = output_activation(&hidden);
        }
        hidden
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use tch::{nn::VarStore, Device, Kind};

    #[fixture]
    fn default_module() -> (VarStore, Mlp) {
        let vs = VarStore::new(Device::Cpu);
        let module = MlpConfig::default().build(&vs.root(), 3, 2);
        (vs, module)
    }

    #[rstest]
    #[case(&[4])]
    #[case(&[5, 4])]
    fn forward_batch_shape(default_module: (VarStore, Mlp), #[case] batch_shape: &[i64]) {
        let (_vs, mlp) = default_module;
        let mut shape = batch_shape.to_vec();
        shape.push(3);
        let output = mlp.forward(&Tensor::ones(&shape, (Kind::Float, Device::Cpu)));
        *shape.last_mut().unwrap() = 2;
        assert_eq!(output.size(), shape);
    }

    #[test]
    fn output_activation_applied() {
        let vs = VarStore::new(Device::Cpu);
        let config = MlpConfig {
            output_activation: Activation::Sigmoid,
            ..MlpConfig::default()
        };
        let mlp = config.build(&vs.root(), 2, 8);
        let output = mlp.forward(&(Tensor::randn(&[16, 2], (Kind::Float, Device::Cpu)) * 100.0));
        assert!(bool::from(output.greater_equal(0.0).all()));
        assert!(bool::from(output.less_equal(1.0).all()));
    }

    #[test]
    fn no_hidden_layers_is_linear() {
        let vs = VarStore::new(Device::Cpu);
        let config = MlpConfig {
            hidden_sizes: vec![],
            bias: false,
            ..MlpConfig::default()
        };
        let mlp = config.build(&vs.root(), 2, 1);
        let x = Tensor::of_slice(&[1.0f32, 2.0]).reshape(&[1, 2]);
        let doubled = mlp.forward(&(&x * 2.0));
        assert!(doubled.allclose(&(mlp.forward(&x) * 2.0), 1e-5, 1e-6, false));
    }
}
