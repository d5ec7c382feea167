//! Activation functions
use serde::{Deserialize, Serialize};
use tch::Tensor;

/// Activation functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    /// No transformation
    Identity,
    /// Rectified linear
    Relu,
    /// Sigmoid function
    Sigmoid,
    /// Hyperbolic tangent
    Tanh,
}

impl Default for Activation {
    fn default() -> Self {
        Self::Relu
    }
}

impl Activation {
    /// The function pointer for this activation function.
    #[inline]
    pub fn function(self) -> fn(&Tensor) -> Tensor {
        match self {
            Self::Identity => Tensor::shallow_clone,
            Self::Relu => Tensor::relu,
            Self::Sigmoid => Tensor::sigmoid,
            Self::Tanh => Tensor::tanh,
        }
    }

    /// The function pointer for this activation function if not the identity function.
    #[inline]
    pub fn maybe_function(self) -> Option<fn(&Tensor) -> Tensor> {
        match self {
            Self::Identity => None,
            _ => Some(self.function()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn identity_maybe_function_none() {
        assert!(Activation::Identity.maybe_function().is_none());
    }

    #[rstest]
    #[case(Activation::Relu)]
    #[case(Activation::Sigmoid)]
    #[case(Activation::Tanh)]
    fn maybe_function_some(#[case] activation: Activation) {
        assert!(activation.maybe_function().is_some());
    }

    #[test]
    fn relu() {
        let x = Tensor::of_slice(&[-2.0, -1.0, 0.0, 1.0, 2.0]);
        let expected = Tensor::of_slice(&[0.0, 0.0, 0.0, 1.0, 2.0]);
        assert_eq!(Activation::Relu.function()(&x), expected);
    }

    #[rstest]
    #[case(Activation::Relu, 0.0, f64::INFINITY)]
    #[case(Activation::Sigmoid, 0.0, 1.0)]
    #[case(Activation::Tanh, -1.0, 1.0)]
    fn bounds(#[case] activation: Activation, #[case] lower_bound: f64, #[case] upper_bound: f64) {
        let x = Tensor::of_slice(&[f64::NEG_INFINITY, -2.0, -1.0, 0.0, 1.0, 2.0, f64::INFINITY]);
        let y = activation.function()(&x);

        assert!(bool::from(y.greater_equal(lower_bound).all()));
        assert!(bool::from(y.less_equal(upper_bound).all()));
    }

    #[test]
    fn deserialize_snake_case() {
        let activation: Activation = serde_json::from_str("\"tanh\"").unwrap();
        assert_eq!(activation, Activation::Tanh);
    }
}
