//! Categorical distribution
use super::{clamp_float_min, sampled_shape, DistributionParams, ParameterizedDistribution};
use crate::torch::batch::{Batch, BatchError};
use tch::{Kind, Tensor};

/// Batch field holding stored categorical logits.
pub const LOGITS: &str = "logits";

/// Parameters of categorical distribution(s).
#[derive(Debug)]
pub struct CategoricalParams {
    /// Normalized log probability of each event.
    ///
    /// An f32 tensor of shape `[BATCH_SHAPE.., NUM_EVENTS]`.
    pub logits: Tensor,
}

impl CategoricalParams {
    /// Initialze from possibly unnormalized log probabilities.
    ///
    /// The log probabilities are normalized by adding some value `C` to each
    /// such that `sum_i exp(log_prob[i] + C) = 1`.
    pub fn new(logits: &Tensor) -> Self {
        Self {
            logits: logits.log_softmax(-1, Kind::Float),
        }
    }

    fn num_events(&self) -> i64 {
        self.logits.size().last().copied().unwrap_or(0)
    }
}

impl DistributionParams for CategoricalParams {
    fn from_batch(batch: &Batch) -> Result<Self, BatchError> {
        Ok(Self::new(batch.get(LOGITS)?))
    }

    /// The mapped logits are not renormalized.
    fn map<F: FnMut(&Tensor) -> Tensor>(&self, mut f: F) -> Self {
        Self {
            logits: f(&self.logits),
        }
    }
}

/// Categorical distributions over `{0, .., NUM_EVENTS - 1}`.
///
/// Elements are integer indices with the batch shape (no element dimensions).
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct CategoricalPd;

impl ParameterizedDistribution for CategoricalPd {
    type Params = CategoricalParams;

    fn sample(&self, params: &Self::Params, sample_shape: &[i64]) -> Tensor {
        let mut batch_shape = params.logits.size();
        batch_shape.pop();
        let num_samples: i64 = sample_shape.iter().product();
        // multinomial only supports 1 or 2 dimensions; samples along the last
        let flat_samples = params
            .logits
            .exp()
            .reshape(&[-1, params.num_events()])
            .multinomial(num_samples, true);
        flat_samples
            .transpose(0, 1)
            .reshape(&sampled_shape(sample_shape, &batch_shape))
    }

    fn log_likelihood(&self, elements: &Tensor, params: &Self::Params) -> Tensor {
        let mut expanded_shape = elements.size();
        expanded_shape.push(params.num_events());
        params
            .logits
            .expand(&expanded_shape, false)
            .gather(-1, &elements.to_kind(Kind::Int64).unsqueeze(-1), false)
            .squeeze_dim(-1)
    }

    fn entropy(&self, params: &Self::Params) -> Tensor {
        // Logits are f32 by construction
        let clamped_logits =
            clamp_float_min(&params.logits).unwrap_or_else(|_| params.logits.shallow_clone());
        -(clamped_logits * params.logits.exp()).sum_dim_intlist(&[-1], false, Kind::Float)
    }

    fn kl_divergence(&self, p: &Self::Params, q: &Self::Params) -> Tensor {
        let rel_logits = &p.logits - &q.logits;
        let clamped_rel_logits =
            clamp_float_min(&rel_logits).unwrap_or(rel_logits);
        (clamped_rel_logits * p.logits.exp()).sum_dim_intlist(&[-1], false, Kind::Float)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(expected: &Tensor, actual: &Tensor) {
        assert!(
            Into::<bool>::into(expected.isclose(actual, 1e-6, 1e-6, false).all()),
            "expected: {:?}\nactual: {:?}",
            expected,
            actual
        );
    }

    #[test]
    fn log_likelihood() {
        let logits = Tensor::of_slice(&[
            // elem: 1
            f32::NEG_INFINITY,
            0.0,
            f32::NEG_INFINITY,
            // elem: 2
            f32::NEG_INFINITY,
            0.0,
            0.0,
            // elem: 0
            -1.0,
            0.0,
            1.0,
            // elem: 0
            0.0,
            0.0,
            0.0,
        ])
        .reshape(&[-1, 3]);
        let params = CategoricalParams::new(&logits);
        let elements = Tensor::of_slice(&[1_i64, 2, 0, 0]);

        // Log normalizing constant for the [-1, 0.0, 1] distribution
        let log_normalizer = f32::ln(f32::exp(-1.0) + 1.0 + f32::exp(1.0));
        let expected = Tensor::of_slice(&[
            0.0,
            -f32::ln(2.0),
            -1.0 - log_normalizer,
            f32::ln(3.0_f32.recip()),
        ]);
        assert_close(&expected, &CategoricalPd.log_likelihood(&elements, &params));
    }

    #[test]
    fn log_likelihood_float_elements_with_sample_dim() {
        let params = CategoricalParams::new(&Tensor::of_slice(&[0.5f32.ln(), 0.5f32.ln()]).reshape(&[1, 2]));
        // [S=3, B=1] float-valued actions as stored in a batch
        let elements = Tensor::of_slice(&[0.0f32, 1.0, 1.0]).reshape(&[3, 1]);
        let llh = CategoricalPd.log_likelihood(&elements, &params);
        assert_eq!(llh.size(), vec![3, 1]);
        assert_close(&Tensor::full(&[3, 1], f64::from(0.5f32.ln()), (Kind::Float, tch::Device::Cpu)), &llh);
    }

    #[test]
    fn sample_shape_and_support() {
        let logits = Tensor::of_slice(&[
            f32::NEG_INFINITY, 0.0, f32::NEG_INFINITY, //
            0.0, f32::NEG_INFINITY, f32::NEG_INFINITY, //
        ])
        .reshape(&[2, 3]);
        let params = CategoricalParams::new(&logits);
        let samples = CategoricalPd.sample(&params, &[4, 5]);
        assert_eq!(samples.size(), vec![4, 5, 2]);
        let expected = Tensor::of_slice(&[1_i64, 0]).expand(&[4, 5, 2], false);
        assert_eq!(samples, expected);
    }

    #[test]
    fn entropy() {
        let logits = Tensor::of_slice(&[
            f32::NEG_INFINITY,
            0.0,
            f32::NEG_INFINITY,
            //
            f32::NEG_INFINITY,
            0.0,
            0.0,
            //
            0.1_f32.ln(),
            0.3_f32.ln(),
            0.6_f32.ln(),
        ])
        .reshape(&[-1, 3]);
        let params = CategoricalParams::new(&logits);
        let expected = Tensor::of_slice(&[
            0.0,
            -(0.5_f32.ln()),
            -0.1 * 0.1_f32.ln() - 0.3 * 0.3_f32.ln() - 0.6 * 0.6_f32.ln(),
        ]);
        assert_close(&expected, &CategoricalPd.entropy(&params));
    }

    #[test]
    fn kl_divergence() {
        let p = CategoricalParams::new(
            &Tensor::of_slice(&[
                0.2_f32, 0.3, 0.5, //
                0.2, 0.3, 0.5, //
                0.0, 1.0, 0.0, //
            ])
            .reshape(&[3, 3])
            .log(),
        );
        let q = CategoricalParams::new(
            &Tensor::of_slice(&[
                0.2_f32, 0.3, 0.5, //
                0.7, 0.2, 0.1, //
                0.2, 0.3, 0.5, //
            ])
            .reshape(&[3, 3])
            .log(),
        );
        let expected = Tensor::of_slice(&[
            0.0_f32,
            0.2 * (0.2_f32 / 0.7).ln() + 0.3 * (0.3_f32 / 0.2).ln() + 0.5 * (0.5_f32 / 0.1).ln(),
            (1.0_f32 / 0.3).ln(),
        ]);
        assert_close(&expected, &CategoricalPd.kl_divergence(&p, &q));
    }
}
