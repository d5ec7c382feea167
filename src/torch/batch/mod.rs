//! Training batches
//!
//! A [`Batch`] is a string-keyed collection of tensors assembled by the training loop.
//! Each loss function parses the batch into a typed view (see [`views`]) that checks the
//! required fields and their leading dimensions before any model is evaluated.
pub mod views;

pub use views::{
    DynamicsBatch, Masks, ObsActionBatch, ObservationBatch, PolicyBatch, SequenceBatch,
    StateTransitionBatch, TransitionBatch, ValueBatch,
};

use std::collections::BTreeMap;
use std::fmt;
use tch::Tensor;
use thiserror::Error;

/// Names of the standard batch fields.
pub mod fields {
    /// Observations.
    pub const OBS: &str = "obs";
    /// Actions taken.
    pub const ACS: &str = "acs";
    /// Advantage estimates.
    pub const ADVS: &str = "advs";
    /// Rewards.
    pub const REWS: &str = "rews";
    /// Next observations.
    pub const NEXT_OBS: &str = "next_obs";
    /// Episode termination flags (1 if the episode ended at this step).
    pub const DONES: &str = "dones";
    /// Monte Carlo returns.
    pub const RETS: &str = "rets";
    /// Value estimates cached at collection time.
    pub const VS: &str = "vs";
    /// Recurrent state reset masks (1 on the first step of an episode).
    pub const H_MASKS: &str = "h_masks";
    /// Output masks (0 on padding steps).
    pub const OUT_MASKS: &str = "out_masks";
    /// Stored policy recurrent state.
    pub const HS: &str = "hs";
    /// Prefix of the stored recurrent state of each Q-function.
    pub const Q_HS: &str = "q_hs";
    /// Prefix of the stored recurrent state of each target Q-function.
    pub const TARG_Q_HS: &str = "targ_q_hs";
}

/// Batch field holding the stored recurrent state of the Q-function with the given index.
pub fn q_hidden_field(index: usize) -> String {
    format!("{}{}", fields::Q_HS, index)
}

/// Batch field holding the stored recurrent state of the target Q-function with the given index.
pub fn target_q_hidden_field(index: usize) -> String {
    format!("{}{}", fields::TARG_Q_HS, index)
}

/// Error reading a batch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BatchError {
    #[error("missing batch field \"{field}\"")]
    MissingField { field: String },
    #[error("field \"{field}\" has shape {actual:?}; expected leading dimensions {expected:?}")]
    ShapeMismatch {
        field: String,
        expected: Vec<i64>,
        actual: Vec<i64>,
    },
    #[error("sequence length {length} is too short for a burn-in of {burn_in_length} steps")]
    SequenceTooShort { length: i64, burn_in_length: usize },
}

/// A named collection of tensors forming one training minibatch.
///
/// Flat batches have leading dimension `[B]`; time-major batches have leading dimensions `[T, B]`.
#[derive(Default)]
pub struct Batch {
    fields: BTreeMap<String, Tensor>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a field, replacing any existing value.
    pub fn insert<S: Into<String>>(&mut self, name: S, value: Tensor) -> Option<Tensor> {
        self.fields.insert(name.into(), value)
    }

    /// Builder-style insertion.
    #[must_use]
    pub fn with<S: Into<String>>(mut self, name: S, value: Tensor) -> Self {
        self.insert(name, value);
        self
    }

    /// Get a required field.
    pub fn get(&self, name: &str) -> Result<&Tensor, BatchError> {
        self.fields.get(name).ok_or_else(|| BatchError::MissingField {
            field: name.into(),
        })
    }

    /// Get an optional field.
    pub fn get_opt(&self, name: &str) -> Option<&Tensor> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate over the field names in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// A copy of this batch with every tensor detached from the computation graph.
    pub fn detach(&self) -> Self {
        Self {
            fields: self
                .fields
                .iter()
                .map(|(name, value)| (name.clone(), value.detach()))
                .collect(),
        }
    }
}

impl fmt::Debug for Batch {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_map()
            .entries(self.fields.iter().map(|(k, v)| (k, v.size())))
            .finish()
    }
}

/// Get a required field and check that its shape starts with `leading`.
pub(crate) fn get_leading(
    batch: &Batch,
    name: &str,
    leading: &[i64],
) -> Result<Tensor, BatchError> {
    let tensor = batch.get(name)?;
    check_leading(name, tensor, leading)?;
    Ok(tensor.shallow_clone())
}

/// Check that the shape of `tensor` starts with `leading`.
pub(crate) fn check_leading(name: &str, tensor: &Tensor, leading: &[i64]) -> Result<(), BatchError> {
    let actual = tensor.size();
    if actual.len() < leading.len() || actual[..leading.len()] != *leading {
        return Err(BatchError::ShapeMismatch {
            field: name.into(),
            expected: leading.to_vec(),
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::Kind;

    #[test]
    fn get_missing_field() {
        let batch = Batch::new().with(fields::OBS, Tensor::zeros(&[3, 2], (Kind::Float, tch::Device::Cpu)));
        assert_eq!(
            batch.get(fields::ACS).err(),
            Some(BatchError::MissingField {
                field: "acs".into()
            })
        );
        assert!(batch.get(fields::OBS).is_ok());
    }

    #[test]
    fn ensemble_field_names() {
        assert_eq!(q_hidden_field(0), "q_hs0");
        assert_eq!(target_q_hidden_field(3), "targ_q_hs3");
    }

    #[test]
    fn leading_dims_checked() {
        let batch = Batch::new().with(fields::OBS, Tensor::zeros(&[3, 2], (Kind::Float, tch::Device::Cpu)));
        assert!(get_leading(&batch, fields::OBS, &[3]).is_ok());
        assert_eq!(
            get_leading(&batch, fields::OBS, &[4]).err(),
            Some(BatchError::ShapeMismatch {
                field: "obs".into(),
                expected: vec![4],
                actual: vec![3, 2],
            })
        );
    }

    #[test]
    fn detach_keeps_fields() {
        let x = Tensor::ones(&[2], (Kind::Float, tch::Device::Cpu)).set_requires_grad(true);
        let batch = Batch::new().with("x", &x * 2.0);
        let detached = batch.detach();
        assert_eq!(detached.keys().collect::<Vec<_>>(), vec!["x"]);
        assert!(!detached.get("x").unwrap().requires_grad());
        assert!(batch.get("x").unwrap().requires_grad());
    }
}
