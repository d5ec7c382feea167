//! Error type
use crate::logging::LogError;
use crate::torch::batch::BatchError;
use thiserror::Error;

/// Error from evaluating a loss function.
#[derive(Error, Debug)]
pub enum LossError {
    #[error("invalid batch")]
    Batch(#[from] BatchError),
    #[error("unsupported: {0}")]
    Unsupported(&'static str),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("the Q-function ensemble must have at least one member")]
    EmptyEnsemble,
    #[error("error logging loss statistics")]
    Log(#[from] LogError),
}
