//! Neural network building blocks for the concrete models.
mod activation;
mod lstm;
mod mlp;

pub use activation::Activation;
pub use lstm::Lstm;
pub use mlp::{Mlp, MlpConfig};

use tch::Tensor;

/// A network module that operates iteratively on a sequence of data.
pub trait IterativeModule {
    /// Internal state of the module.
    type State;

    /// Construct an initial state for the start of a new sequence.
    fn initial_state(&self, batch_size: i64) -> Self::State;

    /// Apply one step of the module.
    ///
    /// # Args
    /// * `input` - The input for one (batched) step.
    ///     A tensor with shape `[BATCH_SIZE, NUM_INPUT_FEATURES]`
    /// * `state` - The module state before this step.
    ///
    /// # Returns
    /// The output with shape `[BATCH_SIZE, NUM_OUTPUT_FEATURES]` and the next state.
    fn step(&self, input: &Tensor, state: &Self::State) -> (Tensor, Self::State);
}
