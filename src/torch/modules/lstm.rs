//! Long Short-Term Memory
use super::IterativeModule;
use crate::torch::models::RecurrentState;
use tch::{nn::Path, Device, Tensor};

/// A single-layer Long Short-Term Memory network with explicit state.
///
/// Evaluated one step at a time with `lstm_cell` so that the state can be reset per step.
#[derive(Debug)]
pub struct Lstm {
    // [w_ih, w_hh] or
    // [w_ih, w_hh, b_ih, b_hh]
    params: Vec<Tensor>,
    hidden_size: i64,
    device: Device,
}

impl Lstm {
    #[allow(clippy::cast_possible_wrap)]
    pub fn new(vs: &Path, in_dim: usize, hidden_size: usize, bias: bool) -> Self {
        let in_dim = in_dim as i64;
        let hidden_size = hidden_size as i64;
        let gates_size = 4 * hidden_size;

        let mut params = vec![
            vs.kaiming_uniform("weight_ih", &[gates_size, in_dim]),
            vs.kaiming_uniform("weight_hh", &[gates_size, hidden_size]),
        ];
        if bias {
            params.push(vs.zeros("bias_ih", &[gates_size]));
            params.push(vs.zeros("bias_hh", &[gates_size]));
        }

        let device = vs.device();
        Self {
            params,
            hidden_size,
            device,
        }
    }

    pub const fn hidden_size(&self) -> i64 {
        self.hidden_size
    }

    fn w_ih(&self) -> &Tensor {
        &self.params[0]
    }
    fn w_hh(&self) -> &Tensor {
        &self.params[1]
    }
    fn b_ih(&self) -> Option<&Tensor> {
        self.params.get(2)
    }
    fn b_hh(&self) -> Option<&Tensor> {
        self.params.get(3)
    }

    /// Apply the network over a time-major batch of sequences.
    ///
    /// # Args
    /// * `inputs` - Input sequences of shape `[T, B, NUM_INPUT_FEATURES]`.
    /// * `state` - State before the first step. Zero if `None`.
    /// * `h_masks` - Optional `[T, B]` mask; the state is reset before each step where it is 1.
    ///
    /// # Returns
    /// Outputs of shape `[T, B, HIDDEN_SIZE]` and the state after the last step.
    pub fn unroll(
        &self,
        inputs: &Tensor,
        state: Option<&RecurrentState>,
        h_masks: Option<&Tensor>,
    ) -> (Tensor, RecurrentState) {
        let size = inputs.size();
        let (seq_len, batch_size) = (size[0], size[1]);
        let mut state = match state {
            Some(state) => state.shallow_clone(),
            None => self.initial_state(batch_size),
        };
        let mut outputs = Vec::with_capacity(usize::try_from(seq_len).unwrap_or(0));
        for t in 0..seq_len {
            if let Some(h_masks) = h_masks {
                state = state.masked(&h_masks.get(t));
            }
            let (output, next_state) = self.step(&inputs.get(t), &state);
            outputs.push(output);
            state = next_state;
        }
        if outputs.is_empty() {
            let shape = [0, batch_size, self.hidden_size];
            return (Tensor::zeros(&shape, (inputs.kind(), self.device)), state);
        }
        (Tensor::stack(&outputs, 0), state)
    }
}

impl IterativeModule for Lstm {
    type State = RecurrentState;

    fn initial_state(&self, batch_size: i64) -> Self::State {
        RecurrentState::zeros(batch_size, self.hidden_size, self.device)
    }

    fn step(&self, input: &Tensor, state: &Self::State) -> (Tensor, Self::State) {
        let (hidden, cell) = input.lstm_cell(
            &[&state.hidden, &state.cell],
            self.w_ih(),
            self.w_hh(),
            self.b_ih(),
            self.b_hh(),
        );
        let output = hidden.shallow_clone();
        (output, RecurrentState::new(hidden, cell))
    }
}
