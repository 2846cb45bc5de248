use burn::module::Param;
use burn::nn::{Initializer, Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::Distribution;
use burn::tensor::activation::{relu, softmax};
use rand::Rng;
use crate::config::{CONTEXT_FEATURES, FINAL_LAYER_INIT, POOLED_FEATURES};
use crate::error::SacError;
use crate::services::algorithms::helpers::{argmax_rows, safe_log, sample_rows};

/// Mean-pool the leading profile block into one feature and append the
/// trailing context block: `[batch, n] -> [batch, CONTEXT_FEATURES + 1]`.
pub fn pool_profile<B: Backend>(obs: Tensor<B, 2>) -> Tensor<B, 2> {
    let [batch, width] = obs.dims();
    let split = width - CONTEXT_FEATURES;

    let profile = obs.clone().slice([0..batch, 0..split]).mean_dim(1);
    let context = obs.slice([0..batch, split..width]);
    Tensor::cat(vec![profile, context], 1)
}

/// Observations need at least one profile feature in front of the context block.
pub fn check_state_size(state_size: usize) -> Result<(), SacError> {
    if state_size <= CONTEXT_FEATURES {
        return Err(SacError::InvalidObservation {
            got: state_size,
            expected: state_size,
            min: CONTEXT_FEATURES + 1,
        });
    }
    Ok(())
}

/// Action probabilities and their safeguarded logs, one row per observation.
pub struct PolicyOutput<B: Backend> {
    pub probs: Tensor<B, 2>,
    pub log_probs: Tensor<B, 2>,
}

#[derive(Module, Debug)]
pub struct Actor<B: Backend> {
    fc1: Linear<B>,
    fc2: Linear<B>,
    fc3: Linear<B>,
}

impl<B: Backend> Actor<B> {
    pub fn new(device: &B::Device, action_size: usize, hidden_size: usize) -> Self {
        Self {
            fc1: LinearConfig::new(POOLED_FEATURES, hidden_size).init(device),
            fc2: LinearConfig::new(hidden_size, hidden_size).init(device),
            fc3: LinearConfig::new(hidden_size, action_size).init(device),
        }
    }

    /// Action probabilities, one row per observation.
    pub fn forward(&self, obs: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = pool_profile(obs);
        let x = relu(self.fc1.forward(x));
        let x = relu(self.fc2.forward(x));
        softmax(self.fc3.forward(x), 1)
    }

    /// Probabilities with zero entries lifted to `LOG_EPSILON` inside the log only.
    pub fn evaluate(&self, obs: Tensor<B, 2>) -> PolicyOutput<B> {
        let probs = self.forward(obs);
        let log_probs = safe_log(probs.clone());
        PolicyOutput { probs, log_probs }
    }

    /// One categorical draw per row, the same distribution training samples
    /// from; it does not take the mode. Use `greedy_action` for the argmax.
    pub fn deterministic_action(&self, obs: Tensor<B, 2>, rng: &mut impl Rng) -> Result<Vec<usize>, SacError> {
        sample_rows(self.forward(obs), rng)
    }

    pub fn greedy_action(&self, obs: Tensor<B, 2>) -> Result<Vec<usize>, SacError> {
        argmax_rows(self.forward(obs))
    }
}

#[derive(Module, Debug)]
pub struct Critic<B: Backend> {
    pub(crate) fc1: Linear<B>,
    pub(crate) fc2: Linear<B>,
    pub(crate) fc3: Linear<B>,
}

impl<B: Backend> Critic<B> {
    /// Hidden weights ~ U(±1/sqrt(fan_in)), output weights ~ U(±3e-3).
    /// Biases keep the usual U(±1/sqrt(fan_in)) of a fresh linear layer.
    /// `seed` reseeds the backend so twin critics start from distinct, reproducible weights.
    pub fn new(device: &B::Device, action_size: usize, hidden_size: usize, seed: u64) -> Self {
        B::seed(seed);
        Self {
            fc1: uniform_linear(POOLED_FEATURES, hidden_size, fan_in_limit(POOLED_FEATURES), device),
            fc2: uniform_linear(hidden_size, hidden_size, fan_in_limit(hidden_size), device),
            fc3: uniform_linear(hidden_size, action_size, FINAL_LAYER_INIT, device),
        }
    }

    /// Q-value estimates, one column per action.
    pub fn forward(&self, obs: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = pool_profile(obs);
        let x = relu(self.fc1.forward(x));
        let x = relu(self.fc2.forward(x));
        self.fc3.forward(x)
    }
}

fn fan_in_limit(fan_in: usize) -> f64 {
    1.0 / (fan_in as f64).sqrt()
}

fn uniform_linear<B: Backend>(d_in: usize, d_out: usize, limit: f64, device: &B::Device) -> Linear<B> {
    let mut linear = LinearConfig::new(d_in, d_out)
        .with_initializer(Initializer::Uniform { min: -limit, max: limit })
        .init(device);

    // the initializer above also covers the bias; reset it independently of `limit`
    let bound = fan_in_limit(d_in);
    linear.bias = Some(Param::from_tensor(Tensor::random(
        [d_out],
        Distribution::Uniform(-bound, bound),
        device,
    )));
    linear
}
