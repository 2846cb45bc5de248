use std::collections::HashMap;
use crate::error::SacError;

/// What one environment step hands back.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub observation: Vec<f32>,
    pub reward: f32,
    pub done: bool,
    pub info: HashMap<String, f32>,
}

/// Contract the training loop needs from a microgrid simulator.
///
/// Observations are a variable-length profile block followed by
/// `CONTEXT_FEATURES` context values; actions are indices in `0..num_actions()`.
pub trait GridEnv {
    fn observation_size(&self) -> usize;
    fn num_actions(&self) -> usize;

    /// Start a new episode, anchored to `day` when given.
    fn reset(&mut self, day: Option<usize>) -> Result<Vec<f32>, SacError>;
    fn step(&mut self, action: usize) -> Result<StepOutcome, SacError>;

    /// Uniformly random action, independent of any policy.
    fn sample_action(&mut self) -> usize;

    /// Seed both the simulator and its action sampler.
    fn seedy(&mut self, seed: u64);
}
