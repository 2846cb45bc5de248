use burn::module::{AutodiffModule, Module, Param};
use burn::nn::loss::{MseLoss, Reduction};
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Adam, AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::TensorData;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use crate::config::{CLIP_GRAD_NORM, CRITIC1_SEED, CRITIC2_SEED};
use crate::error::SacError;
use crate::services::algorithms::helpers::{clip_grad_norm, scalar};
use crate::services::algorithms::model::{check_state_size, Actor, Critic};
use crate::services::algorithms::replay_buffer::TransitionBatch;
use crate::services::algorithms::target_network::soft_update;

/// Entropy temperature kept in log space so `alpha = exp(log_alpha)` stays positive.
#[derive(Module, Debug)]
pub struct LogAlpha<B: Backend> {
    value: Param<Tensor<B, 1>>,
}

impl<B: Backend> LogAlpha<B> {
    pub fn new(device: &B::Device) -> Self {
        Self { value: Param::from_tensor(Tensor::zeros([1], device)) }
    }

    pub fn alpha(&self) -> Tensor<B, 1> {
        self.value.val().exp()
    }
}

/// Hyperparameters of one learner; `hidden_size` is already an integer width.
#[derive(Debug, Clone, Copy)]
pub struct SacParams {
    pub gamma: f32,
    pub tau: f32,
    pub hidden_size: usize,
    pub learning_rate: f64,
}

/// Scalars produced by one learning cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LearnOutcome {
    pub policy_loss: f32,
    pub alpha_loss: f32,
    pub critic1_loss: f32,
    pub critic2_loss: f32,
    /// Temperature used by this cycle's actor update.
    pub alpha: f32,
}

impl LearnOutcome {
    pub fn is_finite(&self) -> bool {
        [self.policy_loss, self.alpha_loss, self.critic1_loss, self.critic2_loss, self.alpha]
            .iter()
            .all(|v| v.is_finite())
    }
}

/// Discrete-action soft actor-critic: one policy, twin critics with frozen
/// target copies, and an automatically tuned entropy temperature.
pub struct SacAgent<B: AutodiffBackend> {
    actor: Actor<B>,
    critic1: Critic<B>,
    critic2: Critic<B>,
    critic1_target: Critic<B::InnerBackend>,
    critic2_target: Critic<B::InnerBackend>,
    log_alpha: LogAlpha<B>,
    alpha: f32,
    target_entropy: f32,

    actor_optimizer: OptimizerAdaptor<Adam, Actor<B>, B>,
    critic1_optimizer: OptimizerAdaptor<Adam, Critic<B>, B>,
    critic2_optimizer: OptimizerAdaptor<Adam, Critic<B>, B>,
    alpha_optimizer: OptimizerAdaptor<Adam, LogAlpha<B>, B>,

    params: SacParams,
    state_size: usize,
    rng: Xoshiro256PlusPlus,
    device: B::Device,
}

impl<B: AutodiffBackend> SacAgent<B> {
    pub fn new(
        params: SacParams,
        state_size: usize,
        action_size: usize,
        seed: u64,
        device: &B::Device,
    ) -> Result<Self, SacError> {
        check_state_size(state_size)?;
        if action_size == 0 || params.hidden_size == 0 {
            return Err(SacError::InvalidConfig(format!(
                "need at least one action and one hidden unit, got {action_size} actions / {} units",
                params.hidden_size
            )));
        }

        B::seed(seed);
        let actor = Actor::new(device, action_size, params.hidden_size);
        let critic1 = Critic::new(device, action_size, params.hidden_size, CRITIC1_SEED);
        let critic2 = Critic::new(device, action_size, params.hidden_size, CRITIC2_SEED);

        // targets start as exact copies and live on the inner backend: never trained
        let critic1_target = critic1.valid();
        let critic2_target = critic2.valid();

        let adam = AdamConfig::new().with_epsilon(1e-8);

        Ok(Self {
            actor,
            critic1,
            critic2,
            critic1_target,
            critic2_target,
            log_alpha: LogAlpha::new(device),
            alpha: 1.0,
            target_entropy: -(action_size as f32),

            actor_optimizer: adam.init(),
            critic1_optimizer: adam.init(),
            critic2_optimizer: adam.init(),
            alpha_optimizer: adam.init(),

            params,
            state_size,
            rng: Xoshiro256PlusPlus::seed_from_u64(seed),
            device: device.clone(),
        })
    }

    pub fn actor(&self) -> &Actor<B> {
        &self.actor
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn state_size(&self) -> usize {
        self.state_size
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    fn observation(&self, state: &[f32]) -> Result<Tensor<B::InnerBackend, 2>, SacError> {
        if state.len() != self.state_size {
            return Err(SacError::InvalidObservation {
                got: state.len(),
                expected: self.state_size,
                min: self.state_size,
            });
        }
        Ok(Tensor::from_data(TensorData::new(state.to_vec(), [1, self.state_size]), &self.device))
    }

    /// Training-time action: a frozen forward pass and one categorical draw.
    pub fn get_action(&mut self, state: &[f32]) -> Result<usize, SacError> {
        let obs = self.observation(state)?;
        let actions = self.actor.valid().deterministic_action(obs, &mut self.rng)?;
        actions
            .first()
            .copied()
            .ok_or_else(|| SacError::Sampling("empty action batch".into()))
    }

    /// One full cycle: actor, temperature, both critics, then both targets.
    pub fn learn(&mut self, batch: TransitionBatch<B>, gamma: f32) -> Result<LearnOutcome, SacError> {
        let lr = self.params.learning_rate;
        let TransitionBatch { states, actions, rewards, next_states, dones } = batch;

        // actor
        let current_alpha = self.alpha;
        let policy = self.actor.evaluate(states.clone());
        let q1 = self.critic1.forward(states.clone()).detach();
        let q2 = self.critic2.forward(states.clone()).detach();
        let min_q = q1.min_pair(q2);

        let policy_loss = (policy.probs.clone() * (policy.log_probs.clone().mul_scalar(current_alpha) - min_q))
            .sum_dim(1)
            .mean();
        let log_action_pi = (policy.log_probs * policy.probs).sum_dim(1).detach();

        let grads = GradientsParams::from_grads(policy_loss.backward(), &self.actor);
        self.actor = self.actor_optimizer.step(lr, self.actor.clone(), grads);

        // temperature
        // alpha is a scalar, so mean(alpha * x) = alpha * mean(x)
        let alpha_loss = -(self.log_alpha.alpha() * log_action_pi.add_scalar(self.target_entropy).mean());

        let grads = GradientsParams::from_grads(alpha_loss.backward(), &self.log_alpha);
        self.log_alpha = self.alpha_optimizer.step(lr, self.log_alpha.clone(), grads);
        self.alpha = scalar(self.log_alpha.alpha().detach());

        // bootstrapped target, no gradients
        let next_inner = next_states.inner();
        let next_policy = self.actor.valid().evaluate(next_inner.clone());
        let q_target1_next = self.critic1_target.forward(next_inner.clone());
        let q_target2_next = self.critic2_target.forward(next_inner);
        let q_target_next = (next_policy.probs
            * (q_target1_next.min_pair(q_target2_next) - next_policy.log_probs.mul_scalar(self.alpha)))
            .sum_dim(1);
        let not_done = dones.inner().neg().add_scalar(1.0);
        let q_targets = rewards.inner() + (not_done * q_target_next).mul_scalar(gamma);
        let q_targets = Tensor::<B, 2>::from_inner(q_targets);

        // critics, each clipped on the joint norm of all its gradients
        let mse = MseLoss::new();

        let q1 = self.critic1.forward(states.clone()).gather(1, actions.clone());
        let critic1_loss = mse.forward(q1, q_targets.clone(), Reduction::Mean).mul_scalar(0.5);
        let grads = GradientsParams::from_grads(critic1_loss.backward(), &self.critic1);
        let (grads, _) = clip_grad_norm(&self.critic1, grads, CLIP_GRAD_NORM);
        self.critic1 = self.critic1_optimizer.step(lr, self.critic1.clone(), grads);

        let q2 = self.critic2.forward(states).gather(1, actions);
        let critic2_loss = mse.forward(q2, q_targets, Reduction::Mean).mul_scalar(0.5);
        let grads = GradientsParams::from_grads(critic2_loss.backward(), &self.critic2);
        let (grads, _) = clip_grad_norm(&self.critic2, grads, CLIP_GRAD_NORM);
        self.critic2 = self.critic2_optimizer.step(lr, self.critic2.clone(), grads);

        // targets
        self.sync_targets(self.params.tau);

        Ok(LearnOutcome {
            policy_loss: scalar(policy_loss),
            alpha_loss: scalar(alpha_loss),
            critic1_loss: scalar(critic1_loss),
            critic2_loss: scalar(critic2_loss),
            alpha: current_alpha,
        })
    }

    /// Blend both live critics into their targets.
    pub fn sync_targets(&mut self, tau: f32) {
        self.critic1_target = soft_update(&self.critic1.valid(), self.critic1_target.clone(), tau);
        self.critic2_target = soft_update(&self.critic2.valid(), self.critic2_target.clone(), tau);
    }

    /// Trainable parameter counts, for `watch`.
    pub fn parameter_counts(&self) -> [(&'static str, usize); 3] {
        [
            ("actor", self.actor.num_params()),
            ("critic1", self.critic1.num_params()),
            ("critic2", self.critic2.num_params()),
        ]
    }
}
