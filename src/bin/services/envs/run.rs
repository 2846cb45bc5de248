use std::collections::{BTreeMap, VecDeque};
use std::ops::Range;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::TensorData;
use kdam::tqdm;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use tracing::{debug, info, trace, warn};
use crate::algorithms::model_free::sac::{LearnOutcome, SacAgent, SacParams};
use crate::config::{RunConfig, REWARD_WINDOW};
use crate::environments::env::GridEnv;
use crate::error::SacError;
use crate::services::algorithms::exports::metrics::MetricsSink;
use crate::services::algorithms::exports::model_free::sac::save_policy;
use crate::services::algorithms::model::{check_state_size, Actor};
use crate::services::algorithms::replay_buffer::{ReplayBuffer, Transition, TransitionBatch};

/// One point of the searched space, as proposed (hidden size not yet truncated).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HyperPoint {
    pub gamma: f64,
    pub tau: f64,
    pub hidden_size: f64,
    pub learning_rate: f64,
}

impl HyperPoint {
    pub fn from_params(params: &BTreeMap<String, f64>) -> Result<Self, SacError> {
        let get = |name: &str| {
            params
                .get(name)
                .copied()
                .ok_or_else(|| SacError::Search(format!("proposal is missing `{name}`")))
        };
        Ok(Self {
            gamma: get("gamma")?,
            tau: get("tau")?,
            hidden_size: get("hidden_size")?,
            learning_rate: get("learning_rate")?,
        })
    }

    pub fn sac_params(&self) -> SacParams {
        SacParams {
            gamma: self.gamma as f32,
            tau: self.tau as f32,
            hidden_size: self.hidden_size.trunc().max(0.0) as usize,
            learning_rate: self.learning_rate,
        }
    }

    pub fn scalars(&self) -> [(&'static str, f64); 4] {
        [
            ("Gamma", self.gamma),
            ("Tau", self.tau),
            ("Hidden size", self.hidden_size.trunc()),
            ("Learning rate", self.learning_rate),
        ]
    }
}

/// What one episode produced.
#[derive(Debug, Clone, Copy, Default)]
pub struct EpisodeStats {
    pub steps: usize,
    pub reward: f64,
    pub learn_calls: usize,
    pub last_outcome: Option<LearnOutcome>,
}

/// Fill the buffer with `num_samples` uniformly random transitions,
/// starting a fresh episode whenever one ends.
pub fn collect_random<E: GridEnv + ?Sized>(
    env: &mut E,
    buffer: &mut ReplayBuffer,
    num_samples: usize,
) -> Result<(), SacError> {
    let mut state = env.reset(None)?;
    for _ in 0..num_samples {
        let action = env.sample_action();
        let outcome = env.step(action)?;
        let done = outcome.done;
        buffer.push(Transition {
            state,
            action,
            reward: outcome.reward,
            next_state: outcome.observation.clone(),
            done,
        });
        state = if done { env.reset(None)? } else { outcome.observation };
    }
    Ok(())
}

/// Play one episode anchored to `day`, running one learner cycle per step.
pub fn run_episode<B: AutodiffBackend, E: GridEnv + ?Sized>(
    agent: &mut SacAgent<B>,
    env: &mut E,
    buffer: &mut ReplayBuffer,
    day: usize,
    batch_size: usize,
    gamma: f32,
    rng: &mut Xoshiro256PlusPlus,
) -> Result<EpisodeStats, SacError> {
    let mut stats = EpisodeStats::default();
    let mut state = env.reset(Some(day))?;

    loop {
        let action = agent.get_action(&state)?;
        let outcome = env.step(action)?;
        let done = outcome.done;
        trace!(step = stats.steps, action, reward = outcome.reward, info = ?outcome.info, "env step");
        buffer.push(Transition {
            state,
            action,
            reward: outcome.reward,
            next_state: outcome.observation.clone(),
            done,
        });

        let batch = TransitionBatch::from_transitions(
            &buffer.sample(batch_size, rng)?,
            agent.state_size(),
            agent.device(),
        )?;
        let learned = agent.learn(batch, gamma)?;
        if !learned.is_finite() {
            debug!(?learned, "non-finite learner output");
        }

        stats.steps += 1;
        stats.reward += outcome.reward as f64;
        stats.learn_calls += 1;
        stats.last_outcome = Some(learned);

        state = outcome.observation;
        if done {
            break;
        }
    }
    Ok(stats)
}

fn validate(config: &RunConfig) -> Result<(), SacError> {
    if config.batch_size == 0 {
        return Err(SacError::InvalidConfig("batch size must be positive".into()));
    }
    if config.warmup_samples < config.batch_size {
        return Err(SacError::InvalidConfig(format!(
            "warm-up of {} samples cannot fill a batch of {}",
            config.warmup_samples, config.batch_size
        )));
    }
    if config.buffer_size < config.batch_size {
        return Err(SacError::InvalidConfig(format!(
            "buffer of {} cannot hold a batch of {}",
            config.buffer_size, config.batch_size
        )));
    }
    Ok(())
}

fn report<M: MetricsSink + ?Sized>(metrics: &mut M, scalars: &[(&str, f64)]) {
    if let Err(e) = metrics.log(scalars) {
        warn!("metrics log failed: {e}");
    }
}

/// One complete training run. Returns the sum, over days, of the reward of
/// each day's final episode; this is the value the search maximises.
///
/// Besides one metrics row per episode, every finished day logs a row with
/// `Day`, `Total Reward` and `Final Reward`.
pub fn train<B: AutodiffBackend, E: GridEnv + ?Sized>(
    config: &RunConfig,
    hyper: &HyperPoint,
    env: &mut E,
    metrics: &mut dyn MetricsSink,
    device: &B::Device,
) -> Result<f64, SacError> {
    validate(config)?;

    B::seed(config.seed);
    env.seedy(config.seed);
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(config.seed);

    let params = hyper.sac_params();
    let gamma = config.fixed_gamma.unwrap_or(params.gamma);
    let mut agent = SacAgent::<B>::new(params, env.observation_size(), env.num_actions(), config.seed, device)?;

    metrics.init(config, &hyper.scalars())?;
    if let Some(dir) = metrics.run_dir() {
        info!(?dir, "writing run metrics");
    }
    for (name, count) in agent.parameter_counts() {
        if let Err(e) = metrics.watch(name, count) {
            warn!("metrics watch failed for {name}: {e}");
        }
    }

    let mut buffer = ReplayBuffer::new(config.buffer_size);
    collect_random(env, &mut buffer, config.warmup_samples)?;
    info!(samples = buffer.len(), "random warm-up done");

    let mut average10: VecDeque<f64> = VecDeque::with_capacity(REWARD_WINDOW);
    let mut total_steps = 0usize;
    let mut total_reward = 0.0;
    let mut last_final_reward = 0.0;
    let mut run_count = 0usize;

    for day in config.days.clone() {
        let mut final_reward = 0.0;

        for episode in tqdm!(1..=config.episodes, desc = format!("day {day}"), disable = !config.progress) {
            let stats = run_episode(&mut agent, env, &mut buffer, day, config.batch_size, gamma, &mut rng)?;
            total_steps += stats.steps;
            run_count += 1;
            debug!(episode, learn_calls = stats.learn_calls, "episode finished");

            if average10.len() == REWARD_WINDOW {
                average10.pop_front();
            }
            average10.push_back(stats.reward);
            let mean10 = average10.iter().sum::<f64>() / average10.len() as f64;

            let learned = stats.last_outcome.unwrap_or(LearnOutcome {
                policy_loss: f32::NAN,
                alpha_loss: f32::NAN,
                critic1_loss: f32::NAN,
                critic2_loss: f32::NAN,
                alpha: agent.alpha(),
            });
            info!(
                "Episode: {} | Reward: {:.3} | Policy Loss: {:.4} | Steps: {}",
                episode, stats.reward, learned.policy_loss, total_steps
            );

            let mut scalars = vec![
                ("Day", day as f64),
                ("Episode", episode as f64),
                ("Reward", stats.reward),
                ("Total Reward", total_reward),
                ("Final Reward", last_final_reward),
                ("Average10", mean10),
                ("Steps", total_steps as f64),
                ("Policy Loss", learned.policy_loss as f64),
                ("Alpha Loss", learned.alpha_loss as f64),
                ("Bellmann error 1", learned.critic1_loss as f64),
                ("Bellmann error 2", learned.critic2_loss as f64),
                ("Alpha", learned.alpha as f64),
                ("run_count", run_count as f64),
                ("Buffer size", buffer.len() as f64),
            ];
            scalars.extend(hyper.scalars());
            report(metrics, &scalars);

            if config.save_every > 0 && episode % config.save_every == 0 {
                match save_policy(agent.actor(), &config.checkpoint_dir, &config.run_name, Some(episode)) {
                    Ok(path) => {
                        if let Err(e) = metrics.save(&path) {
                            warn!("could not attach checkpoint {path:?}: {e}");
                        }
                    }
                    Err(e) => warn!("{e}"),
                }
            }

            final_reward = stats.reward;
        }

        total_reward += final_reward;
        last_final_reward = final_reward;
        info!(day, final_reward, total_reward, "day finished");
        report(
            metrics,
            &[("Day", day as f64), ("Total Reward", total_reward), ("Final Reward", final_reward)],
        );
    }

    Ok(total_reward)
}

/// Replay each day once with the argmax of `actor`, without learning.
/// Returns the episode reward per day.
pub fn evaluate_policy<B: Backend, E: GridEnv + ?Sized>(
    actor: &Actor<B>,
    env: &mut E,
    days: Range<usize>,
    device: &B::Device,
) -> Result<Vec<(usize, f64)>, SacError> {
    let state_size = env.observation_size();
    check_state_size(state_size)?;

    let mut rewards = Vec::with_capacity(days.len());
    for day in days {
        let mut state = env.reset(Some(day))?;
        let mut reward = 0.0;
        loop {
            if state.len() != state_size {
                return Err(SacError::InvalidObservation { got: state.len(), expected: state_size, min: state_size });
            }
            let obs = Tensor::<B, 2>::from_data(TensorData::new(state, [1, state_size]), device);
            let action = actor
                .greedy_action(obs)?
                .first()
                .copied()
                .ok_or_else(|| SacError::Sampling("empty action batch".into()))?;
            let outcome = env.step(action)?;
            reward += outcome.reward as f64;
            if outcome.done {
                break;
            }
            state = outcome.observation;
        }
        debug!(day, reward, "evaluation day finished");
        rewards.push((day, reward));
    }
    Ok(rewards)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::Path;
    use burn::backend::{Autodiff, NdArray};
    use crate::environments::env::StepOutcome;
    use crate::services::algorithms::exports::metrics::NoopMetrics;
    use crate::services::algorithms::exports::model_free::sac::{checkpoint_path, load_policy};

    type B = Autodiff<NdArray<f32>>;

    /// Ends every episode on its third step, reward 1.0 per step.
    struct ScriptedEnv {
        t: usize,
        resets: usize,
        steps: usize,
    }

    impl ScriptedEnv {
        fn new() -> Self {
            Self { t: 0, resets: 0, steps: 0 }
        }

        fn obs(&self) -> Vec<f32> {
            (0..10).map(|i| (self.t + i) as f32 * 0.1).collect()
        }
    }

    impl GridEnv for ScriptedEnv {
        fn observation_size(&self) -> usize { 10 }
        fn num_actions(&self) -> usize { 2 }

        fn reset(&mut self, _day: Option<usize>) -> Result<Vec<f32>, SacError> {
            self.t = 0;
            self.resets += 1;
            Ok(self.obs())
        }

        fn step(&mut self, action: usize) -> Result<StepOutcome, SacError> {
            if action >= 2 {
                return Err(SacError::Environment("bad action".into()));
            }
            self.t += 1;
            self.steps += 1;
            Ok(StepOutcome { observation: self.obs(), reward: 1.0, done: self.t == 3, info: HashMap::new() })
        }

        fn sample_action(&mut self) -> usize { self.steps % 2 }
        fn seedy(&mut self, _seed: u64) {}
    }

    struct FailingEnv;

    impl GridEnv for FailingEnv {
        fn observation_size(&self) -> usize { 10 }
        fn num_actions(&self) -> usize { 2 }
        fn reset(&mut self, _day: Option<usize>) -> Result<Vec<f32>, SacError> { Ok(vec![0.0; 10]) }
        fn step(&mut self, _action: usize) -> Result<StepOutcome, SacError> {
            Err(SacError::Environment("simulator crashed".into()))
        }
        fn sample_action(&mut self) -> usize { 0 }
        fn seedy(&mut self, _seed: u64) {}
    }

    /// Keeps every logged row in memory.
    #[derive(Default)]
    struct RecordingMetrics {
        rows: Vec<Vec<(String, f64)>>,
    }

    impl RecordingMetrics {
        fn day_rows(&self) -> Vec<&Vec<(String, f64)>> {
            self.rows.iter().filter(|r| !r.iter().any(|(k, _)| k == "Episode")).collect()
        }

        fn episode_rows(&self) -> Vec<&Vec<(String, f64)>> {
            self.rows.iter().filter(|r| r.iter().any(|(k, _)| k == "Episode")).collect()
        }
    }

    fn column(row: &[(String, f64)], name: &str) -> f64 {
        row.iter().find(|(k, _)| k == name).map(|(_, v)| *v).unwrap()
    }

    impl MetricsSink for RecordingMetrics {
        fn init(&mut self, _config: &RunConfig, _hyper: &[(&str, f64)]) -> Result<(), SacError> { Ok(()) }
        fn log(&mut self, scalars: &[(&str, f64)]) -> Result<(), SacError> {
            self.rows.push(scalars.iter().map(|(k, v)| (k.to_string(), *v)).collect());
            Ok(())
        }
        fn watch(&mut self, _name: &str, _num_params: usize) -> Result<(), SacError> { Ok(()) }
        fn save(&mut self, _artifact: &Path) -> Result<(), SacError> { Ok(()) }
    }

    fn hyper() -> HyperPoint {
        HyperPoint { gamma: 0.9, tau: 0.01, hidden_size: 16.7, learning_rate: 1e-3 }
    }

    fn small_config(dir: &Path) -> RunConfig {
        RunConfig {
            episodes: 2,
            buffer_size: 64,
            batch_size: 4,
            warmup_samples: 8,
            days: 0..2,
            save_every: 0,
            progress: false,
            output_dir: dir.join("data"),
            checkpoint_dir: dir.join("models"),
            ..RunConfig::default()
        }
    }

    #[test]
    fn warm_up_resets_on_done() {
        let mut env = ScriptedEnv::new();
        let mut buffer = ReplayBuffer::new(100);
        collect_random(&mut env, &mut buffer, 7).unwrap();

        assert_eq!(buffer.len(), 7);
        // initial reset plus one after each finished episode (steps 3 and 6)
        assert_eq!(env.resets, 3);
        assert_eq!(buffer.iter().filter(|t| t.done).count(), 2);
    }

    #[test]
    fn episode_of_three_steps_learns_three_times() {
        let device = Default::default();
        let mut env = ScriptedEnv::new();
        let mut buffer = ReplayBuffer::new(100);
        collect_random(&mut env, &mut buffer, 8).unwrap();
        let before = buffer.len();

        let mut agent = SacAgent::<B>::new(hyper().sac_params(), 10, 2, 0, &device).unwrap();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0);
        let stats = run_episode(&mut agent, &mut env, &mut buffer, 50, 4, 0.99, &mut rng).unwrap();

        assert_eq!(buffer.len() - before, 3);
        assert_eq!(stats.steps, 3);
        assert_eq!(stats.learn_calls, 3);
        assert_eq!(stats.reward, 3.0);
        assert!(stats.last_outcome.unwrap().is_finite());
    }

    #[test]
    fn total_reward_sums_final_episode_of_each_day() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let mut env = ScriptedEnv::new();
        let total = train::<B, _>(&small_config(dir.path()), &hyper(), &mut env, &mut NoopMetrics, &device).unwrap();
        assert_eq!(total, 6.0);
    }

    #[test]
    fn total_reward_columns_follow_finished_days() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let mut metrics = RecordingMetrics::default();
        train::<B, _>(&small_config(dir.path()), &hyper(), &mut ScriptedEnv::new(), &mut metrics, &device).unwrap();

        let days = metrics.day_rows();
        assert_eq!(days.len(), 2);
        for (i, row) in days.iter().enumerate() {
            assert_eq!(column(row, "Day"), i as f64);
            assert_eq!(column(row, "Final Reward"), 3.0);
        }
        assert_eq!(column(days[0], "Total Reward"), 3.0);
        assert_eq!(column(days[1], "Total Reward"), 6.0);

        let episodes = metrics.episode_rows();
        assert_eq!(episodes.len(), 4);
        assert_eq!(column(episodes[0], "Total Reward"), 0.0);
        assert_eq!(column(episodes[1], "Total Reward"), 0.0);
        assert_eq!(column(episodes[2], "Total Reward"), 3.0);
        assert_eq!(column(episodes[2], "Final Reward"), 3.0);
    }

    #[test]
    fn saved_policy_replays_greedily() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let config = RunConfig { save_every: 2, days: 0..1, ..small_config(dir.path()) };
        train::<B, _>(&config, &hyper(), &mut ScriptedEnv::new(), &mut NoopMetrics, &device).unwrap();

        let path = checkpoint_path(&config.checkpoint_dir, &config.run_name, Some(2));
        let hidden = hyper().sac_params().hidden_size;
        let actor = load_policy::<NdArray<f32>>(&path, 2, hidden, &device).unwrap();
        let rewards = evaluate_policy(&actor, &mut ScriptedEnv::new(), 3..5, &device).unwrap();
        assert_eq!(rewards, vec![(3, 3.0), (4, 3.0)]);
    }

    #[test]
    fn checkpoints_follow_save_every() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let config = RunConfig { save_every: 2, days: 0..1, ..small_config(dir.path()) };
        train::<B, _>(&config, &hyper(), &mut ScriptedEnv::new(), &mut NoopMetrics, &device).unwrap();

        assert!(config.checkpoint_dir.join("SACSAC2.mpk").exists());
        assert!(!config.checkpoint_dir.join("SACSAC1.mpk").exists());
    }

    #[test]
    fn warm_up_must_cover_a_batch() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let config = RunConfig { warmup_samples: 2, ..small_config(dir.path()) };
        let result = train::<B, _>(&config, &hyper(), &mut ScriptedEnv::new(), &mut NoopMetrics, &device);
        assert!(matches!(result, Err(SacError::InvalidConfig(_))));
    }

    #[test]
    fn environment_failure_ends_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let result = train::<B, _>(&small_config(dir.path()), &hyper(), &mut FailingEnv, &mut NoopMetrics, &device);
        assert!(matches!(result, Err(SacError::Environment(_))));
    }

    #[test]
    fn proposal_needs_every_dimension() {
        let mut params = BTreeMap::new();
        params.insert("gamma".to_string(), 0.5);
        assert!(HyperPoint::from_params(&params).is_err());

        for (k, v) in [("tau", 0.1), ("hidden_size", 100.9), ("learning_rate", 0.01)] {
            params.insert(k.to_string(), v);
        }
        let point = HyperPoint::from_params(&params).unwrap();
        assert_eq!(point.sac_params().hidden_size, 100);
    }
}
