mod algorithms;
mod environments;
mod services;
mod config;
mod error;

use std::path::PathBuf;
use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use crate::config::{MyAutodiffBackend, MyBackend, RunConfig, SearchConfig, DAY0, DAYN};
use crate::environments::env::GridEnv;
use crate::environments::synthetic_grid::SyntheticGrid;
use crate::services::algorithms::exports::metrics::{CsvMetrics, MetricsSink, NoopMetrics};
use crate::services::algorithms::exports::model_free::sac::load_policy;
use crate::services::algorithms::helpers::get_device;
use crate::services::envs::run::{evaluate_policy, train, HyperPoint};
use crate::services::search::run_search;

#[derive(Parser)]
#[command(name = "main", about = "Discrete soft actor-critic for microgrid control, with Bayesian hyperparameter search")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Search gamma, tau, hidden size and learning rate; one full training run per trial.
    Search {
        #[command(flatten)]
        run: RunArgs,
        /// Surrogate-guided trials.
        #[arg(long, default_value_t = 50)]
        trials: usize,
        /// Uniformly random trials before the surrogate takes over.
        #[arg(long, default_value_t = 0)]
        init_points: usize,
        #[arg(long, default_value_t = 0.5)]
        xi: f64,
        /// Trial log file; repeat for mirrors. Defaults to ./logs.json and ./logs2.json.
        #[arg(long = "log")]
        logs: Vec<PathBuf>,
        /// Register the trials of an earlier log before searching.
        #[arg(long)]
        resume: Option<PathBuf>,
        #[arg(long, default_value_t = 1)]
        search_seed: u64,
    },
    /// One training run with fixed hyperparameters.
    Train {
        #[command(flatten)]
        run: RunArgs,
        #[arg(long, default_value_t = 0.99)]
        gamma: f64,
        #[arg(long, default_value_t = 0.005)]
        tau: f64,
        #[arg(long, default_value_t = 256.0)]
        hidden_size: f64,
        #[arg(long, default_value_t = 5e-4)]
        learning_rate: f64,
    },
    /// Replay days with the argmax of a saved policy; no learning.
    Evaluate {
        /// Checkpoint written by a training run, e.g. ./trained_models/SACSAC500.mpk.
        checkpoint: PathBuf,
        /// Hidden width the checkpoint was trained with.
        #[arg(long, default_value_t = 256)]
        hidden_size: usize,
        #[arg(long, default_value_t = DAY0)]
        first_day: usize,
        /// Exclusive.
        #[arg(long, default_value_t = DAYN)]
        last_day: usize,
        #[arg(long, default_value_t = 96)]
        seed: u64,
        #[arg(long)]
        gpu: bool,
    },
}

#[derive(Args)]
struct RunArgs {
    #[arg(long, default_value = "SAC")]
    run_name: String,
    #[arg(long, default_value_t = 500)]
    episodes: usize,
    #[arg(long, default_value_t = 100_000)]
    buffer_size: usize,
    #[arg(long, default_value_t = 96)]
    seed: u64,
    #[arg(long, default_value_t = 100)]
    save_every: usize,
    #[arg(long, default_value_t = 300)]
    batch_size: usize,
    /// Random transitions collected before learning starts.
    #[arg(long, default_value_t = 10_000)]
    warmup: usize,
    #[arg(long, default_value_t = DAY0)]
    first_day: usize,
    /// Exclusive.
    #[arg(long, default_value_t = DAYN)]
    last_day: usize,
    /// Discount every learning step with this value instead of the proposed gamma.
    #[arg(long)]
    fixed_gamma: Option<f32>,
    #[arg(long)]
    gpu: bool,
    #[arg(long, default_value = "./data")]
    output_dir: PathBuf,
    #[arg(long, default_value = "./trained_models")]
    checkpoint_dir: PathBuf,
    /// Skip the per-run CSV metrics.
    #[arg(long)]
    no_metrics: bool,
    #[arg(long)]
    no_progress: bool,
}

impl RunArgs {
    fn run_config(&self) -> RunConfig {
        RunConfig {
            run_name: self.run_name.clone(),
            episodes: self.episodes,
            buffer_size: self.buffer_size,
            seed: self.seed,
            save_every: self.save_every,
            batch_size: self.batch_size,
            warmup_samples: self.warmup,
            days: self.first_day..self.last_day,
            fixed_gamma: self.fixed_gamma,
            output_dir: self.output_dir.clone(),
            checkpoint_dir: self.checkpoint_dir.clone(),
            progress: !self.no_progress,
        }
    }

    fn metrics(&self) -> Box<dyn MetricsSink> {
        if self.no_metrics {
            Box::new(NoopMetrics)
        } else {
            Box::new(CsvMetrics::new())
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match Cli::parse().command {
        Command::Search { run, trials, init_points, xi, logs, resume, search_seed } => {
            let device = get_device(run.gpu);
            info!(?device, "using device");

            let run_config = run.run_config();
            let defaults = SearchConfig::default();
            let search_config = SearchConfig {
                init_points,
                n_iter: trials,
                xi,
                log_paths: if logs.is_empty() { defaults.log_paths.clone() } else { logs },
                resume_from: resume,
                seed: search_seed,
                ..defaults
            };

            let result = run_search(&search_config, |params| {
                let hyper = HyperPoint::from_params(params)?;
                let mut env = SyntheticGrid::default();
                let mut metrics = run.metrics();
                train::<MyAutodiffBackend, _>(&run_config, &hyper, &mut env, metrics.as_mut(), &device)
            })
            .context("hyperparameter search failed")?;

            if result.resumed > 0 {
                println!("Resumed {} logged trials", result.resumed);
            }
            for trial in &result.trials {
                match trial.target {
                    Some(target) => println!("| {:>3} | {:>12.4} | {:?}", trial.index + 1, target, trial.params),
                    None => println!(
                        "| {:>3} | {:>12} | {:?} ({})",
                        trial.index + 1,
                        "failed",
                        trial.params,
                        trial.error.as_deref().unwrap_or("unknown error")
                    ),
                }
            }
            match result.best {
                Some(best) => {
                    println!("Best parameters: {:?}", best.params);
                    println!("Best target: {}", best.target);
                }
                None => println!("No trial finished successfully"),
            }
        }
        Command::Train { run, gamma, tau, hidden_size, learning_rate } => {
            let device = get_device(run.gpu);
            info!(?device, "using device");

            let hyper = HyperPoint { gamma, tau, hidden_size, learning_rate };
            let mut env = SyntheticGrid::default();
            let mut metrics = run.metrics();
            let total = train::<MyAutodiffBackend, _>(&run.run_config(), &hyper, &mut env, metrics.as_mut(), &device)
                .context("training run failed")?;
            println!("Total reward: {total}");
        }
        Command::Evaluate { checkpoint, hidden_size, first_day, last_day, seed, gpu } => {
            let device = get_device(gpu);
            info!(?device, "using device");

            let mut env = SyntheticGrid::default();
            env.seedy(seed);
            let actor = load_policy::<MyBackend>(&checkpoint, env.num_actions(), hidden_size, &device)
                .with_context(|| format!("could not load {checkpoint:?}"))?;
            let rewards = evaluate_policy(&actor, &mut env, first_day..last_day, &device)
                .context("evaluation failed")?;

            for (day, reward) in &rewards {
                println!("| day {day:>3} | {reward:>12.4} |");
            }
            println!("Total reward: {}", rewards.iter().map(|(_, r)| r).sum::<f64>());
        }
    }
    Ok(())
}
