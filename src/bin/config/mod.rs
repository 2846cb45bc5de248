use std::ops::Range;
use std::path::PathBuf;
use burn::backend::{Autodiff, LibTorch};
/**
* -------------------------------------------------------------------------
* BACKEND AND DEVICE INITIALIZATION
* -------------------------------------------------------------------------
*/
pub type MyBackend = LibTorch;
pub type MyAutodiffBackend = Autodiff<MyBackend>;

/**
* -------------------------------------------------------------------------
* OBSERVATION LAYOUT AND NETWORK CONSTANTS
* -------------------------------------------------------------------------
*/
/// Trailing context features after the pooled profile block.
pub const CONTEXT_FEATURES: usize = 7;
/// Network input width: one pooled profile feature plus the context block.
pub const POOLED_FEATURES: usize = CONTEXT_FEATURES + 1;
/// Substituted for exact-zero probabilities before taking a log.
pub const LOG_EPSILON: f32 = 1e-8;
pub const CLIP_GRAD_NORM: f32 = 1.0;
pub const FINAL_LAYER_INIT: f64 = 3e-3;
pub const CRITIC1_SEED: u64 = 2;
pub const CRITIC2_SEED: u64 = 1;
/// Episode rewards kept for the rolling mean.
pub const REWARD_WINDOW: usize = 10;

/**
* -------------------------------------------------------------------------
* TRAINING RUN
* -------------------------------------------------------------------------
*/
pub const DAY0: usize = 50;
pub const DAYN: usize = 60;

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub run_name: String,
    pub episodes: usize,
    pub buffer_size: usize,
    pub seed: u64,
    pub save_every: usize,
    pub batch_size: usize,

    // warm-up and day range
    pub warmup_samples: usize,
    pub days: Range<usize>,

    // discount passed to every learning step instead of the proposed gamma
    pub fixed_gamma: Option<f32>,

    // outputs
    pub output_dir: PathBuf,
    pub checkpoint_dir: PathBuf,
    pub progress: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            run_name: "SAC".to_string(),
            episodes: 500,
            buffer_size: 100_000,
            seed: 96,
            save_every: 100,
            batch_size: 300,

            warmup_samples: 10_000,
            days: DAY0..DAYN,

            fixed_gamma: None,

            output_dir: PathBuf::from("./data"),
            checkpoint_dir: PathBuf::from("./trained_models"),
            progress: true,
        }
    }
}

/**
* -------------------------------------------------------------------------
* HYPERPARAMETER SEARCH
* -------------------------------------------------------------------------
*/
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// (name, low, high) for every searched dimension.
    pub bounds: Vec<(String, f64, f64)>,
    pub init_points: usize,
    pub n_iter: usize,
    /// Expected-improvement exploration margin.
    pub xi: f64,
    /// Every completed trial is appended to each of these files.
    pub log_paths: Vec<PathBuf>,
    /// Previously written trial log to register before new trials run.
    pub resume_from: Option<PathBuf>,
    pub seed: u64,

    // acquisition maximisation
    pub n_warmup: usize,
    pub n_refine: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            bounds: vec![
                ("gamma".to_string(), 0.0, 1.0),
                ("tau".to_string(), 0.0, 1.0),
                ("hidden_size".to_string(), 64.0, 256.0),
                ("learning_rate".to_string(), 0.0, 1.0),
            ],
            init_points: 0,
            n_iter: 50,
            xi: 0.5,
            log_paths: vec![PathBuf::from("./logs.json"), PathBuf::from("./logs2.json")],
            resume_from: None,
            seed: 1,

            n_warmup: 10_000,
            n_refine: 10,
        }
    }
}
