pub mod acquisition;
pub mod gaussian_process;
pub mod optimizer;
pub mod space;
pub mod trial_log;

use std::collections::BTreeMap;
use tracing::{info, warn};
use crate::config::SearchConfig;
use crate::error::SacError;
use optimizer::BayesianOptimizer;
use space::SearchSpace;
use trial_log::{load_logs, TrialLogger};

#[derive(Debug, Clone, PartialEq)]
pub struct TrialResult {
    pub index: usize,
    pub params: BTreeMap<String, f64>,
    /// `None` when the trial failed.
    pub target: Option<f64>,
    pub error: Option<String>,
    /// Best target registered after this trial, resumed trials included.
    pub best_so_far: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BestTrial {
    pub params: BTreeMap<String, f64>,
    pub target: f64,
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    /// Best over resumed and new trials; `None` if nothing ever succeeded.
    pub best: Option<BestTrial>,
    /// Trials run by this call, in order.
    pub trials: Vec<TrialResult>,
    /// Logged trials registered before searching, failures included.
    pub resumed: usize,
}

fn register_previous(optimizer: &mut BayesianOptimizer, config: &SearchConfig) -> Result<usize, SacError> {
    let Some(path) = &config.resume_from else { return Ok(0) };
    let mut count = 0;
    for record in load_logs(path)? {
        let registered = optimizer.space().from_params(&record.params).and_then(|point| match record.target {
            Some(target) => optimizer.register(point, target),
            None => optimizer.register_failure(point),
        });
        match registered {
            Ok(()) => count += 1,
            Err(e) => warn!("skipping logged trial: {e}"),
        }
    }
    info!(path = ?path, trials = count, "resumed from trial log");
    Ok(count)
}

/// Maximise `objective` over `config.bounds`.
///
/// Each proposal is checked against the bounds before the objective sees it.
/// A failing or non-finite objective is logged as a failed trial, handed to
/// the surrogate as a bad outcome, and the search moves on; only trial-log IO
/// aborts the search.
pub fn run_search<F>(config: &SearchConfig, mut objective: F) -> Result<SearchResult, SacError>
where
    F: FnMut(&BTreeMap<String, f64>) -> Result<f64, SacError>,
{
    let space = SearchSpace::new(&config.bounds)?;
    let mut optimizer = BayesianOptimizer::new(space.clone(), config.xi, config.n_warmup, config.n_refine, config.seed);
    let resumed = register_previous(&mut optimizer, config)?;
    let mut logger = TrialLogger::new(&config.log_paths)?;

    let total = config.init_points + config.n_iter;
    let mut trials = Vec::with_capacity(total);

    for index in 0..total {
        let point = if index < config.init_points { optimizer.random_point() } else { optimizer.suggest()? };
        let params = space.to_params(&point);
        info!(trial = index, ?params, "starting trial");

        let checked = space.validate(&point);
        let in_bounds = checked.is_ok();
        let outcome = checked.and_then(|_| objective(&params)).and_then(|v| {
            if v.is_finite() {
                Ok(v)
            } else {
                Err(SacError::Search(format!("objective returned {v}")))
            }
        });
        logger.log(&params, outcome.as_ref().map(|v| *v))?;

        let (target, error) = match outcome {
            Ok(v) => {
                optimizer.register(point, v)?;
                (Some(v), None)
            }
            Err(e) => {
                warn!(trial = index, "trial failed: {e}");
                if in_bounds {
                    optimizer.register_failure(point)?;
                }
                (None, Some(e.to_string()))
            }
        };
        let best_so_far = optimizer.max().map(|(_, best)| best);
        info!(trial = index, target = ?target, best = ?best_so_far, "trial finished");
        trials.push(TrialResult { index, params, target, error, best_so_far });
    }

    let best = optimizer.max().map(|(x, target)| BestTrial { params: space.to_params(x), target });
    Ok(SearchResult { best, trials, resumed })
}
