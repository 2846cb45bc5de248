use std::cmp::Ordering;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use rand_xoshiro::Xoshiro256PlusPlus;
use tracing::{debug, warn};
use crate::error::SacError;
use crate::services::search::acquisition::expected_improvement;
use crate::services::search::gaussian_process::GaussianProcess;
use crate::services::search::space::SearchSpace;

const REFINE_STEPS: usize = 30;
const REFINE_SIGMA: f64 = 0.1;

/// GP + expected-improvement proposer over a bounded box.
pub struct BayesianOptimizer {
    space: SearchSpace,
    xi: f64,
    n_warmup: usize,
    n_refine: usize,
    xs: Vec<Vec<f64>>,
    ys: Vec<f64>,
    failed: Vec<Vec<f64>>,
    rng: Xoshiro256PlusPlus,
}

impl BayesianOptimizer {
    pub fn new(space: SearchSpace, xi: f64, n_warmup: usize, n_refine: usize, seed: u64) -> Self {
        Self {
            space,
            xi,
            n_warmup: n_warmup.max(1),
            n_refine,
            xs: Vec::new(),
            ys: Vec::new(),
            failed: Vec::new(),
            rng: Xoshiro256PlusPlus::seed_from_u64(seed),
        }
    }

    pub fn space(&self) -> &SearchSpace {
        &self.space
    }

    pub fn random_point(&mut self) -> Vec<f64> {
        self.space.random_point(&mut self.rng)
    }

    /// Record an evaluated point. Only finite targets inside the box are kept.
    pub fn register(&mut self, point: Vec<f64>, target: f64) -> Result<(), SacError> {
        self.space.validate(&point)?;
        if !target.is_finite() {
            return Err(SacError::Search(format!("refusing to register target {target}")));
        }
        self.xs.push(point);
        self.ys.push(target);
        Ok(())
    }

    /// Record a point whose evaluation failed. It never becomes `max`; the
    /// surrogate sees it as a bad outcome so proposals move away from it.
    pub fn register_failure(&mut self, point: Vec<f64>) -> Result<(), SacError> {
        self.space.validate(&point)?;
        self.failed.push(point);
        Ok(())
    }

    /// Normalised surrogate inputs: successes with their targets, then failures
    /// at a penalty below the worst success by at least one target unit.
    fn training_set(&self, y_max: f64) -> (Vec<Vec<f64>>, Vec<f64>) {
        let y_min = self.ys.iter().copied().fold(f64::INFINITY, f64::min);
        let penalty = y_min - (y_max - y_min).max(1.0);

        let xs = self.xs.iter().chain(&self.failed).map(|x| self.space.normalize(x)).collect();
        let ys = self.ys.iter().copied().chain(self.failed.iter().map(|_| penalty)).collect();
        (xs, ys)
    }

    /// Best registered point and its target.
    pub fn max(&self) -> Option<(&[f64], f64)> {
        self.ys
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(Ordering::Equal))
            .map(|(i, &y)| (self.xs[i].as_slice(), y))
    }

    /// Next point to evaluate: uniform until something succeeded, otherwise
    /// the maximiser of expected improvement under the fitted surrogate.
    pub fn suggest(&mut self) -> Result<Vec<f64>, SacError> {
        let Some((_, y_max)) = self.max() else {
            return Ok(self.random_point());
        };

        let (unit, ys) = self.training_set(y_max);
        let gp = match GaussianProcess::fit(&unit, &ys) {
            Ok(gp) => gp,
            Err(e) => {
                warn!("surrogate fit failed, proposing a random point: {e}");
                return Ok(self.random_point());
            }
        };
        debug!(
            length_scale = gp.length_scale(),
            jitter = gp.jitter(),
            lml = gp.log_marginal_likelihood(),
            failed = self.failed.len(),
            "surrogate fitted"
        );

        let score = |space: &SearchSpace, x: &[f64]| {
            let (mean, std) = gp.predict(&space.normalize(x));
            expected_improvement(mean, std, y_max, self.xi)
        };

        let mut candidates: Vec<(f64, Vec<f64>)> = (0..self.n_warmup)
            .map(|_| {
                let x = self.space.random_point(&mut self.rng);
                (score(&self.space, &x), x)
            })
            .collect();
        candidates.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
        candidates.truncate(self.n_refine.max(1));

        let mut best = candidates
            .first()
            .cloned()
            .ok_or_else(|| SacError::Search("no acquisition candidates".into()))?;

        for (start_score, start) in candidates {
            let (mut cur_score, mut cur) = (start_score, start);
            let mut sigma = REFINE_SIGMA;
            for step in 0..REFINE_STEPS {
                let mut next = cur.clone();
                for (x, d) in next.iter_mut().zip(self.space.dims()) {
                    *x += self.rng.sample::<f64, _>(StandardNormal) * sigma * d.width();
                }
                self.space.clip(&mut next);
                let s = score(&self.space, &next);
                if s > cur_score {
                    cur_score = s;
                    cur = next;
                }
                if step % 10 == 9 {
                    sigma *= 0.5;
                }
            }
            if cur_score > best.0 {
                best = (cur_score, cur);
            }
        }

        debug!(ei = best.0, "acquisition maximised");
        Ok(best.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn optimizer() -> BayesianOptimizer {
        let space = SearchSpace::new(&[("x".into(), -2.0, 2.0)]).unwrap();
        BayesianOptimizer::new(space, 0.01, 2_000, 5, 7)
    }

    #[test]
    fn first_suggestion_is_inside_the_box() {
        let mut opt = optimizer();
        let x = opt.suggest().unwrap();
        opt.space().validate(&x).unwrap();
    }

    #[test]
    fn suggestions_stay_inside_the_box() {
        let mut opt = optimizer();
        for x in [-1.5, 0.0, 1.9] {
            opt.register(vec![x], -(x * x)).unwrap();
        }
        for _ in 0..5 {
            let x = opt.suggest().unwrap();
            opt.space().validate(&x).unwrap();
            opt.register(x.clone(), -(x[0] * x[0])).unwrap();
        }
    }

    #[test]
    fn register_rejects_bad_points_and_targets() {
        let mut opt = optimizer();
        assert!(matches!(opt.register(vec![3.0], 1.0), Err(SacError::OutOfBounds { .. })));
        assert!(opt.register(vec![0.0], f64::NAN).is_err());
        assert!(opt.register_failure(vec![-2.5]).is_err());
        assert!(opt.max().is_none());
    }

    #[test]
    fn failures_never_become_the_best() {
        let mut opt = optimizer();
        opt.register(vec![0.5], -1.0).unwrap();
        opt.register_failure(vec![1.0]).unwrap();
        assert_eq!(opt.max().unwrap().1, -1.0);
        let x = opt.suggest().unwrap();
        opt.space().validate(&x).unwrap();
    }

    #[test]
    fn failed_point_is_not_proposed_again() {
        let seed_history = |opt: &mut BayesianOptimizer| {
            opt.register(vec![-1.5], -2.25).unwrap();
            opt.register(vec![-0.5], -0.25).unwrap();
        };

        let mut plain = optimizer();
        seed_history(&mut plain);
        let proposal = plain.suggest().unwrap();

        let mut penalised = optimizer();
        seed_history(&mut penalised);
        penalised.register_failure(proposal.clone()).unwrap();
        let next = penalised.suggest().unwrap();
        assert!((next[0] - proposal[0]).abs() > 0.05, "{next:?} repeats failed {proposal:?}");
    }

    #[test]
    fn max_tracks_the_best_target() {
        let mut opt = optimizer();
        opt.register(vec![1.0], 0.5).unwrap();
        opt.register(vec![-1.0], 2.0).unwrap();
        opt.register(vec![0.0], 1.0).unwrap();
        let (x, y) = opt.max().unwrap();
        assert_eq!((x.to_vec(), y), (vec![-1.0], 2.0));
    }
}
