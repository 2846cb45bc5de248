//! Gaussian-process surrogate over the unit cube.
//!
//! Matérn 5/2 kernel with unit signal variance, targets standardised before
//! fitting, and a single isotropic length scale picked from a fixed grid by
//! log marginal likelihood.

use std::f64::consts::PI;
use nalgebra::{DMatrix, DVector};
use crate::error::SacError;

const LENGTH_SCALES: [f64; 9] = [0.05, 0.1, 0.2, 0.3, 0.5, 0.75, 1.0, 1.5, 2.0];
const BASE_JITTER: f64 = 1e-6;
const MAX_JITTER: f64 = 1e-2;

pub fn matern52(a: &[f64], b: &[f64], length_scale: f64) -> f64 {
    let d2: f64 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum();
    let r = d2.sqrt() / length_scale;
    let s5r = 5f64.sqrt() * r;
    (1.0 + s5r + 5.0 * r * r / 3.0) * (-s5r).exp()
}

pub struct GaussianProcess {
    xs: Vec<Vec<f64>>,
    length_scale: f64,
    jitter: f64,
    y_mean: f64,
    y_std: f64,
    l: DMatrix<f64>,
    alpha: DVector<f64>,
    log_marginal_likelihood: f64,
}

struct Fitted {
    jitter: f64,
    l: DMatrix<f64>,
    alpha: DVector<f64>,
    lml: f64,
}

fn gram(xs: &[Vec<f64>], length_scale: f64) -> DMatrix<f64> {
    let n = xs.len();
    DMatrix::from_fn(n, n, |i, j| matern52(&xs[i], &xs[j], length_scale))
}

/// Cholesky of `K + jitter I`, raising the jitter tenfold until it factors.
fn factor(k: &DMatrix<f64>, y: &DVector<f64>) -> Option<Fitted> {
    let n = k.nrows();
    let mut jitter = BASE_JITTER;
    while jitter <= MAX_JITTER {
        let noisy = k + DMatrix::<f64>::identity(n, n) * jitter;
        if let Some(chol) = noisy.cholesky() {
            let alpha = chol.solve(y);
            let l = chol.unpack();
            let log_det: f64 = l.diagonal().iter().map(|d| d.ln()).sum();
            let lml = -0.5 * y.dot(&alpha) - log_det - 0.5 * n as f64 * (2.0 * PI).ln();
            return Some(Fitted { jitter, l, alpha, lml });
        }
        jitter *= 10.0;
    }
    None
}

impl GaussianProcess {
    /// Fit on points already mapped into the unit cube.
    pub fn fit(xs: &[Vec<f64>], ys: &[f64]) -> Result<Self, SacError> {
        if xs.is_empty() || xs.len() != ys.len() {
            return Err(SacError::Search(format!(
                "cannot fit a surrogate on {} points and {} targets",
                xs.len(),
                ys.len()
            )));
        }
        let n = ys.len() as f64;
        let y_mean = ys.iter().sum::<f64>() / n;
        let var = ys.iter().map(|y| (y - y_mean).powi(2)).sum::<f64>() / n;
        let y_std = if var.sqrt() > 1e-12 { var.sqrt() } else { 1.0 };
        let y = DVector::from_iterator(ys.len(), ys.iter().map(|v| (v - y_mean) / y_std));

        let mut best: Option<(f64, Fitted)> = None;
        for &ls in LENGTH_SCALES.iter() {
            let Some(fitted) = factor(&gram(xs, ls), &y) else { continue };
            if best.as_ref().map_or(true, |(_, b)| fitted.lml > b.lml) {
                best = Some((ls, fitted));
            }
        }
        let (length_scale, fitted) =
            best.ok_or_else(|| SacError::Search("kernel matrix is not positive definite".into()))?;

        Ok(Self {
            xs: xs.to_vec(),
            length_scale,
            jitter: fitted.jitter,
            y_mean,
            y_std,
            l: fitted.l,
            alpha: fitted.alpha,
            log_marginal_likelihood: fitted.lml,
        })
    }

    /// Posterior mean and standard deviation, in target units.
    pub fn predict(&self, x: &[f64]) -> (f64, f64) {
        let k = DVector::from_iterator(self.xs.len(), self.xs.iter().map(|xi| matern52(xi, x, self.length_scale)));
        let mean = k.dot(&self.alpha);
        let var = match self.l.solve_lower_triangular(&k) {
            Some(v) => (1.0 - v.dot(&v)).max(0.0),
            None => 0.0,
        };
        (mean * self.y_std + self.y_mean, var.sqrt() * self.y_std)
    }

    pub fn length_scale(&self) -> f64 {
        self.length_scale
    }

    pub fn jitter(&self) -> f64 {
        self.jitter
    }

    pub fn log_marginal_likelihood(&self) -> f64 {
        self.log_marginal_likelihood
    }
}
