use std::collections::BTreeMap;
use rand::Rng;
use crate::error::SacError;

#[derive(Debug, Clone, PartialEq)]
pub struct Dimension {
    pub name: String,
    pub low: f64,
    pub high: f64,
}

impl Dimension {
    pub fn width(&self) -> f64 {
        self.high - self.low
    }
}

/// Axis-aligned box the search proposes points in. Points are plain `Vec<f64>`
/// in dimension order; `to_params` names them.
#[derive(Debug, Clone)]
pub struct SearchSpace {
    dims: Vec<Dimension>,
}

impl SearchSpace {
    pub fn new(bounds: &[(String, f64, f64)]) -> Result<Self, SacError> {
        if bounds.is_empty() {
            return Err(SacError::Search("empty search space".into()));
        }
        let mut dims: Vec<Dimension> = Vec::with_capacity(bounds.len());
        for (name, low, high) in bounds {
            if !(low.is_finite() && high.is_finite() && low < high) {
                return Err(SacError::Search(format!("bad bounds for {name}: [{low}, {high}]")));
            }
            if dims.iter().any(|d| &d.name == name) {
                return Err(SacError::Search(format!("duplicate dimension {name}")));
            }
            dims.push(Dimension { name: name.clone(), low: *low, high: *high });
        }
        Ok(Self { dims })
    }

    pub fn dims(&self) -> &[Dimension] {
        &self.dims
    }

    pub fn random_point(&self, rng: &mut impl Rng) -> Vec<f64> {
        self.dims.iter().map(|d| rng.gen_range(d.low..=d.high)).collect()
    }

    pub fn clip(&self, point: &mut [f64]) {
        for (x, d) in point.iter_mut().zip(&self.dims) {
            *x = x.clamp(d.low, d.high);
        }
    }

    /// Rejects points with the wrong arity, non-finite coordinates or
    /// coordinates outside the declared bounds.
    pub fn validate(&self, point: &[f64]) -> Result<(), SacError> {
        if point.len() != self.dims.len() {
            return Err(SacError::Search(format!(
                "point has {} coordinates, space has {}",
                point.len(),
                self.dims.len()
            )));
        }
        for (&value, d) in point.iter().zip(&self.dims) {
            if !value.is_finite() || value < d.low || value > d.high {
                return Err(SacError::OutOfBounds { name: d.name.clone(), value, low: d.low, high: d.high });
            }
        }
        Ok(())
    }

    /// Map into the unit cube the surrogate works in.
    pub fn normalize(&self, point: &[f64]) -> Vec<f64> {
        point.iter().zip(&self.dims).map(|(x, d)| (x - d.low) / d.width()).collect()
    }

    pub fn to_params(&self, point: &[f64]) -> BTreeMap<String, f64> {
        self.dims.iter().zip(point).map(|(d, x)| (d.name.clone(), *x)).collect()
    }

    pub fn from_params(&self, params: &BTreeMap<String, f64>) -> Result<Vec<f64>, SacError> {
        self.dims
            .iter()
            .map(|d| {
                params
                    .get(&d.name)
                    .copied()
                    .ok_or_else(|| SacError::Search(format!("record is missing `{}`", d.name)))
            })
            .collect()
    }
}
