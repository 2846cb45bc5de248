//! Polyak averaging for target critics.
//!
//! ```text
//! θ_target = τ * θ_live + (1 - τ) * θ_target
//! ```
//!
//! Burn modules are values, so an update consumes the old target and hands
//! back the blended one; nothing else ever writes target parameters.

use burn::module::Param;
use burn::nn::Linear;
use burn::prelude::*;
use crate::services::algorithms::model::Critic;

pub trait SoftUpdate: Sized + Clone {
    /// Blend `live` into `self` with weight `tau`.
    fn blend(self, live: &Self, tau: f32) -> Self;
}

fn blend_tensor<B: Backend, const D: usize>(target: Tensor<B, D>, live: Tensor<B, D>, tau: f32) -> Tensor<B, D> {
    live.mul_scalar(tau) + target.mul_scalar(1.0 - tau)
}

impl<B: Backend> SoftUpdate for Linear<B> {
    fn blend(self, live: &Self, tau: f32) -> Self {
        let weight = blend_tensor(self.weight.val(), live.weight.val(), tau);
        let bias = match (self.bias, &live.bias) {
            (Some(target), Some(online)) => Some(Param::from_tensor(blend_tensor(target.val(), online.val(), tau))),
            (target, _) => target,
        };
        Linear { weight: Param::from_tensor(weight), bias }
    }
}

impl<B: Backend> SoftUpdate for Critic<B> {
    fn blend(self, live: &Self, tau: f32) -> Self {
        Critic {
            fc1: self.fc1.blend(&live.fc1, tau),
            fc2: self.fc2.blend(&live.fc2, tau),
            fc3: self.fc3.blend(&live.fc3, tau),
        }
    }
}

/// Soft update with the two boundary cases made exact:
/// `tau = 1` copies the live parameters, `tau = 0` returns the target untouched.
pub fn soft_update<M: SoftUpdate>(live: &M, target: M, tau: f32) -> M {
    if tau >= 1.0 {
        return live.clone();
    }
    if tau <= 0.0 {
        return target;
    }
    target.blend(live, tau)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray<f32>;

    fn params(critic: &Critic<B>) -> Vec<f32> {
        let mut out = Vec::new();
        for layer in [&critic.fc1, &critic.fc2, &critic.fc3] {
            out.extend(layer.weight.val().into_data().to_vec::<f32>().unwrap());
            if let Some(bias) = &layer.bias {
                out.extend(bias.val().into_data().to_vec::<f32>().unwrap());
            }
        }
        out
    }

    #[test]
    fn tau_one_copies_live() {
        let device = Default::default();
        let live = Critic::<B>::new(&device, 3, 8, 2);
        let target = Critic::<B>::new(&device, 3, 8, 1);

        let synced = soft_update(&live, target, 1.0);
        assert_eq!(params(&synced), params(&live));
    }

    #[test]
    fn tau_zero_keeps_target() {
        let device = Default::default();
        let live = Critic::<B>::new(&device, 3, 8, 2);
        let target = Critic::<B>::new(&device, 3, 8, 1);
        let before = params(&target);

        let synced = soft_update(&live, target, 0.0);
        assert_eq!(params(&synced), before);
    }

    #[test]
    fn intermediate_tau_interpolates() {
        let device = Default::default();
        let live = Critic::<B>::new(&device, 2, 4, 2);
        let target = Critic::<B>::new(&device, 2, 4, 1);
        let (l, t) = (params(&live), params(&target));

        let synced = params(&soft_update(&live, target, 0.25));
        for i in 0..synced.len() {
            let expected = 0.25 * l[i] + 0.75 * t[i];
            assert!((synced[i] - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn blend_runs_through_the_generic_path() {
        // bypass the tau = 1 shortcut to check the arithmetic is exact too
        let device = Default::default();
        let live = Critic::<B>::new(&device, 2, 4, 2);
        let target = Critic::<B>::new(&device, 2, 4, 1);
        assert_eq!(params(&target.blend(&live, 1.0)), params(&live));
    }
}
