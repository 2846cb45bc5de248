use burn::module::{AutodiffModule, ModuleVisitor, ParamId};
use burn::optim::GradientsParams;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::ElementConversion;
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use crate::config::LOG_EPSILON;
use crate::error::SacError;

/// `log(p)` where exact zeros are lifted to `LOG_EPSILON` first; nonzero
/// entries are left untouched.
pub fn safe_log<B: Backend, const D: usize>(probs: Tensor<B, D>) -> Tensor<B, D> {
    let zeros = probs.clone().equal_elem(0.0).float().mul_scalar(LOG_EPSILON);
    (probs + zeros).log()
}

/// One categorical draw per row of a `[batch, actions]` probability tensor.
pub fn sample_rows<B: Backend>(probs: Tensor<B, 2>, rng: &mut impl Rng) -> Result<Vec<usize>, SacError> {
    let [_, n_actions] = probs.dims();
    let values = tensor_to_vec(probs)?;

    values
        .chunks(n_actions)
        .map(|row| {
            WeightedIndex::new(row)
                .map(|dist| dist.sample(rng))
                .map_err(|e| SacError::Sampling(format!("{e} for probabilities {row:?}")))
        })
        .collect()
}

pub fn argmax_rows<B: Backend>(probs: Tensor<B, 2>) -> Result<Vec<usize>, SacError> {
    probs
        .argmax(1)
        .into_data()
        .convert::<i64>()
        .to_vec::<i64>()
        .map(|v| v.into_iter().map(|a| a as usize).collect())
        .map_err(|e| SacError::Sampling(format!("{e:?}")))
}

pub fn tensor_to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>, SacError> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| SacError::Sampling(format!("{e:?}")))
}

pub fn scalar<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> f32 {
    tensor.into_scalar().elem::<f32>()
}

struct GradNorm<'a> {
    grads: &'a GradientsParams,
    squared: f32,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for GradNorm<'_> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.get::<B::InnerBackend, D>(id) {
            self.squared += scalar(grad.powf_scalar(2.0).sum());
        }
    }
}

struct GradScale<'a> {
    grads: &'a mut GradientsParams,
    factor: f32,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for GradScale<'_> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.remove::<B::InnerBackend, D>(id) {
            self.grads.register::<B::InnerBackend, D>(id, grad.mul_scalar(self.factor));
        }
    }
}

/// L2 norm over every gradient of `module`, taken jointly.
pub fn grad_norm<B: AutodiffBackend, M: AutodiffModule<B>>(module: &M, grads: &GradientsParams) -> f32 {
    let mut visitor = GradNorm { grads, squared: 0.0 };
    module.visit(&mut visitor);
    visitor.squared.sqrt()
}

/// Rescales all gradients of `module` together so their joint norm is at
/// most `max_norm`. Returns the norm measured before clipping.
pub fn clip_grad_norm<B: AutodiffBackend, M: AutodiffModule<B>>(
    module: &M,
    mut grads: GradientsParams,
    max_norm: f32,
) -> (GradientsParams, f32) {
    let norm = grad_norm(module, &grads);
    if norm > max_norm {
        let mut visitor = GradScale { grads: &mut grads, factor: max_norm / (norm + 1e-6) };
        module.visit(&mut visitor);
    }
    (grads, norm)
}

pub fn get_device(use_gpu: bool) -> burn::backend::libtorch::LibTorchDevice {
    if tch::Cuda::is_available() && use_gpu {
        burn::backend::libtorch::LibTorchDevice::Cuda(0)
    } else {
        burn::backend::libtorch::LibTorchDevice::Cpu
    }
}
