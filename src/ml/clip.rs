// ============================================================
// Layer 5: Global Gradient-Norm Clipping
// ============================================================
// Scales every gradient by the same factor so that the L2 norm
// taken over ALL parameters together stays within `max_norm`:
//
//   total = sqrt(Σ_params Σ g²)
//   if total > max_norm:  g ← g × max_norm / (total + 1e-6)
//
// Runs between backward and the optimizer step, so the
// optimizer itself is built without a clipping config.

use burn::{
    module::{AutodiffModule, ModuleVisitor, Param},
    optim::GradientsParams,
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use std::marker::PhantomData;

/// Sums g² over every float parameter that received a gradient.
struct SquaredNorm<'a, B: AutodiffBackend> {
    grads: &'a GradientsParams,
    sum:   f64,
    _b:    PhantomData<B>,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for SquaredNorm<'_, B> {
    fn visit_float<const D: usize>(&mut self, param: &Param<Tensor<B, D>>) {
        if let Some(grad) = self.grads.get::<B::InnerBackend, D>(param.id) {
            self.sum += grad.powf_scalar(2.0).sum().into_scalar().elem::<f64>();
        }
    }
}

struct Scale<'a, B: AutodiffBackend> {
    grads:  &'a mut GradientsParams,
    factor: f64,
    _b:     PhantomData<B>,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for Scale<'_, B> {
    fn visit_float<const D: usize>(&mut self, param: &Param<Tensor<B, D>>) {
        if let Some(grad) = self.grads.remove::<B::InnerBackend, D>(param.id) {
            self.grads.register::<B::InnerBackend, D>(param.id, grad.mul_scalar(self.factor));
        }
    }
}

/// L2 norm of all of `module`'s gradients taken as one vector.
pub fn global_grad_norm<B, M>(module: &M, grads: &GradientsParams) -> f64
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    let mut visitor = SquaredNorm::<B> { grads, sum: 0.0, _b: PhantomData };
    module.visit(&mut visitor);
    visitor.sum.sqrt()
}

/// Rescales `grads` in place when their global norm exceeds `max_norm`.
/// Returns the norm measured before clipping.
pub fn clip_grad_norm<B, M>(module: &M, grads: &mut GradientsParams, max_norm: f64) -> f64
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    let total = global_grad_norm::<B, M>(module, grads);
    if total > max_norm {
        let factor = max_norm / (total + 1e-6);
        let mut visitor = Scale::<B> { grads, factor, _b: PhantomData };
        module.visit(&mut visitor);
    }
    total
}
