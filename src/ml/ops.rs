// Numerically stable normalisers shared by attention and the losses.
//
// Both subtract the per-row maximum before exponentiating, so no
// finite input can overflow `exp`. The maximum is detached: softmax
// is invariant to a per-row shift, so the gradient is unchanged.

use burn::prelude::*;

pub fn stable_softmax<B: Backend, const D: usize>(scores: Tensor<B, D>, dim: usize) -> Tensor<B, D> {
    let row_max = scores.clone().detach().max_dim(dim);
    let exp     = (scores - row_max).exp();
    let total   = exp.clone().sum_dim(dim);
    exp / total
}

pub fn stable_log_softmax<B: Backend, const D: usize>(logits: Tensor<B, D>, dim: usize) -> Tensor<B, D> {
    let row_max = logits.clone().detach().max_dim(dim);
    let shifted = logits - row_max;
    let log_sum = shifted.clone().exp().sum_dim(dim).log();
    shifted - log_sum
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::test_utils::{assert_close, to_vec, TestBackend};

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 2>::from_floats([[1.0, 2.0, 3.0], [-5.0, 0.0, 5.0]], &device);
        let p = to_vec(stable_softmax(x, 1).sum_dim(1));
        assert_close(&p, &[1.0, 1.0], 1e-6);
    }

    #[test]
    fn test_softmax_survives_huge_scores() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 2>::from_floats([[1.0e4, 1.0e4 + 1.0]], &device);
        let p = to_vec(stable_softmax(x, 1));
        assert!(p.iter().all(|v| v.is_finite()));
        assert_close(&p, &[0.268_941_4, 0.731_058_6], 1e-5);
    }

    #[test]
    fn test_log_softmax_matches_log_of_softmax() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 2>::from_floats([[0.5, -1.0, 2.0, 0.0]], &device);
        let a = to_vec(stable_log_softmax(x.clone(), 1));
        let b = to_vec(stable_softmax(x, 1).log());
        assert_close(&a, &b, 1e-5);
    }
}
