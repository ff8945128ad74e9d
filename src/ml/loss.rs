// ============================================================
// Layer 5: Pretraining Losses
// ============================================================
// Masked-LM loss over a padded set of prediction slots:
//
//   loss = Σ w_i · (−log p(label_i)) / (Σ w_i + 1e-5)
//
// w_i = 1 for a real masked position and 0 for a padding slot.
// A sum is order-free, so listing the masked positions in any
// order yields the same loss. When every weight is zero the
// numerator is an exact 0 times finite values: loss 0.0, and the
// gradient reaching every head parameter is exactly zero.
//
// Next-sentence loss: mean cross-entropy over a 2-way label.

use burn::{nn::loss::CrossEntropyLossConfig, prelude::*};

use crate::ml::ops::stable_log_softmax;

/// Keeps the masked-LM denominator positive when no slot is real.
pub const MLM_WEIGHT_EPSILON: f64 = 1e-5;

/// logits: [batch, slots, vocab], labels: [batch, slots], weights: [batch, slots]
pub fn masked_lm_loss<B: Backend>(
    logits:  Tensor<B, 3>,
    labels:  Tensor<B, 2, Int>,
    weights: Tensor<B, 2>,
) -> Tensor<B, 1> {
    let [batch_size, slots, _] = logits.dims();
    let log_probs = stable_log_softmax(logits, 2);
    let picked = log_probs
        .gather(2, labels.reshape([batch_size, slots, 1]))
        .reshape([batch_size, slots]);

    let numerator   = (picked.neg() * weights.clone()).sum();
    let denominator = weights.sum().add_scalar(MLM_WEIGHT_EPSILON);
    numerator / denominator
}

/// logits: [batch, 2], labels: [batch] in {0, 1}
pub fn next_sentence_loss<B: Backend>(logits: Tensor<B, 2>, labels: Tensor<B, 1, Int>) -> Tensor<B, 1> {
    CrossEntropyLossConfig::new()
        .init(&logits.device())
        .forward(logits, labels)
}
