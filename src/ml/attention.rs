// ============================================================
// Layer 5: Scaled Dot-Product Multi-Head Self-Attention
// ============================================================
// For every position, a weighted mix of the value vectors of all
// unmasked positions, with weights from query/key similarity:
//
//   Q, K, V = xW_q + b_q, xW_k + b_k, xW_v + b_v
//   split each into num_heads slices of head_dim
//   scores  = Q Kᵀ / sqrt(head_dim)
//   scores[masked] = MASK_FILL          (before softmax, never after)
//   probs   = softmax(scores) over keys (max-subtracted)
//   context = merge_heads(probs V) W_o + b_o
//
// The mask type can only be built when every query row keeps at
// least one valid key, so an all-masked row (which would yield a
// NaN or uniform distribution) is rejected before any math runs.
//
// Reference: Vaswani et al. (2017) Attention Is All You Need, §3.2

use burn::{
    nn::{Dropout, DropoutConfig, Linear},
    prelude::*,
};

use crate::domain::error::{BertError, Result};
use crate::ml::config::BertConfig;
use crate::ml::linear::bert_linear;
use crate::ml::mode::Mode;
use crate::ml::ops::stable_softmax;

/// Score written into masked slots; `exp` of it underflows to exactly 0.
pub const MASK_FILL: f32 = -1.0e9;

// ─── AttentionMask ────────────────────────────────────────────────────────────
/// Boolean [batch, query, key] mask where `true` marks a pair that may
/// NOT attend. Every query row is guaranteed to keep one valid key.
#[derive(Debug, Clone)]
pub struct AttentionMask<B: Backend> {
    blocked: Tensor<B, 3, Bool>,
}

impl<B: Backend> AttentionMask<B> {
    /// Padding mask [batch, seq_len]: non-zero = real token, 0 = padding.
    pub fn from_padding(valid: Tensor<B, 2, Int>) -> Result<Self> {
        let [batch_size, seq_len] = valid.dims();
        let valid = valid.not_equal_elem(0);
        let per_row = valid.clone().int().sum_dim(1);
        if batch_size > 0 && per_row.min().into_scalar().elem::<i64>() == 0 {
            return Err(BertError::EmptyAttentionMask);
        }
        // Same key mask for every query: [b, L] → [b, L_q, L_k]
        let blocked = valid.bool_not().reshape([batch_size, 1, seq_len]).repeat_dim(1, seq_len);
        Ok(Self { blocked })
    }

    /// Full pairwise mask [batch, query, key]: `true` = may attend.
    pub fn from_pairs(valid: Tensor<B, 3, Bool>) -> Result<Self> {
        let [batch_size, seq_q, seq_k] = valid.dims();
        if seq_q != seq_k {
            return Err(BertError::ShapeMismatch {
                what:     "attention_mask",
                expected: vec![batch_size, seq_q, seq_q],
                actual:   vec![batch_size, seq_q, seq_k],
            });
        }
        let per_row = valid.clone().int().sum_dim(2);
        if batch_size > 0 && per_row.min().into_scalar().elem::<i64>() == 0 {
            return Err(BertError::EmptyAttentionMask);
        }
        Ok(Self { blocked: valid.bool_not() })
    }

    /// Every position may attend to every other position.
    pub fn all_valid(batch_size: usize, seq_len: usize, device: &B::Device) -> Self {
        Self { blocked: Tensor::<B, 3, Int>::zeros([batch_size, seq_len, seq_len], device).bool() }
    }

    pub fn dims(&self) -> [usize; 3] {
        self.blocked.dims()
    }

    /// Fails unless the mask was built for a [batch_size, seq_len] input.
    pub fn check_input(&self, batch_size: usize, seq_len: usize) -> Result<()> {
        let dims = self.dims();
        if dims != [batch_size, seq_len, seq_len] {
            return Err(BertError::ShapeMismatch {
                what:     "attention_mask",
                expected: vec![batch_size, seq_len, seq_len],
                actual:   dims.to_vec(),
            });
        }
        Ok(())
    }

    /// scores: [batch, heads, L, L] → same, masked slots set to MASK_FILL
    fn apply(&self, scores: Tensor<B, 4>) -> Tensor<B, 4> {
        let [batch_size, num_heads, seq_q, seq_k] = scores.dims();
        let blocked = self
            .blocked
            .clone()
            .reshape([batch_size, 1, seq_q, seq_k])
            .repeat_dim(1, num_heads);
        scores.mask_fill(blocked, MASK_FILL)
    }
}

// ─── MultiHeadSelfAttention ───────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct MultiHeadSelfAttention<B: Backend> {
    pub query:   Linear<B>,
    pub key:     Linear<B>,
    pub value:   Linear<B>,
    pub output:  Linear<B>,
    pub dropout: Dropout,
    num_heads:   usize,
    head_dim:    usize,
}

/// Context vectors plus the post-softmax attention probabilities.
#[derive(Debug, Clone)]
pub struct AttentionOutput<B: Backend> {
    /// [batch, seq_len, hidden]
    pub context: Tensor<B, 3>,
    /// [batch, heads, seq_len, seq_len], before attention dropout
    pub probabilities: Tensor<B, 4>,
}

impl<B: Backend> MultiHeadSelfAttention<B> {
    pub fn new(cfg: &BertConfig, device: &B::Device) -> Result<Self> {
        if cfg.num_heads == 0 || cfg.hidden_size % cfg.num_heads != 0 {
            return Err(BertError::HeadCountMismatch {
                hidden_size: cfg.hidden_size,
                num_heads:   cfg.num_heads,
            });
        }
        let h = cfg.hidden_size;
        Ok(Self {
            query:     bert_linear(cfg, h, h, device),
            key:       bert_linear(cfg, h, h, device),
            value:     bert_linear(cfg, h, h, device),
            output:    bert_linear(cfg, h, h, device),
            dropout:   DropoutConfig::new(cfg.attention_dropout_rate).init(),
            num_heads: cfg.num_heads,
            head_dim:  cfg.head_dim(),
        })
    }

    /// x: [batch, seq_len, hidden] → context of the same shape
    pub fn forward(&self, x: Tensor<B, 3>, mask: &AttentionMask<B>, mode: Mode) -> AttentionOutput<B> {
        let [batch_size, seq_len, hidden] = x.dims();

        let q = self.split_heads(self.query.forward(x.clone()));
        let k = self.split_heads(self.key.forward(x.clone()));
        let v = self.split_heads(self.value.forward(x));

        // [b, h, L, d] x [b, h, d, L] → [b, h, L, L]
        let scores = q
            .matmul(k.transpose())
            .div_scalar((self.head_dim as f64).sqrt());
        let probabilities = stable_softmax(mask.apply(scores), 3);

        let weights = if mode.is_train() {
            self.dropout.forward(probabilities.clone())
        } else {
            probabilities.clone()
        };

        // [b, h, L, d] → [b, L, h, d] → [b, L, hidden]
        let context = weights
            .matmul(v)
            .swap_dims(1, 2)
            .reshape([batch_size, seq_len, hidden]);

        AttentionOutput { context: self.output.forward(context), probabilities }
    }

    /// [batch, seq_len, hidden] → [batch, heads, seq_len, head_dim]
    fn split_heads(&self, x: Tensor<B, 3>) -> Tensor<B, 4> {
        let [batch_size, seq_len, _] = x.dims();
        x.reshape([batch_size, seq_len, self.num_heads, self.head_dim])
            .swap_dims(1, 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::config::NormPlacement;
    use crate::ml::test_utils::{assert_close, ids, tiny_config, to_vec, TestBackend};

    fn attention() -> MultiHeadSelfAttention<TestBackend> {
        MultiHeadSelfAttention::new(&tiny_config(NormPlacement::PostNorm), &Default::default()).unwrap()
    }

    fn input(device: &<TestBackend as Backend>::Device) -> Tensor<TestBackend, 3> {
        Tensor::from_floats(
            [
                [[0.1, -0.4, 0.9, 0.3], [1.2, 0.5, -0.7, 0.0], [-0.3, 0.8, 0.2, -1.1]],
                [[0.6, 0.6, -0.2, 0.4], [0.0, -0.9, 0.3, 0.7], [0.5, 0.1, 1.4, -0.6]],
            ],
            device,
        )
    }

    #[test]
    fn test_output_shape_equals_input_shape() {
        let device = Default::default();
        let attn = attention();
        let mask = AttentionMask::all_valid(2, 3, &device);
        let out = attn.forward(input(&device), &mask, Mode::Eval);
        assert_eq!(out.context.dims(), [2, 3, 4]);
        assert_eq!(out.probabilities.dims(), [2, 2, 3, 3]);
    }

    #[test]
    fn test_rows_are_probability_distributions() {
        let device = Default::default();
        let out = attention().forward(input(&device), &AttentionMask::all_valid(2, 3, &device), Mode::Eval);
        assert_close(&to_vec(out.probabilities.sum_dim(3)), &[1.0; 12], 1e-5);
    }

    #[test]
    fn test_padding_receives_zero_probability() {
        let device = Default::default();
        let mask = AttentionMask::from_padding(ids::<TestBackend>(&[&[1, 1, 0], &[1, 0, 0]], &device)).unwrap();
        let out = attention().forward(input(&device), &mask, Mode::Eval);
        let p = to_vec(out.probabilities);

        // layout [b=2, h=2, q=3, k=3]
        for head in 0..2 {
            for q in 0..3 {
                let row = |b: usize| (b * 2 + head) * 9 + q * 3;
                assert_eq!(p[row(0) + 2], 0.0);
                assert_eq!(p[row(1) + 1], 0.0);
                assert_eq!(p[row(1) + 2], 0.0);
                assert!((p[row(1)] - 1.0).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_pairwise_mask_blocks_individual_pairs() {
        let device = Default::default();
        // Causal pattern: query i sees keys 0..=i
        let causal = Tensor::<TestBackend, 2, Int>::from_ints([[1, 0, 0], [1, 1, 0], [1, 1, 1]], &device)
            .bool()
            .unsqueeze::<3>()
            .repeat_dim(0, 2);
        let mask = AttentionMask::from_pairs(causal).unwrap();
        let p = to_vec(attention().forward(input(&device), &mask, Mode::Eval).probabilities);
        for block in 0..4 {
            let base = block * 9;
            assert_eq!(p[base + 1], 0.0);
            assert_eq!(p[base + 2], 0.0);
            assert_eq!(p[base + 5], 0.0);
        }
    }

    #[test]
    fn test_all_masked_row_is_fatal() {
        let device = Default::default();
        let err = AttentionMask::from_padding(ids::<TestBackend>(&[&[1, 1, 1], &[0, 0, 0]], &device)).unwrap_err();
        assert_eq!(err, BertError::EmptyAttentionMask);
    }

    #[test]
    fn test_permutation_equivariance() {
        let device = Default::default();
        let attn = attention();
        let x = input(&device);
        let mask_rows: &[&[i32]] = &[&[1, 1, 0], &[1, 1, 1]];
        let out = attn.forward(
            x.clone(),
            &AttentionMask::from_padding(ids::<TestBackend>(mask_rows, &device)).unwrap(),
            Mode::Eval,
        );

        // Reverse token order, and the mask with it.
        let perm = Tensor::<TestBackend, 1, Int>::from_ints([2, 1, 0], &device);
        let permuted_mask = ids::<TestBackend>(&[&[0, 1, 1], &[1, 1, 1]], &device);
        let permuted = attn.forward(
            x.select(1, perm.clone()),
            &AttentionMask::from_padding(permuted_mask).unwrap(),
            Mode::Eval,
        );

        assert_close(
            &to_vec(permuted.context),
            &to_vec(out.context.select(1, perm)),
            1e-5,
        );
    }

    #[test]
    fn test_indivisible_head_count_is_fatal() {
        let cfg = tiny_config(NormPlacement::PostNorm).with_num_heads(3);
        let err = MultiHeadSelfAttention::<TestBackend>::new(&cfg, &Default::default()).unwrap_err();
        assert_eq!(err, BertError::HeadCountMismatch { hidden_size: 4, num_heads: 3 });
    }

    #[test]
    fn test_mask_shape_checked_against_input() {
        let device = Default::default();
        let mask = AttentionMask::<TestBackend>::all_valid(2, 3, &device);
        assert!(mask.check_input(2, 3).is_ok());
        assert!(matches!(mask.check_input(2, 4), Err(BertError::ShapeMismatch { .. })));
    }
}
