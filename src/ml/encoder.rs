// ============================================================
// Layer 5: Transformer Encoder Block and Stack
// ============================================================
// One block = attention sublayer + feed-forward sublayer, each
// wrapped in dropout, a residual connection and LayerNorm.
//
//   PostNorm (original BERT):
//     x = LN(x + Drop(Attn(x)))
//     x = LN(x + Drop(FFN(x)))
//
//   PreNorm:
//     x = x + Drop(Attn(LN(x)))
//     x = x + Drop(FFN(LN(x)))
//     ... and one final LN after the last block
//
// The stack is a plain Vec of independently parameterised
// blocks; block i+1 only ever sees block i's output.
//
// Reference: Vaswani et al. (2017) §3.1, Xiong et al. (2020)

use burn::{
    nn::{Dropout, DropoutConfig, LayerNorm, LayerNormConfig, Linear},
    prelude::*,
    tensor::activation::gelu,
};

use crate::domain::error::Result;
use crate::ml::attention::{AttentionMask, MultiHeadSelfAttention};
use crate::ml::config::BertConfig;
use crate::ml::linear::bert_linear;
use crate::ml::mode::Mode;

// ─── FeedForward ──────────────────────────────────────────────────────────────
/// Position-wise `Linear(h, ff) → GELU → Linear(ff, h)`.
#[derive(Module, Debug)]
pub struct FeedForward<B: Backend> {
    pub intermediate: Linear<B>,
    pub output:       Linear<B>,
}

impl<B: Backend> FeedForward<B> {
    pub fn new(cfg: &BertConfig, device: &B::Device) -> Self {
        Self {
            intermediate: bert_linear(cfg, cfg.hidden_size, cfg.feed_forward_size, device),
            output:       bert_linear(cfg, cfg.feed_forward_size, cfg.hidden_size, device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        self.output.forward(gelu(self.intermediate.forward(x)))
    }
}

// ─── EncoderBlock ─────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct EncoderBlock<B: Backend> {
    pub attention:      MultiHeadSelfAttention<B>,
    pub attention_norm: LayerNorm<B>,
    pub feed_forward:   FeedForward<B>,
    pub output_norm:    LayerNorm<B>,
    pub dropout:        Dropout,
    pre_norm:           bool,
}

impl<B: Backend> EncoderBlock<B> {
    pub fn new(cfg: &BertConfig, device: &B::Device) -> Result<Self> {
        let norm = || {
            LayerNormConfig::new(cfg.hidden_size)
                .with_epsilon(cfg.layer_norm_eps)
                .init(device)
        };
        Ok(Self {
            attention:      MultiHeadSelfAttention::new(cfg, device)?,
            attention_norm: norm(),
            feed_forward:   FeedForward::new(cfg, device),
            output_norm:    norm(),
            dropout:        DropoutConfig::new(cfg.dropout_rate).init(),
            pre_norm:       cfg.pre_norm(),
        })
    }

    /// [batch, seq_len, hidden] → [batch, seq_len, hidden]
    pub fn forward(&self, x: Tensor<B, 3>, mask: &AttentionMask<B>, mode: Mode) -> Tensor<B, 3> {
        self.forward_with_attention(x, mask, mode).0
    }

    /// Same as `forward`, also returning this block's attention probabilities.
    pub fn forward_with_attention(
        &self,
        x:    Tensor<B, 3>,
        mask: &AttentionMask<B>,
        mode: Mode,
    ) -> (Tensor<B, 3>, Tensor<B, 4>) {
        if self.pre_norm {
            let attn = self.attention.forward(self.attention_norm.forward(x.clone()), mask, mode);
            let x = x + self.drop(attn.context, mode);
            let ffn = self.feed_forward.forward(self.output_norm.forward(x.clone()));
            (x + self.drop(ffn, mode), attn.probabilities)
        } else {
            let attn = self.attention.forward(x.clone(), mask, mode);
            let x = self.attention_norm.forward(x + self.drop(attn.context, mode));
            let ffn = self.feed_forward.forward(x.clone());
            (self.output_norm.forward(x + self.drop(ffn, mode)), attn.probabilities)
        }
    }

    fn drop(&self, x: Tensor<B, 3>, mode: Mode) -> Tensor<B, 3> {
        if mode.is_train() { self.dropout.forward(x) } else { x }
    }
}

// ─── Pooler ───────────────────────────────────────────────────────────────────
/// `tanh(Linear(h, h))` over the first ([CLS]) position.
#[derive(Module, Debug)]
pub struct Pooler<B: Backend> {
    pub dense: Linear<B>,
}

impl<B: Backend> Pooler<B> {
    pub fn new(cfg: &BertConfig, device: &B::Device) -> Self {
        Self { dense: bert_linear(cfg, cfg.hidden_size, cfg.hidden_size, device) }
    }

    /// [batch, seq_len, hidden] → [batch, hidden]
    pub fn forward(&self, hidden: Tensor<B, 3>) -> Tensor<B, 2> {
        let [batch_size, _, hidden_size] = hidden.dims();
        let first = hidden
            .slice([0..batch_size, 0..1, 0..hidden_size])
            .reshape([batch_size, hidden_size]);
        self.dense.forward(first).tanh()
    }
}

// ─── EncoderStack ─────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct EncoderStack<B: Backend> {
    pub layers:     Vec<EncoderBlock<B>>,
    /// Present only for PreNorm stacks.
    pub final_norm: Option<LayerNorm<B>>,
    pub pooler:     Pooler<B>,
}

#[derive(Debug, Clone)]
pub struct EncoderOutput<B: Backend> {
    /// [batch, seq_len, hidden]
    pub hidden_states: Tensor<B, 3>,
    /// [batch, hidden]
    pub pooled: Tensor<B, 2>,
    /// One [batch, heads, seq_len, seq_len] tensor per layer, in order
    pub attentions: Vec<Tensor<B, 4>>,
}

impl<B: Backend> EncoderStack<B> {
    pub fn new(cfg: &BertConfig, device: &B::Device) -> Result<Self> {
        let layers = (0..cfg.num_layers)
            .map(|_| EncoderBlock::new(cfg, device))
            .collect::<Result<Vec<_>>>()?;
        let final_norm = cfg.pre_norm().then(|| {
            LayerNormConfig::new(cfg.hidden_size)
                .with_epsilon(cfg.layer_norm_eps)
                .init(device)
        });
        Ok(Self { layers, final_norm, pooler: Pooler::new(cfg, device) })
    }

    pub fn forward(&self, x: Tensor<B, 3>, mask: &AttentionMask<B>, mode: Mode) -> EncoderOutput<B> {
        let mut x          = x;
        let mut attentions = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            let (next, probs) = layer.forward_with_attention(x, mask, mode);
            attentions.push(probs);
            x = next;
        }
        if let Some(norm) = &self.final_norm {
            x = norm.forward(x);
        }
        let pooled = self.pooler.forward(x.clone());
        EncoderOutput { hidden_states: x, pooled, attentions }
    }
}
