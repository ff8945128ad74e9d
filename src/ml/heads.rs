// ============================================================
// Layer 5: Pretraining Heads
// ============================================================
// Masked-LM head:
//   h → Linear(h, h) → GELU → LayerNorm → h Dᵀ + bias → vocab logits
//   D is either the head's own [vocab, hidden] matrix or, when
//   weights are tied, the word-embedding table itself. The head
//   never copies the table: the model passes it in per call, so
//   one optimizer update is seen by both users.
//
// Next-sentence head:
//   pooled [CLS] vector → Linear(h, 2)
//
// Reference: Devlin et al. (2019) BERT, §3.1 and Appendix A.2

use burn::{
    module::Param,
    nn::{Initializer, LayerNorm, LayerNormConfig, Linear},
    prelude::*,
    tensor::activation::gelu,
};

use crate::ml::config::BertConfig;
use crate::ml::linear::bert_linear;

#[derive(Module, Debug)]
pub struct MaskedLmHead<B: Backend> {
    pub transform:  Linear<B>,
    pub layer_norm: LayerNorm<B>,
    /// [vocab, hidden]; None when tied to the word embeddings
    pub decoder:    Option<Param<Tensor<B, 2>>>,
    pub bias:       Param<Tensor<B, 1>>,
}

impl<B: Backend> MaskedLmHead<B> {
    pub fn new(cfg: &BertConfig, device: &B::Device) -> Self {
        let decoder = (!cfg.tie_word_embeddings)
            .then(|| cfg.weight_initializer().init([cfg.vocab_size, cfg.hidden_size], device));
        Self {
            transform:  bert_linear(cfg, cfg.hidden_size, cfg.hidden_size, device),
            layer_norm: LayerNormConfig::new(cfg.hidden_size)
                .with_epsilon(cfg.layer_norm_eps)
                .init(device),
            decoder,
            bias: Initializer::Zeros.init([cfg.vocab_size], device),
        }
    }

    pub fn is_tied(&self) -> bool {
        self.decoder.is_none()
    }

    /// hidden: [batch, n, hidden], decoder_weight: [vocab, hidden]
    /// → logits: [batch, n, vocab]
    pub fn forward(&self, hidden: Tensor<B, 3>, decoder_weight: Tensor<B, 2>) -> Tensor<B, 3> {
        let [batch_size, n, hidden_size] = hidden.dims();
        let [vocab_size, _] = decoder_weight.dims();

        let h = self.layer_norm.forward(gelu(self.transform.forward(hidden)));
        let logits = h
            .reshape([batch_size * n, hidden_size])
            .matmul(decoder_weight.transpose())
            + self.bias.val().unsqueeze::<2>();
        logits.reshape([batch_size, n, vocab_size])
    }
}

#[derive(Module, Debug)]
pub struct NextSentenceHead<B: Backend> {
    pub classifier: Linear<B>,
}

impl<B: Backend> NextSentenceHead<B> {
    pub fn new(cfg: &BertConfig, device: &B::Device) -> Self {
        Self { classifier: bert_linear(cfg, cfg.hidden_size, 2, device) }
    }

    /// pooled: [batch, hidden] → logits: [batch, 2]
    pub fn forward(&self, pooled: Tensor<B, 2>) -> Tensor<B, 2> {
        self.classifier.forward(pooled)
    }
}
