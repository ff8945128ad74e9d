// ============================================================
// Layer 5: ML / Model Layer (Burn)
// ============================================================
// All model math lives here. Everything is generic over a Burn
// Backend; `backend.rs` picks the concrete one for the binary.
//
// Bottom-up:
//
//   config.rs     - BertConfig: every architectural option
//   ops.rs        - max-subtracted softmax / log-softmax
//   embedding.rs  - token + position + segment → LN → dropout
//   attention.rs  - AttentionMask and multi-head self-attention
//   encoder.rs    - encoder block (Pre/PostNorm), stack, pooler
//   heads.rs      - masked-LM head (optionally tied), NSP head
//   loss.rs       - weighted masked-LM loss, NSP cross-entropy
//   model.rs      - BertModel and BertForPreTraining
//
// Around the model:
//
//   schedule.rs   - linear warmup / linear decay learning rate
//   clip.rs       - global gradient-norm clipping
//   trainer.rs    - AdamW training loop with validation
//   evaluator.rs  - metrics over batches, fill-mask inference
//
// Reference: Vaswani et al. (2017) Attention Is All You Need
//            Devlin et al. (2019) BERT
//            Burn Book §3 (Building Blocks), §5 (Training)

pub mod backend;
pub mod config;
pub mod mode;
pub mod ops;
pub(crate) mod checks;
pub(crate) mod linear;
pub mod embedding;
pub mod attention;
pub mod encoder;
pub mod heads;
pub mod loss;
pub mod model;

pub mod schedule;
pub mod clip;
pub mod trainer;
pub mod evaluator;

#[cfg(test)]
pub(crate) mod test_utils;
