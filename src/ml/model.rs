// ============================================================
// Layer 5: BERT Model Assembly
// ============================================================
//   input_ids ──► BertEmbeddings ──► EncoderStack ──► hidden, pooled
//                                                     │        │
//                                         MaskedLmHead    NextSentenceHead
//                                                     │        │
//                                              masked_lm_loss + next_sentence_loss
//
// BertModel is the bare encoder; BertForPreTraining adds the two
// heads and the weighted loss. Input validation (ids, lengths,
// mask shape, masked positions) happens once here, at entry, so
// the blocks underneath keep a plain tensor-in/tensor-out shape.

use burn::prelude::*;

use crate::domain::error::{BertError, Result};
use crate::ml::attention::AttentionMask;
use crate::ml::checks::first_out_of_range;
use crate::ml::config::BertConfig;
use crate::ml::embedding::BertEmbeddings;
use crate::ml::encoder::{EncoderOutput, EncoderStack};
use crate::ml::heads::{MaskedLmHead, NextSentenceHead};
use crate::ml::loss::{masked_lm_loss, next_sentence_loss};
use crate::ml::mode::Mode;

// ─── Inputs and targets ───────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct BertInput<B: Backend> {
    /// [batch, seq_len]
    pub input_ids:      Tensor<B, 2, Int>,
    /// None = every position valid
    pub attention_mask: Option<AttentionMask<B>>,
    /// [batch, seq_len]; None = all sentence A
    pub segment_ids:    Option<Tensor<B, 2, Int>>,
}

impl<B: Backend> BertInput<B> {
    pub fn new(input_ids: Tensor<B, 2, Int>) -> Self {
        Self { input_ids, attention_mask: None, segment_ids: None }
    }

    pub fn with_attention_mask(mut self, mask: AttentionMask<B>) -> Self {
        self.attention_mask = Some(mask);
        self
    }

    pub fn with_segment_ids(mut self, segment_ids: Tensor<B, 2, Int>) -> Self {
        self.segment_ids = Some(segment_ids);
        self
    }
}

/// Padded masked-LM prediction slots; all three are [batch, slots].
#[derive(Debug, Clone)]
pub struct MaskedLmTargets<B: Backend> {
    pub positions: Tensor<B, 2, Int>,
    pub labels:    Tensor<B, 2, Int>,
    /// 1.0 = real prediction, 0.0 = padding slot
    pub weights:   Tensor<B, 2>,
}

#[derive(Debug, Clone)]
pub struct PretrainTargets<B: Backend> {
    pub masked_lm:     MaskedLmTargets<B>,
    /// [batch] in {0 = IsNext, 1 = NotNext}
    pub next_sentence: Option<Tensor<B, 1, Int>>,
}

/// Relative weight of each objective in the summed loss.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LossWeights {
    pub masked_lm:     f64,
    pub next_sentence: f64,
}

impl Default for LossWeights {
    fn default() -> Self {
        Self { masked_lm: 1.0, next_sentence: 1.0 }
    }
}

pub struct PretrainOutput<B: Backend> {
    /// Weighted sum of the objectives, shape [1]
    pub loss:               Tensor<B, 1>,
    pub masked_lm_loss:     Tensor<B, 1>,
    pub next_sentence_loss: Option<Tensor<B, 1>>,
    /// [batch, slots, vocab]
    pub masked_lm_logits:   Tensor<B, 3>,
    /// [batch, 2]
    pub next_sentence_logits: Option<Tensor<B, 2>>,
}

// ─── BertModel ────────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct BertModel<B: Backend> {
    pub embeddings: BertEmbeddings<B>,
    pub encoder:    EncoderStack<B>,
}

impl<B: Backend> BertModel<B> {
    /// Builds without validating; use `BertConfig::init` for checked construction.
    pub(crate) fn new(cfg: &BertConfig, device: &B::Device) -> Result<Self> {
        Ok(Self {
            embeddings: BertEmbeddings::new(cfg, device),
            encoder:    EncoderStack::new(cfg, device)?,
        })
    }

    pub fn forward(&self, input: BertInput<B>, mode: Mode) -> Result<EncoderOutput<B>> {
        let [batch_size, seq_len] = input.input_ids.dims();
        let mask = match input.attention_mask {
            Some(mask) => {
                mask.check_input(batch_size, seq_len)?;
                mask
            }
            None => AttentionMask::all_valid(batch_size, seq_len, &input.input_ids.device()),
        };
        let embedded = self.embeddings.forward(input.input_ids, input.segment_ids, mode)?;
        Ok(self.encoder.forward(embedded, &mask, mode))
    }
}

// ─── BertForPreTraining ───────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct BertForPreTraining<B: Backend> {
    pub bert:          BertModel<B>,
    pub masked_lm:     MaskedLmHead<B>,
    pub next_sentence: Option<NextSentenceHead<B>>,
    vocab_size:        usize,
}

impl<B: Backend> BertForPreTraining<B> {
    /// Call through `BertConfig::init`, which validates `cfg` first.
    pub(crate) fn new(cfg: &BertConfig, device: &B::Device) -> Result<Self> {
        Ok(Self {
            bert:          BertModel::new(cfg, device)?,
            masked_lm:     MaskedLmHead::new(cfg, device),
            next_sentence: cfg.next_sentence_head.then(|| NextSentenceHead::new(cfg, device)),
            vocab_size:    cfg.vocab_size,
        })
    }

    /// [vocab, hidden] projection used by the masked-LM head: either the
    /// head's own matrix or the word-embedding table itself.
    pub fn decoder_weight(&self) -> Tensor<B, 2> {
        match &self.masked_lm.decoder {
            Some(decoder) => decoder.val(),
            None => self.bert.embeddings.word_embeddings.weight.val(),
        }
    }

    pub fn encode(&self, input: BertInput<B>, mode: Mode) -> Result<EncoderOutput<B>> {
        self.bert.forward(input, mode)
    }

    /// Vocabulary logits for every position: [batch, seq_len, vocab].
    pub fn masked_lm_logits(&self, hidden_states: Tensor<B, 3>) -> Tensor<B, 3> {
        self.masked_lm.forward(hidden_states, self.decoder_weight())
    }

    /// Full pretraining forward pass: encoder, both heads, weighted loss.
    pub fn forward_loss(
        &self,
        input:   BertInput<B>,
        targets: PretrainTargets<B>,
        weights: LossWeights,
        mode:    Mode,
    ) -> Result<PretrainOutput<B>> {
        let [batch_size, seq_len] = input.input_ids.dims();
        let encoded = self.encode(input, mode)?;

        let MaskedLmTargets { positions, labels, weights: slot_weights } = targets.masked_lm;
        check_slots(&positions, &labels, &slot_weights, batch_size)?;
        let [_, slots] = positions.dims();

        if slots > 0 {
            if let Some(position) = first_out_of_range(&positions, seq_len) {
                return Err(BertError::PositionOutOfRange { position, seq_len });
            }
            if let Some(id) = first_out_of_range(&labels, self.vocab_size) {
                return Err(BertError::TokenOutOfRange { id, vocab_size: self.vocab_size });
            }
        }

        let [_, _, hidden_size] = encoded.hidden_states.dims();
        let device = encoded.hidden_states.device();

        let (masked_lm_loss, masked_lm_logits) = if slots == 0 {
            (
                Tensor::zeros([1], &device),
                Tensor::zeros([batch_size, 0, self.vocab_size], &device),
            )
        } else {
            // [b, slots] → [b, slots, hidden] gather indices
            let index = positions
                .reshape([batch_size, slots, 1])
                .repeat_dim(2, hidden_size);
            let picked = encoded.hidden_states.gather(1, index);
            let logits = self.masked_lm_logits(picked);
            (masked_lm_loss(logits.clone(), labels, slot_weights), logits)
        };

        let (next_sentence_loss, next_sentence_logits) = match targets.next_sentence {
            Some(labels) => {
                let head = self.next_sentence.as_ref().ok_or(BertError::MissingNextSentenceHead)?;
                let label_dims = labels.dims();
                if label_dims != [batch_size] {
                    return Err(BertError::ShapeMismatch {
                        what:     "next_sentence_labels",
                        expected: vec![batch_size],
                        actual:   label_dims.to_vec(),
                    });
                }
                if let Some(label) = first_out_of_range(&labels, 2) {
                    return Err(BertError::InvalidConfig(format!(
                        "next-sentence label {label} is not 0 or 1"
                    )));
                }
                let logits = head.forward(encoded.pooled);
                (Some(next_sentence_loss(logits.clone(), labels)), Some(logits))
            }
            None => (None, None),
        };

        let mut loss = masked_lm_loss.clone().mul_scalar(weights.masked_lm);
        if let Some(nsp) = &next_sentence_loss {
            loss = loss + nsp.clone().mul_scalar(weights.next_sentence);
        }

        Ok(PretrainOutput {
            loss,
            masked_lm_loss,
            next_sentence_loss,
            masked_lm_logits,
            next_sentence_logits,
        })
    }
}

fn check_slots<B: Backend>(
    positions:  &Tensor<B, 2, Int>,
    labels:     &Tensor<B, 2, Int>,
    weights:    &Tensor<B, 2>,
    batch_size: usize,
) -> Result<()> {
    let [rows, slots] = positions.dims();
    let expected = [batch_size, slots];
    for (what, dims) in [
        ("masked_positions", [rows, slots]),
        ("masked_labels", labels.dims()),
        ("masked_weights", weights.dims()),
    ] {
        if dims != expected {
            return Err(BertError::ShapeMismatch { what, expected: expected.to_vec(), actual: dims.to_vec() });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::config::NormPlacement;
    use crate::ml::test_utils::{
        assert_close, ids, tiny_config, to_vec, TestAutodiffBackend, TestBackend,
    };
    use burn::{
        module::Param,
        record::{BinBytesRecorder, FullPrecisionSettings, Recorder},
    };

    fn targets<B: Backend>(
        positions: &[i32],
        labels:    &[i32],
        weights:   &[f32],
        nsp:       Option<i32>,
        device:    &B::Device,
    ) -> PretrainTargets<B> {
        PretrainTargets {
            masked_lm: MaskedLmTargets {
                positions: ids::<B>(&[positions], device),
                labels:    ids::<B>(&[labels], device),
                weights:   Tensor::<B, 1>::from_floats(weights, device).reshape([1, weights.len()]),
            },
            next_sentence: nsp.map(|l| Tensor::<B, 1, Int>::from_ints([l], device)),
        }
    }

    fn grad_is_nonzero<const D: usize>(
        param: &Param<Tensor<TestAutodiffBackend, D>>,
        grads: &<TestAutodiffBackend as burn::tensor::backend::AutodiffBackend>::Gradients,
    ) -> bool {
        param
            .val()
            .grad(grads)
            .map(|g| to_vec(g).iter().any(|v| *v != 0.0))
            .unwrap_or(false)
    }

    #[test]
    fn test_construction_rejects_indivisible_heads() {
        let cfg = tiny_config(NormPlacement::PostNorm).with_num_heads(3);
        let err = cfg.init::<TestBackend>(&Default::default()).unwrap_err();
        assert_eq!(err, BertError::HeadCountMismatch { hidden_size: 4, num_heads: 3 });
    }

    #[test]
    fn test_one_layer_two_heads_trains_every_parameter() {
        for placement in [NormPlacement::PostNorm, NormPlacement::PreNorm] {
            let device = Default::default();
            let model = tiny_config(placement).init::<TestAutodiffBackend>(&device).unwrap();

            let input = BertInput::new(ids(&[&[1, 7, 2]], &device));
            let out = model
                .forward_loss(input, targets(&[1], &[9], &[1.0], Some(1), &device), LossWeights::default(), Mode::Train)
                .unwrap();
            let loss = out.loss.clone().into_scalar().elem::<f64>();
            assert!(loss.is_finite() && loss > 0.0);

            let grads = out.loss.backward();
            let emb = &model.bert.embeddings;
            let mut params = vec![
                ("word", grad_is_nonzero(&emb.word_embeddings.weight, &grads)),
                ("position", grad_is_nonzero(&emb.position_embeddings.as_ref().unwrap().weight, &grads)),
                ("segment", grad_is_nonzero(&emb.token_type_embeddings.as_ref().unwrap().weight, &grads)),
                ("emb_gamma", grad_is_nonzero(&emb.layer_norm.gamma, &grads)),
                ("emb_beta", grad_is_nonzero(emb.layer_norm.beta.as_ref().unwrap(), &grads)),
            ];
            for block in &model.bert.encoder.layers {
                let attn = &block.attention;
                // The key bias adds the same q·b_k to every score in a row, which
                // softmax cancels: its gradient is analytically zero.
                params.extend([
                    ("q_w", grad_is_nonzero(&attn.query.weight, &grads)),
                    ("q_b", grad_is_nonzero(attn.query.bias.as_ref().unwrap(), &grads)),
                    ("k_w", grad_is_nonzero(&attn.key.weight, &grads)),
                    ("v_w", grad_is_nonzero(&attn.value.weight, &grads)),
                    ("v_b", grad_is_nonzero(attn.value.bias.as_ref().unwrap(), &grads)),
                    ("o_w", grad_is_nonzero(&attn.output.weight, &grads)),
                    ("o_b", grad_is_nonzero(attn.output.bias.as_ref().unwrap(), &grads)),
                    ("attn_gamma", grad_is_nonzero(&block.attention_norm.gamma, &grads)),
                    ("attn_beta", grad_is_nonzero(block.attention_norm.beta.as_ref().unwrap(), &grads)),
                    ("ff1_w", grad_is_nonzero(&block.feed_forward.intermediate.weight, &grads)),
                    ("ff1_b", grad_is_nonzero(block.feed_forward.intermediate.bias.as_ref().unwrap(), &grads)),
                    ("ff2_w", grad_is_nonzero(&block.feed_forward.output.weight, &grads)),
                    ("ff2_b", grad_is_nonzero(block.feed_forward.output.bias.as_ref().unwrap(), &grads)),
                    ("out_gamma", grad_is_nonzero(&block.output_norm.gamma, &grads)),
                    ("out_beta", grad_is_nonzero(block.output_norm.beta.as_ref().unwrap(), &grads)),
                ]);
            }
            if let Some(norm) = &model.bert.encoder.final_norm {
                params.push(("final_gamma", grad_is_nonzero(&norm.gamma, &grads)));
                params.push(("final_beta", grad_is_nonzero(norm.beta.as_ref().unwrap(), &grads)));
            }
            let pooler = &model.bert.encoder.pooler.dense;
            let mlm = &model.masked_lm;
            let nsp = &model.next_sentence.as_ref().unwrap().classifier;
            params.extend([
                ("pool_w", grad_is_nonzero(&pooler.weight, &grads)),
                ("pool_b", grad_is_nonzero(pooler.bias.as_ref().unwrap(), &grads)),
                ("mlm_w", grad_is_nonzero(&mlm.transform.weight, &grads)),
                ("mlm_b", grad_is_nonzero(mlm.transform.bias.as_ref().unwrap(), &grads)),
                ("mlm_gamma", grad_is_nonzero(&mlm.layer_norm.gamma, &grads)),
                ("mlm_beta", grad_is_nonzero(mlm.layer_norm.beta.as_ref().unwrap(), &grads)),
                ("mlm_bias", grad_is_nonzero(&mlm.bias, &grads)),
                ("nsp_w", grad_is_nonzero(&nsp.weight, &grads)),
                ("nsp_b", grad_is_nonzero(nsp.bias.as_ref().unwrap(), &grads)),
            ]);

            let dead: Vec<_> = params.iter().filter(|(_, ok)| !ok).map(|(n, _)| *n).collect();
            assert!(dead.is_empty(), "{placement:?}: zero gradient for {dead:?}");
        }
    }

    #[test]
    fn test_all_masked_attention_is_fatal() {
        let device = Default::default();
        let mask = AttentionMask::<TestBackend>::from_padding(ids(&[&[0, 0, 0]], &device));
        assert_eq!(mask.unwrap_err(), BertError::EmptyAttentionMask);
    }

    #[test]
    fn test_zero_masked_positions_give_zero_loss_and_zero_head_gradients() {
        let device = Default::default();
        let model = tiny_config(NormPlacement::PostNorm)
            .with_tie_word_embeddings(false)
            .init::<TestAutodiffBackend>(&device)
            .unwrap();

        let input = BertInput::new(ids(&[&[1, 7, 2]], &device));
        let out = model
            .forward_loss(input, targets(&[0], &[0], &[0.0], None, &device), LossWeights::default(), Mode::Train)
            .unwrap();
        assert_eq!(out.masked_lm_loss.clone().into_scalar().elem::<f32>(), 0.0);

        let grads = out.loss.backward();
        let mlm = &model.masked_lm;
        let zero_or_absent = |g: Option<Tensor<TestBackend, 2>>| {
            g.map(|g| to_vec(g).iter().all(|v| *v == 0.0)).unwrap_or(true)
        };
        assert!(zero_or_absent(mlm.transform.weight.val().grad(&grads)));
        assert!(zero_or_absent(mlm.decoder.as_ref().unwrap().val().grad(&grads)));
        let bias_grad = mlm.bias.val().grad(&grads);
        assert!(bias_grad.map(|g| to_vec(g).iter().all(|v| *v == 0.0)).unwrap_or(true));
    }

    #[test]
    fn test_masked_lm_loss_ignores_position_order() {
        let device = Default::default();
        let model = tiny_config(NormPlacement::PostNorm).init::<TestBackend>(&device).unwrap();
        let run = |positions: &[i32], labels: &[i32]| {
            let input = BertInput::new(ids(&[&[1, 4, 5, 6, 2]], &device));
            model
                .forward_loss(input, targets(positions, labels, &[1.0, 1.0, 1.0], None, &device), LossWeights::default(), Mode::Eval)
                .unwrap()
                .masked_lm_loss
                .into_scalar()
                .elem::<f64>()
        };
        let a = run(&[1, 2, 3], &[4, 5, 6]);
        let b = run(&[3, 1, 2], &[6, 4, 5]);
        assert!((a - b).abs() < 1e-6, "{a} vs {b}");
    }

    #[test]
    fn test_masked_position_outside_sequence_is_rejected() {
        let device = Default::default();
        let model = tiny_config(NormPlacement::PostNorm).init::<TestBackend>(&device).unwrap();
        let input = BertInput::new(ids(&[&[1, 4, 2]], &device));
        let err = model
            .forward_loss(input, targets(&[3], &[4], &[1.0], None, &device), LossWeights::default(), Mode::Eval)
            .err()
            .unwrap();
        assert_eq!(err, BertError::PositionOutOfRange { position: 3, seq_len: 3 });
    }

    #[test]
    fn test_next_sentence_target_without_head_is_rejected() {
        let device = Default::default();
        let model = tiny_config(NormPlacement::PostNorm)
            .with_next_sentence_head(false)
            .init::<TestBackend>(&device)
            .unwrap();
        let input = BertInput::new(ids(&[&[1, 4, 2]], &device));
        let err = model
            .forward_loss(input, targets(&[1], &[4], &[1.0], Some(0), &device), LossWeights::default(), Mode::Eval)
            .err()
            .unwrap();
        assert_eq!(err, BertError::MissingNextSentenceHead);
    }

    #[test]
    fn test_mask_shape_must_match_input() {
        let device = Default::default();
        let model = tiny_config(NormPlacement::PostNorm).init::<TestBackend>(&device).unwrap();
        let mask = AttentionMask::from_padding(ids(&[&[1, 1]], &device)).unwrap();
        let input = BertInput::new(ids(&[&[1, 4, 2]], &device)).with_attention_mask(mask);
        assert!(matches!(model.encode(input, Mode::Eval), Err(BertError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_permutation_equivariance_without_positions() {
        let device = Default::default();
        let model = tiny_config(NormPlacement::PostNorm)
            .with_use_position_embeddings(false)
            .init::<TestBackend>(&device)
            .unwrap();

        let encode = |tokens: &[i32], mask: &[i32]| {
            let input = BertInput::new(ids(&[tokens], &device))
                .with_attention_mask(AttentionMask::from_padding(ids(&[mask], &device)).unwrap());
            model.encode(input, Mode::Eval).unwrap().hidden_states
        };
        let original = encode(&[5, 9, 2, 0], &[1, 1, 1, 0]);
        let permuted = encode(&[2, 0, 5, 9], &[1, 0, 1, 1]);

        let perm = Tensor::<TestBackend, 1, Int>::from_ints([2, 3, 0, 1], &device);
        assert_close(&to_vec(permuted), &to_vec(original.select(1, perm)), 1e-5);
    }

    #[test]
    fn test_weight_tying_shares_the_embedding_table() {
        let device = Default::default();
        let model = tiny_config(NormPlacement::PostNorm).init::<TestBackend>(&device).unwrap();
        assert!(model.masked_lm.is_tied());
        assert_eq!(
            to_vec(model.decoder_weight()),
            to_vec(model.bert.embeddings.word_embeddings.weight.val())
        );
    }

    #[test]
    fn test_record_round_trip_is_bit_identical() {
        let device = Default::default();
        let cfg = tiny_config(NormPlacement::PreNorm);
        let model = cfg.init::<TestBackend>(&device).unwrap();
        let run = |m: &BertForPreTraining<TestBackend>| {
            let out = m.encode(BertInput::new(ids(&[&[1, 3, 4, 2]], &device)), Mode::Eval).unwrap();
            to_vec(m.masked_lm_logits(out.hidden_states))
        };
        let before = run(&model);

        let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
        let bytes = recorder.record(model.into_record(), ()).unwrap();
        let fresh = cfg.init::<TestBackend>(&device).unwrap();
        let restored = fresh.load_record(recorder.load(bytes, &device).unwrap());

        assert_eq!(run(&restored), before);
    }

    #[test]
    fn test_encoder_output_depends_on_position_table() {
        let device = Default::default();
        let bert = tiny_config(NormPlacement::PostNorm)
            .init::<TestBackend>(&device)
            .unwrap()
            .bert;
        let run = |m: &BertModel<TestBackend>| {
            let input = BertInput::new(ids(&[&[1, 5, 6, 2]], &device));
            to_vec(m.forward(input, Mode::Eval).unwrap().hidden_states)
        };
        let before = run(&bert);

        let mut flipped = bert.clone();
        if let Some(table) = flipped.embeddings.position_embeddings.as_mut() {
            let weight = table.weight.val();
            let [rows, _] = weight.dims();
            let reversed: Vec<i32> = (0..rows as i32).rev().collect();
            let index = Tensor::<TestBackend, 1, Int>::from_ints(reversed.as_slice(), &device);
            table.weight = Param::from_tensor(weight.select(0, index));
        }
        let after = run(&flipped);

        assert!(
            before.iter().zip(&after).any(|(a, b)| (a - b).abs() > 1e-4),
            "hidden states ignored the position table"
        );
    }
}
