// ============================================================
// Layer 4: Pretraining Batcher
// ============================================================
// Implements Burn's Batcher trait: Vec<MaskedExample> → tensors.
//
// Sequences in one batch may differ in length, so every row is
// right-padded with [PAD] to the longest sequence in the batch
// (not to max_position_count). The padding pattern becomes the
// attention mask.
//
// Masked-LM targets are padded the same way, to the largest
// prediction count in the batch (at least one slot). Padding
// slots get position 0, label 0 and weight 0.0, so they add
// nothing to the loss.
//
//   input_ids        [batch, seq_len]
//   attention_mask   [batch, seq_len]   1 = real, 0 = pad
//   segment_ids      [batch, seq_len]
//   masked_positions [batch, slots]
//   masked_labels    [batch, slots]
//   masked_weights   [batch, slots]
//   next_sentence    [batch]            only if every row has a label
//
// Reference: Burn Book §4 (Batcher)

use burn::{data::dataloader::batcher::Batcher, prelude::*};

use crate::domain::error::Result;
use crate::domain::example::{special, MaskedExample};
use crate::ml::attention::AttentionMask;
use crate::ml::model::{BertInput, MaskedLmTargets, PretrainTargets};

// ─── PretrainBatch ────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct PretrainBatch<B: Backend> {
    pub input_ids:            Tensor<B, 2, Int>,
    pub attention_mask:       Tensor<B, 2, Int>,
    /// None when the model has no segment table
    pub segment_ids:          Option<Tensor<B, 2, Int>>,
    pub masked_positions:     Tensor<B, 2, Int>,
    pub masked_labels:        Tensor<B, 2, Int>,
    pub masked_weights:       Tensor<B, 2>,
    pub next_sentence_labels: Option<Tensor<B, 1, Int>>,
}

impl<B: Backend> PretrainBatch<B> {
    /// Encoder input; fails if some row is nothing but padding.
    pub fn model_input(&self) -> Result<BertInput<B>> {
        let mask  = AttentionMask::from_padding(self.attention_mask.clone())?;
        let input = BertInput::new(self.input_ids.clone()).with_attention_mask(mask);
        Ok(match &self.segment_ids {
            Some(segments) => input.with_segment_ids(segments.clone()),
            None => input,
        })
    }

    pub fn targets(&self) -> PretrainTargets<B> {
        PretrainTargets {
            masked_lm: MaskedLmTargets {
                positions: self.masked_positions.clone(),
                labels:    self.masked_labels.clone(),
                weights:   self.masked_weights.clone(),
            },
            next_sentence: self.next_sentence_labels.clone(),
        }
    }
}

// ─── PretrainBatcher ──────────────────────────────────────────────────────────
#[derive(Clone, Debug)]
pub struct PretrainBatcher {
    /// Emit segment ids (false when `type_vocab_size == 0`)
    with_segments: bool,
}

impl PretrainBatcher {
    pub fn new(with_segments: bool) -> Self {
        Self { with_segments }
    }
}

impl<B: Backend> Batcher<B, MaskedExample, PretrainBatch<B>> for PretrainBatcher {
    fn batch(&self, items: Vec<MaskedExample>, device: &B::Device) -> PretrainBatch<B> {
        let batch_size = items.len();
        let seq_len    = items.iter().map(|ex| ex.input_ids.len()).max().unwrap_or(0);
        let slots      = items.iter().map(MaskedExample::num_predictions).max().unwrap_or(0).max(1);

        // ── Token rows, padded to seq_len ─────────────────────────────────────
        let mut ids      = Vec::with_capacity(batch_size * seq_len);
        let mut mask     = Vec::with_capacity(batch_size * seq_len);
        let mut segments = Vec::with_capacity(batch_size * seq_len);
        for ex in &items {
            let pad = seq_len - ex.input_ids.len();
            ids.extend(ex.input_ids.iter().map(|&x| x as i32));
            ids.extend(std::iter::repeat(special::PAD as i32).take(pad));
            mask.extend(std::iter::repeat(1i32).take(ex.input_ids.len()));
            mask.extend(std::iter::repeat(0i32).take(pad));
            segments.extend((0..seq_len).map(|i| ex.segment_ids.get(i).copied().unwrap_or(0) as i32));
        }

        // ── Prediction slots, padded to `slots` ───────────────────────────────
        let mut positions = Vec::with_capacity(batch_size * slots);
        let mut labels    = Vec::with_capacity(batch_size * slots);
        let mut weights   = Vec::with_capacity(batch_size * slots);
        for ex in &items {
            let pad = slots - ex.num_predictions();
            positions.extend(ex.masked_positions.iter().map(|&p| p as i32));
            positions.extend(std::iter::repeat(0i32).take(pad));
            labels.extend(ex.masked_labels.iter().map(|&l| l as i32));
            labels.extend(std::iter::repeat(0i32).take(pad));
            weights.extend(std::iter::repeat(1.0f32).take(ex.num_predictions()));
            weights.extend(std::iter::repeat(0.0f32).take(pad));
        }

        let next_sentence: Option<Vec<i32>> = items
            .iter()
            .map(|ex| ex.next_sentence_label.map(|l| l as i32))
            .collect();

        let int2 = |data: Vec<i32>, cols: usize| {
            Tensor::<B, 1, Int>::from_ints(data.as_slice(), device).reshape([batch_size, cols])
        };

        PretrainBatch {
            input_ids:            int2(ids, seq_len),
            attention_mask:       int2(mask, seq_len),
            segment_ids:          self.with_segments.then(|| int2(segments, seq_len)),
            masked_positions:     int2(positions, slots),
            masked_labels:        int2(labels, slots),
            masked_weights:       Tensor::<B, 1>::from_floats(weights.as_slice(), device)
                .reshape([batch_size, slots]),
            next_sentence_labels: next_sentence
                .map(|labels| Tensor::<B, 1, Int>::from_ints(labels.as_slice(), device)),
        }
    }
}
