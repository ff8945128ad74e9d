// ============================================================
// Layer 5: Evaluation and Fill-Mask Inference
// ============================================================
// Two read-only uses of a trained model:
//
//   evaluate   - runs batches in Eval mode and accumulates
//                loss, masked-LM accuracy and NSP accuracy
//
//   fill_mask  - for every [MASK] in one sequence, returns the
//                top-k vocabulary ids with their probabilities
//
// Accuracy only counts real prediction slots (weight 1.0);
// padding slots never reach the numerator or the denominator.

use burn::{prelude::*, tensor::TensorData};

use crate::data::batcher::PretrainBatch;
use crate::domain::error::{BertError, Result};
use crate::domain::example::special;
use crate::ml::attention::AttentionMask;
use crate::ml::mode::Mode;
use crate::ml::model::{BertForPreTraining, BertInput, LossWeights, PretrainOutput};
use crate::ml::ops::stable_softmax;

// ─── Running metrics ──────────────────────────────────────────────────────────
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PretrainMetrics {
    pub batches:      usize,
    pub loss_sum:     f64,
    pub mlm_loss_sum: f64,
    pub mlm_correct:  f64,
    pub mlm_total:    f64,
    pub nsp_correct:  usize,
    pub nsp_total:    usize,
}

impl PretrainMetrics {
    pub fn add<B: Backend>(&mut self, output: &PretrainOutput<B>, batch: &PretrainBatch<B>) {
        self.batches      += 1;
        self.loss_sum     += output.loss.clone().into_scalar().elem::<f64>();
        self.mlm_loss_sum += output.masked_lm_loss.clone().into_scalar().elem::<f64>();

        // ── Masked-LM accuracy over weighted slots ────────────────────────────
        let [batch_size, slots, _] = output.masked_lm_logits.dims();
        if slots > 0 {
            let predicted = output
                .masked_lm_logits
                .clone()
                .argmax(2)
                .reshape([batch_size, slots]);
            let hits = predicted.equal(batch.masked_labels.clone()).float() * batch.masked_weights.clone();
            self.mlm_correct += hits.sum().into_scalar().elem::<f64>();
            self.mlm_total   += batch.masked_weights.clone().sum().into_scalar().elem::<f64>();
        }

        // ── Next-sentence accuracy ────────────────────────────────────────────
        if let (Some(logits), Some(labels)) = (&output.next_sentence_logits, &batch.next_sentence_labels) {
            let predicted = logits.clone().argmax(1).reshape([batch_size]);
            self.nsp_correct += predicted
                .equal(labels.clone())
                .int()
                .sum()
                .into_scalar()
                .elem::<i64>() as usize;
            self.nsp_total += batch_size;
        }
    }

    pub fn mean_loss(&self) -> f64 {
        if self.batches > 0 { self.loss_sum / self.batches as f64 } else { f64::NAN }
    }

    pub fn mean_mlm_loss(&self) -> f64 {
        if self.batches > 0 { self.mlm_loss_sum / self.batches as f64 } else { f64::NAN }
    }

    pub fn mlm_accuracy(&self) -> f64 {
        if self.mlm_total > 0.0 { self.mlm_correct / self.mlm_total } else { 0.0 }
    }

    /// None when no batch carried next-sentence labels.
    pub fn nsp_accuracy(&self) -> Option<f64> {
        (self.nsp_total > 0).then(|| self.nsp_correct as f64 / self.nsp_total as f64)
    }
}

/// Runs every batch through `model` in Eval mode.
pub fn evaluate<B: Backend>(
    model:   &BertForPreTraining<B>,
    batches: impl IntoIterator<Item = PretrainBatch<B>>,
    weights: LossWeights,
) -> Result<PretrainMetrics> {
    let mut metrics = PretrainMetrics::default();
    for batch in batches {
        let output = model.forward_loss(batch.model_input()?, batch.targets(), weights, Mode::Eval)?;
        metrics.add(&output, &batch);
    }
    Ok(metrics)
}

fn host_floats(data: TensorData) -> Result<Vec<f32>> {
    data.to_vec::<f32>().map_err(|e| BertError::TensorData(e.to_string()))
}

// ─── Fill-mask ────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq)]
pub struct MaskPrediction {
    pub position:   usize,
    /// (token id, probability), most likely first
    pub candidates: Vec<(u32, f32)>,
}

pub fn fill_mask<B: Backend>(
    model:     &BertForPreTraining<B>,
    input_ids: &[u32],
    top_k:     usize,
    device:    &B::Device,
) -> Result<Vec<MaskPrediction>> {
    if input_ids.is_empty() {
        return Err(BertError::ShapeMismatch { what: "input_ids", expected: vec![1, 1], actual: vec![1, 0] });
    }
    let seq_len = input_ids.len();
    let flat: Vec<i32> = input_ids.iter().map(|&id| id as i32).collect();
    let ids = Tensor::<B, 1, Int>::from_ints(flat.as_slice(), device).reshape([1, seq_len]);

    let input   = BertInput::new(ids).with_attention_mask(AttentionMask::all_valid(1, seq_len, device));
    let encoded = model.encode(input, Mode::Eval)?;
    let logits  = model.masked_lm_logits(encoded.hidden_states);
    let [_, _, vocab_size] = logits.dims();

    let probs = host_floats(stable_softmax(logits, 2).into_data().convert::<f32>())?;

    let predictions = input_ids
        .iter()
        .enumerate()
        .filter(|(_, &id)| id == special::MASK)
        .filter_map(|(position, _)| {
            let row = probs.get(position * vocab_size..(position + 1) * vocab_size)?;
            let mut ranked: Vec<(u32, f32)> = row.iter().enumerate().map(|(id, &p)| (id as u32, p)).collect();
            ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
            ranked.truncate(top_k);
            Some(MaskPrediction { position, candidates: ranked })
        })
        .collect();
    Ok(predictions)
}
