// ============================================================
// Layer 5: Input Embeddings
// ============================================================
// Turns token ids into the first hidden-state tensor:
//
//   word_embeddings[id]
//     + position_embeddings[0..L]      (unless disabled)
//     + token_type_embeddings[segment] (when type_vocab_size > 0)
//   → LayerNorm → Dropout (train mode only)
//
// Self-attention is permutation-equivariant, so position must be
// injected here explicitly. Every id is range-checked first: an
// out-of-range lookup is a fatal input error, never clamped.
//
// Reference: Devlin et al. (2019) BERT, Figure 2

use burn::{
    nn::{Dropout, DropoutConfig, Embedding, EmbeddingConfig, LayerNorm, LayerNormConfig},
    prelude::*,
};

use crate::domain::error::{BertError, Result};
use crate::ml::checks::first_out_of_range;
use crate::ml::config::BertConfig;
use crate::ml::mode::Mode;

#[derive(Module, Debug)]
pub struct BertEmbeddings<B: Backend> {
    pub word_embeddings:       Embedding<B>,
    pub position_embeddings:   Option<Embedding<B>>,
    pub token_type_embeddings: Option<Embedding<B>>,
    pub layer_norm:            LayerNorm<B>,
    pub dropout:               Dropout,
    vocab_size:                usize,
    max_position_count:        usize,
    type_vocab_size:           usize,
}

impl<B: Backend> BertEmbeddings<B> {
    pub fn new(cfg: &BertConfig, device: &B::Device) -> Self {
        let new_table = |rows: usize| {
            EmbeddingConfig::new(rows, cfg.hidden_size)
                .with_initializer(cfg.weight_initializer())
                .init(device)
        };
        Self {
            word_embeddings:       new_table(cfg.vocab_size),
            position_embeddings:   cfg.use_position_embeddings.then(|| new_table(cfg.max_position_count)),
            token_type_embeddings: (cfg.type_vocab_size > 0).then(|| new_table(cfg.type_vocab_size)),
            layer_norm: LayerNormConfig::new(cfg.hidden_size)
                .with_epsilon(cfg.layer_norm_eps)
                .init(device),
            dropout:            DropoutConfig::new(cfg.dropout_rate).init(),
            vocab_size:         cfg.vocab_size,
            max_position_count: cfg.max_position_count,
            type_vocab_size:    cfg.type_vocab_size,
        }
    }

    /// input_ids, segment_ids: [batch, seq_len] → [batch, seq_len, hidden]
    pub fn forward(
        &self,
        input_ids:   Tensor<B, 2, Int>,
        segment_ids: Option<Tensor<B, 2, Int>>,
        mode:        Mode,
    ) -> Result<Tensor<B, 3>> {
        let [batch_size, seq_len] = input_ids.dims();
        if batch_size == 0 || seq_len == 0 {
            return Err(BertError::ShapeMismatch {
                what:     "input_ids",
                expected: vec![batch_size.max(1), seq_len.max(1)],
                actual:   vec![batch_size, seq_len],
            });
        }
        if seq_len > self.max_position_count {
            return Err(BertError::SequenceTooLong { len: seq_len, max: self.max_position_count });
        }
        if let Some(id) = first_out_of_range(&input_ids, self.vocab_size) {
            return Err(BertError::TokenOutOfRange { id, vocab_size: self.vocab_size });
        }

        let device = input_ids.device();
        let mut x  = self.word_embeddings.forward(input_ids);

        if let Some(position_embeddings) = &self.position_embeddings {
            let positions = Tensor::<B, 1, Int>::arange(0..seq_len as i64, &device)
                .unsqueeze::<2>()
                .expand([batch_size, seq_len]);
            x = x + position_embeddings.forward(positions);
        }

        match (&self.token_type_embeddings, segment_ids) {
            (Some(table), Some(segments)) => {
                let dims = segments.dims();
                if dims != [batch_size, seq_len] {
                    return Err(BertError::ShapeMismatch {
                        what:     "segment_ids",
                        expected: vec![batch_size, seq_len],
                        actual:   dims.to_vec(),
                    });
                }
                if let Some(id) = first_out_of_range(&segments, self.type_vocab_size) {
                    return Err(BertError::SegmentOutOfRange { id, type_vocab_size: self.type_vocab_size });
                }
                x = x + table.forward(segments);
            }
            // Missing segments mean "everything is sentence A".
            (Some(table), None) => {
                let segments = Tensor::<B, 2, Int>::zeros([batch_size, seq_len], &device);
                x = x + table.forward(segments);
            }
            (None, Some(_)) => return Err(BertError::SegmentsDisabled),
            (None, None) => {}
        }

        let x = self.layer_norm.forward(x);
        Ok(if mode.is_train() { self.dropout.forward(x) } else { x })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::config::NormPlacement;
    use crate::ml::test_utils::{ids, tiny_config, to_vec, TestBackend};
    use burn::module::Param;

    fn embeddings(cfg: &BertConfig) -> BertEmbeddings<TestBackend> {
        BertEmbeddings::new(cfg, &Default::default())
    }

    #[test]
    fn test_output_shape() {
        let device = Default::default();
        let emb = embeddings(&tiny_config(NormPlacement::PostNorm));
        let out = emb.forward(ids::<TestBackend>(&[&[1, 2, 3], &[4, 5, 6]], &device), None, Mode::Eval).unwrap();
        assert_eq!(out.dims(), [2, 3, 4]);
    }

    #[test]
    fn test_token_id_at_vocab_size_is_rejected() {
        let device = Default::default();
        let emb = embeddings(&tiny_config(NormPlacement::PostNorm));
        let err = emb.forward(ids::<TestBackend>(&[&[1, 16]], &device), None, Mode::Eval).unwrap_err();
        assert_eq!(err, BertError::TokenOutOfRange { id: 16, vocab_size: 16 });
    }

    #[test]
    fn test_negative_token_id_is_rejected() {
        let device = Default::default();
        let emb = embeddings(&tiny_config(NormPlacement::PostNorm));
        let err = emb.forward(ids::<TestBackend>(&[&[-1, 2]], &device), None, Mode::Eval).unwrap_err();
        assert!(matches!(err, BertError::TokenOutOfRange { id: -1, .. }));
    }

    #[test]
    fn test_sequence_longer_than_position_table_is_rejected() {
        let device = Default::default();
        let emb = embeddings(&tiny_config(NormPlacement::PostNorm));
        let row = [1i32; 9];
        let err = emb.forward(ids::<TestBackend>(&[&row], &device), None, Mode::Eval).unwrap_err();
        assert_eq!(err, BertError::SequenceTooLong { len: 9, max: 8 });
    }

    #[test]
    fn test_segment_out_of_range_is_rejected() {
        let device = Default::default();
        let emb = embeddings(&tiny_config(NormPlacement::PostNorm));
        let err = emb
            .forward(
                ids::<TestBackend>(&[&[1, 2]], &device),
                Some(ids::<TestBackend>(&[&[0, 2]], &device)),
                Mode::Eval,
            )
            .unwrap_err();
        assert_eq!(err, BertError::SegmentOutOfRange { id: 2, type_vocab_size: 2 });
    }

    #[test]
    fn test_segments_without_table_are_rejected() {
        let device = Default::default();
        let emb = embeddings(&tiny_config(NormPlacement::PostNorm).with_type_vocab_size(0));
        let err = emb
            .forward(
                ids::<TestBackend>(&[&[1, 2]], &device),
                Some(ids::<TestBackend>(&[&[0, 0]], &device)),
                Mode::Eval,
            )
            .unwrap_err();
        assert_eq!(err, BertError::SegmentsDisabled);
    }

    #[test]
    fn test_changing_position_table_changes_output() {
        let device = Default::default();
        let emb = embeddings(&tiny_config(NormPlacement::PostNorm));
        let input = ids::<TestBackend>(&[&[3, 3, 3]], &device);
        let before = to_vec(emb.forward(input.clone(), None, Mode::Eval).unwrap());

        let mut shifted = emb.clone();
        let mut table = shifted.position_embeddings.clone().unwrap();
        table.weight = Param::from_tensor(table.weight.val().mul_scalar(-1.0));
        shifted.position_embeddings = Some(table);
        let after = to_vec(shifted.forward(input, None, Mode::Eval).unwrap());

        assert!(before.iter().zip(&after).any(|(a, b)| (a - b).abs() > 1e-4));
    }

    #[test]
    fn test_identical_tokens_differ_only_by_position() {
        let device = Default::default();
        let emb = embeddings(&tiny_config(NormPlacement::PostNorm));
        let out = to_vec(emb.forward(ids::<TestBackend>(&[&[3, 3]], &device), None, Mode::Eval).unwrap());
        assert!(out[0..4].iter().zip(&out[4..8]).any(|(a, b)| (a - b).abs() > 1e-4));

        let flat = embeddings(&tiny_config(NormPlacement::PostNorm).with_use_position_embeddings(false));
        let out = to_vec(flat.forward(ids::<TestBackend>(&[&[3, 3]], &device), None, Mode::Eval).unwrap());
        assert_eq!(out[0..4], out[4..8]);
    }
}
