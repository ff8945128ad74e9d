// ============================================================
// Layer 4: Example Preprocessor
// ============================================================
// Checks every loaded example against the model's limits before
// it reaches the masker, so the encoder never sees an id it
// would reject.
//
// Steps (applied in order):
//   1. Drop empty examples
//   2. Drop examples whose segment ids do not line up with tokens
//   3. Drop examples with out-of-vocabulary token/segment ids
//      or an NSP label other than 0/1
//   4. Truncate to `max_len`, keeping a trailing [SEP]
//
// Dropped examples are logged at warn level and counted.

use crate::domain::error::{BertError, Result};
use crate::domain::example::{special, PretrainExample};

pub struct Preprocessor {
    max_len:         usize,
    vocab_size:      usize,
    type_vocab_size: usize,
}

impl Preprocessor {
    /// `max_len` must leave room for at least [CLS] and [SEP].
    pub fn new(max_len: usize, vocab_size: usize, type_vocab_size: usize) -> Result<Self> {
        if max_len < 2 {
            return Err(BertError::InvalidConfig(format!(
                "max sequence length must be at least 2, got {max_len}"
            )));
        }
        Ok(Self { max_len, vocab_size, type_vocab_size })
    }

    /// Returns None when the example cannot be fed to the model.
    pub fn prepare(&self, mut example: PretrainExample) -> Option<PretrainExample> {
        if example.is_empty() {
            tracing::warn!("Skipping empty example");
            return None;
        }
        if !example.segment_ids.is_empty() && example.segment_ids.len() != example.len() {
            tracing::warn!(
                "Skipping example: {} segment ids for {} tokens",
                example.segment_ids.len(),
                example.len()
            );
            return None;
        }
        if let Some(id) = example.input_ids.iter().find(|&&id| id as usize >= self.vocab_size) {
            tracing::warn!("Skipping example: token id {id} outside vocabulary of {}", self.vocab_size);
            return None;
        }
        if !example.segment_ids.is_empty() {
            if self.type_vocab_size == 0 && example.segment_ids.iter().any(|&s| s != 0) {
                tracing::warn!("Skipping example: segment ids given but segments are disabled");
                return None;
            }
            if self.type_vocab_size > 0
                && example.segment_ids.iter().any(|&s| s as usize >= self.type_vocab_size)
            {
                tracing::warn!("Skipping example: segment id outside 0..{}", self.type_vocab_size);
                return None;
            }
        }
        if matches!(example.next_sentence_label, Some(l) if l > 1) {
            tracing::warn!("Skipping example: next-sentence label must be 0 or 1");
            return None;
        }

        // ── Truncation ────────────────────────────────────────────────────────
        if example.len() > self.max_len {
            let ends_with_sep = example.input_ids.last() == Some(&special::SEP);
            example.input_ids.truncate(self.max_len);
            example.segment_ids.truncate(self.max_len.min(example.segment_ids.len()));
            if ends_with_sep {
                if let Some(last) = example.input_ids.last_mut() {
                    *last = special::SEP;
                }
            }
        }
        Some(example)
    }

    pub fn prepare_all(&self, examples: Vec<PretrainExample>) -> Vec<PretrainExample> {
        let total = examples.len();
        let kept: Vec<_> = examples.into_iter().filter_map(|ex| self.prepare(ex)).collect();
        if kept.len() < total {
            tracing::warn!("Dropped {} of {} examples during preprocessing", total - kept.len(), total);
        }
        kept
    }
}
