// ============================================================
// Layer 3: Pretraining Example Domain Type
// ============================================================
// One pre-tokenised pretraining sequence, exactly as it arrives
// from the upstream tokenisation collaborator:
//
//   [CLS] sentence A [SEP] sentence B [SEP]
//
// Token ids are plain integers; this layer knows nothing about
// tensors. Segment ids mark sentence A (0) vs sentence B (1).
// The next-sentence label is 0 when B really follows A and 1
// when B was sampled at random (original BERT convention).
//
// Reference: Devlin et al. (2019) BERT, §3.1

use serde::{Deserialize, Serialize};

/// Reserved ids of the BERT uncased vocabulary.
pub mod special {
    pub const PAD:  u32 = 0;
    pub const UNK:  u32 = 100;
    pub const CLS:  u32 = 101;
    pub const SEP:  u32 = 102;
    pub const MASK: u32 = 103;

    /// Ids that are never chosen for masking.
    pub fn is_special(id: u32) -> bool {
        matches!(id, PAD | UNK | CLS | SEP | MASK)
    }
}

/// A pre-tokenised sequence with optional segment and NSP annotations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PretrainExample {
    /// Token ids, already wrapped in [CLS] ... [SEP]
    pub input_ids: Vec<u32>,

    /// Sentence A / B marker per token. Empty means "all zeros".
    #[serde(default)]
    pub segment_ids: Vec<u32>,

    /// 0 = IsNext, 1 = NotNext. Absent for single-sentence corpora.
    #[serde(default)]
    pub next_sentence_label: Option<u32>,
}

impl PretrainExample {
    pub fn new(input_ids: Vec<u32>) -> Self {
        Self { input_ids, segment_ids: Vec::new(), next_sentence_label: None }
    }

    pub fn with_segments(mut self, segment_ids: Vec<u32>) -> Self {
        self.segment_ids = segment_ids;
        self
    }

    pub fn with_next_sentence_label(mut self, label: u32) -> Self {
        self.next_sentence_label = Some(label);
        self
    }

    pub fn len(&self) -> usize {
        self.input_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input_ids.is_empty()
    }

    /// Segment id at `i`, defaulting to 0 when no segments were given.
    pub fn segment_at(&self, i: usize) -> u32 {
        self.segment_ids.get(i).copied().unwrap_or(0)
    }
}

/// An example after the masking collaborator has corrupted it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskedExample {
    /// Corrupted input ids fed to the encoder
    pub input_ids: Vec<u32>,
    pub segment_ids: Vec<u32>,
    pub next_sentence_label: Option<u32>,

    /// Positions whose original token must be predicted
    pub masked_positions: Vec<usize>,

    /// Original token id at each masked position
    pub masked_labels: Vec<u32>,
}

impl MaskedExample {
    pub fn num_predictions(&self) -> usize {
        self.masked_positions.len()
    }
}
