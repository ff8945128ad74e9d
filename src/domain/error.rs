// ============================================================
// Layer 3: Model Error Taxonomy
// ============================================================
// Every fatal condition the encoder core can detect, as one
// typed enum. The core never logs and never retries; callers
// receive these values unchanged and decide what to do.
//
// Three families:
//   - Configuration: sizes that cannot build a valid model
//   - Input: ids, positions or shapes outside what the model
//     was configured for
//   - Mask: an attention row with nothing left to attend to
//   - Host reads: tensor values that cannot be read back
//
// Zero masked-LM positions is NOT an error: the loss is
// defined as 0.0 for that case (see ml::loss).

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum BertError {
    #[error("hidden_size ({hidden_size}) must be divisible by num_heads ({num_heads})")]
    HeadCountMismatch { hidden_size: usize, num_heads: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("token id {id} is outside the vocabulary [0, {vocab_size})")]
    TokenOutOfRange { id: i64, vocab_size: usize },

    #[error("segment id {id} is outside [0, {type_vocab_size})")]
    SegmentOutOfRange { id: i64, type_vocab_size: usize },

    #[error("segment ids were supplied but the model has no segment embedding table")]
    SegmentsDisabled,

    #[error("sequence length {len} exceeds max_position_count {max}")]
    SequenceTooLong { len: usize, max: usize },

    #[error("masked position {position} is outside the sequence of length {seq_len}")]
    PositionOutOfRange { position: i64, seq_len: usize },

    #[error("attention mask leaves at least one row with zero valid positions")]
    EmptyAttentionMask,

    #[error("shape mismatch for {what}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("the model was built without a next-sentence head")]
    MissingNextSentenceHead,

    #[error("cannot read tensor values back to the host: {0}")]
    TensorData(String),
}

pub type Result<T> = std::result::Result<T, BertError>;
