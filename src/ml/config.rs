// ============================================================
// Layer 5: Model Configuration
// ============================================================
// Every architectural option of the encoder in one Burn Config.
// Defaults follow BERT-base, so `BertConfig::new(vocab_size)`
// builds the published architecture.
//
// NOTE: #[derive(Config)] already generates Clone and
// Serialize/Deserialize, plus `save`/`load` for JSON files.

use burn::{nn::Initializer, prelude::*};

// Aliased: the serde impls generated by #[derive(Config)] name the
// two-parameter std Result.
use crate::domain::error::{BertError, Result as BertResult};
use crate::ml::model::BertForPreTraining;

/// Where LayerNorm sits relative to each residual addition.
#[derive(Config, Debug, PartialEq, Copy)]
pub enum NormPlacement {
    /// `LN(x + sublayer(x))`, the original BERT layout
    PostNorm,
    /// `x + sublayer(LN(x))`, plus one final LN after the stack
    PreNorm,
}

#[derive(Config, Debug)]
pub struct BertConfig {
    pub vocab_size: usize,

    #[config(default = 768)]
    pub hidden_size: usize,

    #[config(default = 12)]
    pub num_heads: usize,

    #[config(default = 12)]
    pub num_layers: usize,

    #[config(default = 3072)]
    pub feed_forward_size: usize,

    #[config(default = 512)]
    pub max_position_count: usize,

    /// Number of segment ids; 0 disables the segment table.
    #[config(default = 2)]
    pub type_vocab_size: usize,

    #[config(default = 0.1)]
    pub dropout_rate: f64,

    #[config(default = 0.1)]
    pub attention_dropout_rate: f64,

    #[config(default = "NormPlacement::PostNorm")]
    pub norm_placement: NormPlacement,

    /// Reuse the token-embedding table as the masked-LM output projection.
    #[config(default = true)]
    pub tie_word_embeddings: bool,

    #[config(default = 1e-12)]
    pub layer_norm_eps: f64,

    /// Std of the zero-mean normal used for every weight matrix.
    #[config(default = 0.02)]
    pub initializer_range: f64,

    #[config(default = true)]
    pub use_position_embeddings: bool,

    #[config(default = true)]
    pub next_sentence_head: bool,
}

impl BertConfig {
    /// Reject any configuration that cannot build a consistent model.
    pub fn validate(&self) -> BertResult<()> {
        let sizes = [
            ("vocab_size", self.vocab_size),
            ("hidden_size", self.hidden_size),
            ("num_heads", self.num_heads),
            ("num_layers", self.num_layers),
            ("feed_forward_size", self.feed_forward_size),
            ("max_position_count", self.max_position_count),
        ];
        if let Some((name, _)) = sizes.iter().find(|(_, v)| *v == 0) {
            return Err(BertError::InvalidConfig(format!("{name} must be greater than zero")));
        }
        if self.hidden_size % self.num_heads != 0 {
            return Err(BertError::HeadCountMismatch {
                hidden_size: self.hidden_size,
                num_heads:   self.num_heads,
            });
        }
        for (name, p) in [
            ("dropout_rate", self.dropout_rate),
            ("attention_dropout_rate", self.attention_dropout_rate),
        ] {
            if !(0.0..1.0).contains(&p) {
                return Err(BertError::InvalidConfig(format!("{name} must lie in [0, 1), got {p}")));
            }
        }
        if self.layer_norm_eps <= 0.0 || self.initializer_range <= 0.0 {
            return Err(BertError::InvalidConfig(
                "layer_norm_eps and initializer_range must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn head_dim(&self) -> usize {
        self.hidden_size / self.num_heads
    }

    pub fn pre_norm(&self) -> bool {
        matches!(self.norm_placement, NormPlacement::PreNorm)
    }

    /// Zero-mean normal initialiser shared by every weight matrix.
    pub fn weight_initializer(&self) -> Initializer {
        Initializer::Normal { mean: 0.0, std: self.initializer_range }
    }

    /// Validate, then build the full pretraining model on `device`.
    pub fn init<B: Backend>(&self, device: &B::Device) -> BertResult<BertForPreTraining<B>> {
        self.validate()?;
        BertForPreTraining::new(self, device)
    }
}
