// ============================================================
// Layer 1: CLI Commands and Arguments
// ============================================================
// Three subcommands: `pretrain`, `evaluate` and `fill-mask`.
//
// clap's derive macros generate --help text, missing-argument
// errors and string → number conversion for every flag.

use anyhow::{Context, Result};
use clap::{Args, Subcommand, ValueEnum};

use crate::application::pretrain_use_case::PretrainConfig;
use crate::ml::config::NormPlacement;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Pretrain a BERT encoder on pre-tokenised JSONL examples
    Pretrain(PretrainArgs),

    /// Report masked-LM and next-sentence metrics for a checkpoint
    Evaluate(EvaluateArgs),

    /// Predict the most likely tokens for every [MASK] id
    FillMask(FillMaskArgs),
}

/// LayerNorm placement, as accepted on the command line
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum NormArg {
    /// LN(x + sublayer(x)), the original BERT layout
    Post,
    /// x + sublayer(LN(x)), more stable for deep stacks
    Pre,
}

impl From<NormArg> for NormPlacement {
    fn from(arg: NormArg) -> Self {
        match arg {
            NormArg::Post => NormPlacement::PostNorm,
            NormArg::Pre  => NormPlacement::PreNorm,
        }
    }
}

/// All arguments for the `pretrain` command.
#[derive(Args, Debug)]
pub struct PretrainArgs {
    /// JSONL file with one pre-tokenised example per line
    #[arg(long)]
    pub data: String,

    /// Directory for checkpoints, configs and metrics.csv
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    // ── Model ──

    #[arg(long, default_value_t = 30522)]
    pub vocab_size: usize,

    #[arg(long, default_value_t = 256)]
    pub hidden_size: usize,

    /// hidden_size must be divisible by num_heads
    #[arg(long, default_value_t = 4)]
    pub num_heads: usize,

    #[arg(long, default_value_t = 4)]
    pub num_layers: usize,

    #[arg(long, default_value_t = 1024)]
    pub feed_forward_size: usize,

    /// Longest sequence the model accepts; longer examples are truncated
    #[arg(long, default_value_t = 128)]
    pub max_position_count: usize,

    /// Number of segment ids; 0 disables segment embeddings
    #[arg(long, default_value_t = 2)]
    pub type_vocab_size: usize,

    #[arg(long, default_value_t = 0.1)]
    pub dropout: f64,

    #[arg(long, default_value_t = 0.1)]
    pub attention_dropout: f64,

    #[arg(long, value_enum, default_value_t = NormArg::Post)]
    pub norm: NormArg,

    /// Give the masked-LM head its own output matrix
    #[arg(long)]
    pub untie_embeddings: bool,

    /// Drop learned position embeddings
    #[arg(long)]
    pub no_position_embeddings: bool,

    /// Train the masked-LM objective only
    #[arg(long)]
    pub no_next_sentence: bool,

    // ── Training ──

    #[arg(long, default_value_t = 16)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 3)]
    pub epochs: usize,

    /// Peak learning rate, reached at the end of warmup
    #[arg(long, default_value_t = 1e-4)]
    pub lr: f64,

    /// Fraction of all steps spent warming up
    #[arg(long, default_value_t = 0.1)]
    pub warmup_fraction: f64,

    #[arg(long, default_value_t = 0.01)]
    pub weight_decay: f64,

    /// Gradient-norm clip threshold; 0 disables clipping
    #[arg(long, default_value_t = 1.0)]
    pub max_grad_norm: f64,

    #[arg(long, default_value_t = 1.0)]
    pub mlm_weight: f64,

    #[arg(long, default_value_t = 1.0)]
    pub nsp_weight: f64,

    #[arg(long, default_value_t = 0.9)]
    pub train_fraction: f64,

    #[arg(long, default_value_t = 1)]
    pub num_workers: usize,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    // ── Masking ──

    #[arg(long, default_value_t = 0.15)]
    pub mask_prob: f64,

    #[arg(long, default_value_t = 20)]
    pub max_predictions: usize,
}

/// The boundary between Layer 1 and Layer 2: the application
/// layer never sees clap types.
impl From<PretrainArgs> for PretrainConfig {
    fn from(a: PretrainArgs) -> Self {
        PretrainConfig {
            data_path:               a.data,
            checkpoint_dir:          a.checkpoint_dir,
            vocab_size:              a.vocab_size,
            hidden_size:             a.hidden_size,
            num_heads:               a.num_heads,
            num_layers:              a.num_layers,
            feed_forward_size:       a.feed_forward_size,
            max_position_count:      a.max_position_count,
            type_vocab_size:         a.type_vocab_size,
            dropout_rate:            a.dropout,
            attention_dropout_rate:  a.attention_dropout,
            norm_placement:          a.norm.into(),
            tie_word_embeddings:     !a.untie_embeddings,
            use_position_embeddings: !a.no_position_embeddings,
            next_sentence_head:      !a.no_next_sentence,
            batch_size:              a.batch_size,
            epochs:                  a.epochs,
            lr:                      a.lr,
            warmup_fraction:         a.warmup_fraction,
            weight_decay:            a.weight_decay,
            max_grad_norm:           (a.max_grad_norm > 0.0).then_some(a.max_grad_norm),
            mlm_weight:              a.mlm_weight,
            nsp_weight:              a.nsp_weight,
            train_fraction:          a.train_fraction,
            num_workers:             a.num_workers,
            seed:                    a.seed,
            mask_prob:               a.mask_prob,
            max_predictions:         a.max_predictions,
        }
    }
}

/// All arguments for the `evaluate` command
#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// JSONL file of held-out examples
    #[arg(long)]
    pub data: String,

    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    #[arg(long, default_value_t = 16)]
    pub batch_size: usize,
}

/// All arguments for the `fill-mask` command
#[derive(Args, Debug)]
pub struct FillMaskArgs {
    /// Space- or comma-separated token ids, e.g. "101 2023 103 102"
    #[arg(long)]
    pub ids: String,

    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    #[arg(long, default_value_t = 5)]
    pub top_k: usize,
}

impl FillMaskArgs {
    pub fn token_ids(&self) -> Result<Vec<u32>> {
        parse_ids(&self.ids)
    }
}

fn parse_ids(raw: &str) -> Result<Vec<u32>> {
    raw.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<u32>().with_context(|| format!("'{s}' is not a token id")))
        .collect()
}
