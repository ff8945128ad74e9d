// ============================================================
// Layer 2: PretrainUseCase
// ============================================================
// Orchestrates a pretraining run in order:
//
//   Step 1: Load JSONL examples         (Layer 4 - data)
//   Step 2: Validate / truncate         (Layer 4 - data)
//   Step 3: Split train/validation      (Layer 4 - data)
//   Step 4: Apply masked-LM corruption  (Layer 4 - data)
//   Step 5: Build datasets              (Layer 4 - data)
//   Step 6: Save configs                (Layer 6 - infra)
//   Step 7: Run training loop           (Layer 5 - ml)
//
// Reference: Burn Book §5 (Training)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::data::{
    dataset::PretrainDataset,
    loader::JsonlLoader,
    masking::{Masker, MaskingConfig},
    preprocessor::Preprocessor,
    splitter::split_train_val,
};
use crate::domain::traits::ExampleSource;
use crate::infra::{checkpoint::CheckpointManager, metrics::MetricsLogger};
use crate::ml::config::{BertConfig, NormPlacement};
use crate::ml::model::LossWeights;
use crate::ml::trainer::run_pretraining;

// ─── Pretraining Configuration ───────────────────────────────────────────────
// Model shape and training hyper-parameters for one run.
// Saved as pretrain_config.json next to the checkpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PretrainConfig {
    pub data_path:      String,
    pub checkpoint_dir: String,

    // ── Model ──
    pub vocab_size:              usize,
    pub hidden_size:             usize,
    pub num_heads:               usize,
    pub num_layers:              usize,
    pub feed_forward_size:       usize,
    pub max_position_count:      usize,
    pub type_vocab_size:         usize,
    pub dropout_rate:            f64,
    pub attention_dropout_rate:  f64,
    pub norm_placement:          NormPlacement,
    pub tie_word_embeddings:     bool,
    pub use_position_embeddings: bool,
    pub next_sentence_head:      bool,

    // ── Training ──
    pub batch_size:      usize,
    pub epochs:          usize,
    pub lr:              f64,
    pub warmup_fraction: f64,
    pub weight_decay:    f64,
    /// None disables clipping
    pub max_grad_norm:   Option<f64>,
    pub mlm_weight:      f64,
    pub nsp_weight:      f64,
    pub train_fraction:  f64,
    pub num_workers:     usize,
    pub seed:            u64,

    // ── Masking ──
    pub mask_prob:       f64,
    pub max_predictions: usize,
}

impl Default for PretrainConfig {
    fn default() -> Self {
        Self {
            data_path:               "data/pretrain.jsonl".to_string(),
            checkpoint_dir:          "checkpoints".to_string(),
            vocab_size:              30522,
            hidden_size:             256,
            num_heads:               4,
            num_layers:              4,
            feed_forward_size:       1024,
            max_position_count:      128,
            type_vocab_size:         2,
            dropout_rate:            0.1,
            attention_dropout_rate:  0.1,
            norm_placement:          NormPlacement::PostNorm,
            tie_word_embeddings:     true,
            use_position_embeddings: true,
            next_sentence_head:      true,
            batch_size:              16,
            epochs:                  3,
            lr:                      1e-4,
            warmup_fraction:         0.1,
            weight_decay:            0.01,
            max_grad_norm:           Some(1.0),
            mlm_weight:              1.0,
            nsp_weight:              1.0,
            train_fraction:          0.9,
            num_workers:             1,
            seed:                    42,
            mask_prob:               0.15,
            max_predictions:         20,
        }
    }
}

impl PretrainConfig {
    pub fn model_config(&self) -> BertConfig {
        BertConfig::new(self.vocab_size)
            .with_hidden_size(self.hidden_size)
            .with_num_heads(self.num_heads)
            .with_num_layers(self.num_layers)
            .with_feed_forward_size(self.feed_forward_size)
            .with_max_position_count(self.max_position_count)
            .with_type_vocab_size(self.type_vocab_size)
            .with_dropout_rate(self.dropout_rate)
            .with_attention_dropout_rate(self.attention_dropout_rate)
            .with_norm_placement(self.norm_placement)
            .with_tie_word_embeddings(self.tie_word_embeddings)
            .with_use_position_embeddings(self.use_position_embeddings)
            .with_next_sentence_head(self.next_sentence_head)
    }

    pub fn masking_config(&self) -> MaskingConfig {
        MaskingConfig::new(self.vocab_size)
            .with_mask_prob(self.mask_prob)
            .with_max_predictions(self.max_predictions)
            .with_seed(self.seed)
    }

    pub fn loss_weights(&self) -> LossWeights {
        LossWeights { masked_lm: self.mlm_weight, next_sentence: self.nsp_weight }
    }

    /// Rejects settings that would only fail once training has started.
    pub fn validate(&self) -> Result<()> {
        self.model_config().validate().context("Invalid model configuration")?;
        self.masking_config().validate().context("Invalid masking configuration")?;
        if self.batch_size == 0 {
            anyhow::bail!("batch_size must be at least 1");
        }
        if self.epochs == 0 {
            anyhow::bail!("epochs must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.train_fraction) {
            anyhow::bail!("train_fraction must lie in [0, 1], got {}", self.train_fraction);
        }
        if !(0.0..=1.0).contains(&self.warmup_fraction) {
            anyhow::bail!("warmup_fraction must lie in [0, 1], got {}", self.warmup_fraction);
        }
        Ok(())
    }
}

// ─── PretrainUseCase ─────────────────────────────────────────────────────────
pub struct PretrainUseCase {
    config: PretrainConfig,
}

impl PretrainUseCase {
    pub fn new(config: PretrainConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<()> {
        let cfg = &self.config;
        cfg.validate()?;
        let model_cfg    = cfg.model_config();
        let preprocessor = Preprocessor::new(cfg.max_position_count, cfg.vocab_size, cfg.type_vocab_size)?;
        let mut masker   = Masker::new(cfg.masking_config())?;

        // ── Step 1: Load examples ─────────────────────────────────────────────
        let raw = JsonlLoader::new(&cfg.data_path).load_all()?;

        // ── Step 2: Validate and truncate ─────────────────────────────────────
        let examples = preprocessor.prepare_all(raw);
        if examples.is_empty() {
            anyhow::bail!("No usable examples in '{}'", cfg.data_path);
        }

        // ── Step 3: Train / validation split ──────────────────────────────────
        let (train, val) = split_train_val(examples, cfg.train_fraction, cfg.seed);
        tracing::info!("Split: {} train, {} validation", train.len(), val.len());

        // ── Step 4: Masked-LM corruption ──────────────────────────────────────
        let train_dataset = PretrainDataset::new(masker.mask_all(&train));
        let val_dataset   = PretrainDataset::new(masker.mask_all(&val));
        tracing::info!(
            "{} training prediction targets, {} validation",
            train_dataset.prediction_count(),
            val_dataset.prediction_count()
        );

        // ── Step 5: Save configs so evaluation can rebuild the model ─────────
        let ckpt_manager = CheckpointManager::new(&cfg.checkpoint_dir)?;
        ckpt_manager.save_model_config(&model_cfg)?;
        ckpt_manager.save_pretrain_config(cfg)?;
        let metrics = MetricsLogger::new(&cfg.checkpoint_dir)?;

        // ── Step 6: Training loop (Layer 5) ───────────────────────────────────
        run_pretraining(cfg, &model_cfg, train_dataset, val_dataset, &ckpt_manager, &metrics)?;
        Ok(())
    }
}
