// ============================================================
// Layer 2: Evaluate / Fill-Mask Use Case
// ============================================================
// Loads the latest checkpoint once, then serves two requests:
//
//   evaluate   - mask a held-out JSONL file the same way training
//                did and report loss / MLM accuracy / NSP accuracy
//
//   fill_mask  - top-k predictions for every [MASK] id in one
//                pre-tokenised sequence

use anyhow::{Context, Result};
use burn::data::dataloader::DataLoaderBuilder;

use crate::application::pretrain_use_case::PretrainConfig;
use crate::data::{
    batcher::PretrainBatcher,
    dataset::PretrainDataset,
    loader::JsonlLoader,
    masking::{Masker, MaskingConfig},
    preprocessor::Preprocessor,
};
use crate::domain::traits::ExampleSource;
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::backend::{default_device, Device, InnerBackend};
use crate::ml::config::BertConfig;
use crate::ml::evaluator::{evaluate, fill_mask, MaskPrediction, PretrainMetrics};
use crate::ml::model::{BertForPreTraining, LossWeights};

pub struct EvaluateUseCase {
    model:     BertForPreTraining<InnerBackend>,
    model_cfg: BertConfig,
    /// Settings of the run that produced the checkpoint, if saved
    run_cfg:   Option<PretrainConfig>,
    device:    Device,
}

impl EvaluateUseCase {
    pub fn new(checkpoint_dir: &str) -> Result<Self> {
        let device    = default_device();
        let ckpt      = CheckpointManager::new(checkpoint_dir)?;
        let model_cfg = ckpt.load_model_config()?;
        let model     = ckpt.load_latest::<InnerBackend>(&device)?;
        let run_cfg   = match ckpt.load_pretrain_config() {
            Ok(cfg) => Some(cfg),
            Err(e) => {
                tracing::warn!("No pretraining config found, using defaults: {e:#}");
                None
            }
        };
        tracing::info!("Model loaded from '{}'", checkpoint_dir);
        Ok(Self { model, model_cfg, run_cfg, device })
    }

    pub fn evaluate(&self, data_path: &str, batch_size: usize) -> Result<PretrainMetrics> {
        if batch_size == 0 {
            anyhow::bail!("batch_size must be at least 1");
        }
        let cfg = &self.model_cfg;
        let preprocessor = Preprocessor::new(cfg.max_position_count, cfg.vocab_size, cfg.type_vocab_size)?;

        let raw      = JsonlLoader::new(data_path).load_all()?;
        let examples = preprocessor.prepare_all(raw);
        if examples.is_empty() {
            anyhow::bail!("No usable examples in '{}'", data_path);
        }

        let masking = self
            .run_cfg
            .as_ref()
            .map(PretrainConfig::masking_config)
            .unwrap_or_else(|| MaskingConfig::new(cfg.vocab_size));
        let dataset = PretrainDataset::new(Masker::new(masking)?.mask_all(&examples));

        let loader = DataLoaderBuilder::new(PretrainBatcher::new(cfg.type_vocab_size > 0))
            .batch_size(batch_size)
            .num_workers(1)
            .build(dataset);

        let metrics = evaluate(&self.model, loader.iter(), self.loss_weights())
            .context("Evaluation failed")?;
        tracing::info!("Evaluated {} batches", metrics.batches);
        Ok(metrics)
    }

    pub fn fill_mask(&self, input_ids: &[u32], top_k: usize) -> Result<Vec<MaskPrediction>> {
        let predictions = fill_mask(&self.model, input_ids, top_k, &self.device)
            .context("Fill-mask inference failed")?;
        if predictions.is_empty() {
            tracing::warn!("Input contains no [MASK] token");
        }
        Ok(predictions)
    }

    fn loss_weights(&self) -> LossWeights {
        self.run_cfg.as_ref().map(PretrainConfig::loss_weights).unwrap_or_default()
    }
}
