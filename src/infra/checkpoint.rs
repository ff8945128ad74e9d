// ============================================================
// Layer 6: Checkpoint Manager
// ============================================================
// Saves and restores model weights with Burn's named MessagePack
// recorder at full precision, so a reload reproduces every
// forward output bit for bit.
//
// File layout:
//   checkpoints/
//     model_epoch_1.mpk       ← weights after epoch 1
//     model_epoch_2.mpk
//     ...
//     latest_epoch.json       ← number of the latest epoch
//     model_config.json       ← BertConfig, to rebuild the model
//     pretrain_config.json    ← hyper-parameters of the run
//     metrics.csv             ← written by MetricsLogger
//
// The weights file alone cannot rebuild a model: the record
// only fills a model whose architecture already matches, hence
// model_config.json.
//
// Reference: Burn Book §5 (Records and Checkpointing)

use anyhow::{Context, Result};
use burn::{
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder},
};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::application::pretrain_use_case::PretrainConfig;
use crate::ml::config::BertConfig;
use crate::ml::model::BertForPreTraining;

const LATEST_EPOCH:    &str = "latest_epoch.json";
const MODEL_CONFIG:    &str = "model_config.json";
const PRETRAIN_CONFIG: &str = "pretrain_config.json";

type WeightRecorder = NamedMpkFileRecorder<FullPrecisionSettings>;

/// Manages saving and loading of model checkpoints.
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Creates `dir` (and parents) if it does not exist yet.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create checkpoint directory '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    // ── Weights ───────────────────────────────────────────────────────────────

    /// Writes `model_epoch_{epoch}.mpk` and moves the latest-epoch pointer.
    pub fn save_model<B: Backend>(&self, model: &BertForPreTraining<B>, epoch: usize) -> Result<()> {
        // The recorder appends the extension itself
        let path = self.dir.join(format!("model_epoch_{epoch}"));
        WeightRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save checkpoint to '{}'", path.display()))?;

        write_json(&self.dir.join(LATEST_EPOCH), &epoch)?;
        tracing::debug!("Saved checkpoint: epoch {}", epoch);
        Ok(())
    }

    /// Loads the weights of `epoch` into `model`.
    pub fn load_model<B: Backend>(
        &self,
        model:  BertForPreTraining<B>,
        epoch:  usize,
        device: &B::Device,
    ) -> Result<BertForPreTraining<B>> {
        let path = self.dir.join(format!("model_epoch_{epoch}"));
        tracing::info!("Loading checkpoint from epoch {}", epoch);

        let record = WeightRecorder::new()
            .load(path.clone(), device)
            .with_context(|| {
                format!("Cannot load checkpoint '{}'. Has the model been trained?", path.display())
            })?;
        Ok(model.load_record(record))
    }

    /// Rebuilds the saved architecture and fills it with the latest weights.
    pub fn load_latest<B: Backend>(&self, device: &B::Device) -> Result<BertForPreTraining<B>> {
        let cfg   = self.load_model_config()?;
        let model = cfg.init::<B>(device).context("Saved model configuration is invalid")?;
        self.load_model(model, self.latest_epoch()?, device)
    }

    pub fn latest_epoch(&self) -> Result<usize> {
        read_json(&self.dir.join(LATEST_EPOCH))
            .context("No checkpoint found. Run 'pretrain' first.")
    }

    // ── Configs ───────────────────────────────────────────────────────────────

    pub fn save_model_config(&self, cfg: &BertConfig) -> Result<()> {
        write_json(&self.dir.join(MODEL_CONFIG), cfg)
    }

    pub fn load_model_config(&self) -> Result<BertConfig> {
        read_json(&self.dir.join(MODEL_CONFIG))
    }

    pub fn save_pretrain_config(&self, cfg: &PretrainConfig) -> Result<()> {
        write_json(&self.dir.join(PRETRAIN_CONFIG), cfg)
    }

    pub fn load_pretrain_config(&self) -> Result<PretrainConfig> {
        read_json(&self.dir.join(PRETRAIN_CONFIG))
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("Cannot write '{}'", path.display()))?;
    tracing::debug!("Wrote '{}'", path.display());
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Cannot read '{}'", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("Malformed JSON in '{}'", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::config::NormPlacement;
    use crate::ml::mode::Mode;
    use crate::ml::model::BertInput;
    use crate::ml::test_utils::{ids, tiny_config, to_vec, TestBackend};

    fn temp_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("minbert_ckpt_{}_{name}", std::process::id()))
    }

    #[test]
    fn test_save_then_load_latest_reproduces_outputs() {
        let dir    = temp_dir("roundtrip");
        let device = Default::default();
        let cfg    = tiny_config(NormPlacement::PostNorm).with_tie_word_embeddings(false);
        let model  = cfg.init::<TestBackend>(&device).unwrap();

        let ckpt = CheckpointManager::new(&dir).unwrap();
        ckpt.save_model_config(&cfg).unwrap();
        ckpt.save_model(&model, 1).unwrap();
        ckpt.save_model(&model, 3).unwrap();
        assert_eq!(ckpt.latest_epoch().unwrap(), 3);

        let restored = ckpt.load_latest::<TestBackend>(&device).unwrap();
        let run = |m: &BertForPreTraining<TestBackend>| {
            let out = m.encode(BertInput::new(ids(&[&[1, 2, 3]], &device)), Mode::Eval).unwrap();
            to_vec(m.masked_lm_logits(out.hidden_states))
        };
        assert_eq!(run(&restored), run(&model));

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_missing_checkpoint_is_an_error() {
        let dir  = temp_dir("empty");
        let ckpt = CheckpointManager::new(&dir).unwrap();
        assert!(ckpt.latest_epoch().is_err());
        assert!(ckpt.load_latest::<TestBackend>(&Default::default()).is_err());
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_pretrain_config_round_trip() {
        let dir  = temp_dir("config");
        let ckpt = CheckpointManager::new(&dir).unwrap();
        let cfg  = PretrainConfig { epochs: 7, ..PretrainConfig::default() };
        ckpt.save_pretrain_config(&cfg).unwrap();
        assert_eq!(ckpt.load_pretrain_config().unwrap().epochs, 7);
        fs::remove_dir_all(&dir).ok();
    }
}
