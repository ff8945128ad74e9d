// ============================================================
// Layer 5: Pretraining Loop
// ============================================================
// Train + validation loop using Burn's DataLoader and AdamW.
//
// Per step:
//   forward → weighted MLM + NSP loss → backward
//   → global-norm clip (ml::clip) → AdamW
//   The optimizer consumes the model and returns the updated one,
//   so gradients are dropped as soon as the step completes.
//
// Per epoch:
//   model.valid() → inner backend, Eval mode, no autodiff graph
//   metrics CSV row + checkpoint
//
// Reference: Burn Book §5, Loshchilov & Hutter (2019) AdamW

use anyhow::{Context, Result};
use burn::{
    data::{dataloader::DataLoaderBuilder, dataset::Dataset},
    module::AutodiffModule,
    optim::{AdamWConfig, GradientsParams, Optimizer},
    prelude::*,
};

use crate::application::pretrain_use_case::PretrainConfig;
use crate::data::{batcher::PretrainBatcher, dataset::PretrainDataset};
use crate::infra::checkpoint::CheckpointManager;
use crate::infra::metrics::{EpochMetrics, MetricsLogger};
use crate::ml::backend::{default_device, TrainBackend};
use crate::ml::clip::clip_grad_norm;
use crate::ml::config::BertConfig;
use crate::ml::evaluator::evaluate;
use crate::ml::mode::Mode;
use crate::ml::model::BertForPreTraining;
use crate::ml::schedule::LinearWarmupDecay;

pub fn run_pretraining(
    cfg:           &PretrainConfig,
    model_cfg:     &BertConfig,
    train_dataset: PretrainDataset,
    val_dataset:   PretrainDataset,
    ckpt_manager:  &CheckpointManager,
    metrics:       &MetricsLogger,
) -> Result<BertForPreTraining<TrainBackend>> {
    let device = default_device();
    tracing::info!("Using device: {:?}", device);

    // ── Build model ───────────────────────────────────────────────────────────
    let mut model: BertForPreTraining<TrainBackend> = model_cfg.init(&device)?;
    tracing::info!(
        "Model ready: {} layers, hidden={}, heads={}, {} parameters",
        model_cfg.num_layers,
        model_cfg.hidden_size,
        model_cfg.num_heads,
        model.num_params(),
    );

    // ── AdamW optimiser ───────────────────────────────────────────────────────
    // m = β1*m + (1-β1)*g
    // v = β2*v + (1-β2)*g²
    // θ = θ - lr * (m / (√v + ε) + λθ)   (decay decoupled from the gradient)
    let mut optim = AdamWConfig::new()
        .with_epsilon(1e-6)
        .with_weight_decay(cfg.weight_decay as f32)
        .init();

    // ── Schedule ──────────────────────────────────────────────────────────────
    let steps_per_epoch = train_dataset.len().div_ceil(cfg.batch_size.max(1));
    let total_steps     = steps_per_epoch * cfg.epochs;
    let warmup_steps    = (total_steps as f64 * cfg.warmup_fraction).round() as usize;
    let schedule        = LinearWarmupDecay::new(cfg.lr, warmup_steps, total_steps);
    tracing::info!("{} steps ({} warmup), peak lr {}", total_steps, warmup_steps, cfg.lr);

    // ── Data loaders ──────────────────────────────────────────────────────────
    let batcher      = PretrainBatcher::new(model_cfg.type_vocab_size > 0);
    let train_loader = DataLoaderBuilder::new(batcher.clone())
        .batch_size(cfg.batch_size)
        .shuffle(cfg.seed)
        .num_workers(cfg.num_workers)
        .build(train_dataset);

    // Validation runs on the inner backend: no autodiff overhead
    let val_loader = DataLoaderBuilder::new(batcher)
        .batch_size(cfg.batch_size)
        .num_workers(cfg.num_workers)
        .build(val_dataset);

    let weights  = cfg.loss_weights();
    let mut step = 0usize;

    // ── Epoch loop ────────────────────────────────────────────────────────────
    for epoch in 1..=cfg.epochs {

        // ── Training phase ────────────────────────────────────────────────────
        let mut train_loss_sum = 0.0f64;
        let mut train_batches  = 0usize;
        let mut lr             = schedule.lr_at(step);

        for batch in train_loader.iter() {
            lr = schedule.lr_at(step);
            let output = model.forward_loss(batch.model_input()?, batch.targets(), weights, Mode::Train)?;

            let loss_val: f64 = output.loss.clone().into_scalar().elem::<f64>();
            if !loss_val.is_finite() {
                anyhow::bail!("Loss diverged to {loss_val} at step {step}");
            }
            train_loss_sum += loss_val;
            train_batches  += 1;

            let mut grads = GradientsParams::from_grads(output.loss.backward(), &model);
            if let Some(max_norm) = cfg.max_grad_norm {
                let grad_norm = clip_grad_norm(&model, &mut grads, max_norm);
                tracing::debug!("step {} grad_norm={:.4} (max {})", step, grad_norm, max_norm);
            }
            model = optim.step(lr, model, grads);
            step += 1;

            tracing::debug!("step {} lr={:.3e} loss={:.4}", step, lr, loss_val);
        }

        let avg_train_loss = if train_batches > 0 {
            train_loss_sum / train_batches as f64
        } else { f64::NAN };

        // ── Validation phase ──────────────────────────────────────────────────
        let model_valid = model.valid();
        let val = evaluate(&model_valid, val_loader.iter(), weights)?;

        println!(
            "Epoch {:>3}/{} | train_loss={:.4} | val_loss={:.4} | mlm_acc={:.1}% | nsp_acc={} | lr={:.2e}",
            epoch,
            cfg.epochs,
            avg_train_loss,
            val.mean_loss(),
            val.mlm_accuracy() * 100.0,
            val.nsp_accuracy().map_or_else(|| "n/a".to_string(), |a| format!("{:.1}%", a * 100.0)),
            lr,
        );

        metrics.log(&EpochMetrics::new(
            epoch,
            avg_train_loss,
            val.mean_loss(),
            val.mlm_accuracy(),
            val.nsp_accuracy(),
            lr,
        ))?;

        ckpt_manager
            .save_model(&model, epoch)
            .with_context(|| format!("Checkpoint for epoch {epoch} failed"))?;
        tracing::info!("Checkpoint saved for epoch {}", epoch);
    }

    tracing::info!("Pretraining complete after {} steps", step);
    Ok(model)
}
