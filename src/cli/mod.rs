// ============================================================
// Layer 1: CLI / Presentation Layer
// ============================================================
// Parses arguments with clap and routes each subcommand to its
// use case in Layer 2. Printing results happens here and only
// here.
//
//   1. `pretrain`  - trains the encoder, checkpoints every epoch
//   2. `evaluate`  - reports metrics for the latest checkpoint
//   3. `fill-mask` - top-k predictions for [MASK] positions

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, EvaluateArgs, FillMaskArgs, PretrainArgs};

#[derive(Parser, Debug)]
#[command(
    name = "minbert",
    version,
    about = "Pretrain a BERT encoder (masked-LM + next-sentence) on pre-tokenised data."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Dispatch to the matching use case.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Pretrain(args) => run_pretrain(args),
            Commands::Evaluate(args) => run_evaluate(args),
            Commands::FillMask(args) => run_fill_mask(args),
        }
    }
}

fn run_pretrain(args: PretrainArgs) -> Result<()> {
    use crate::application::pretrain_use_case::PretrainUseCase;

    tracing::info!("Starting pretraining on '{}'", args.data);
    let checkpoint_dir = args.checkpoint_dir.clone();
    PretrainUseCase::new(args.into()).execute()?;

    println!("Pretraining complete. Checkpoints in '{checkpoint_dir}'.");
    Ok(())
}

fn run_evaluate(args: EvaluateArgs) -> Result<()> {
    use crate::application::evaluate_use_case::EvaluateUseCase;

    let use_case = EvaluateUseCase::new(&args.checkpoint_dir)?;
    let metrics  = use_case.evaluate(&args.data, args.batch_size)?;

    println!("loss          {:.4}", metrics.mean_loss());
    println!("mlm_loss      {:.4}", metrics.mean_mlm_loss());
    println!("mlm_accuracy  {:.2}%", metrics.mlm_accuracy() * 100.0);
    match metrics.nsp_accuracy() {
        Some(acc) => println!("nsp_accuracy  {:.2}%", acc * 100.0),
        None      => println!("nsp_accuracy  n/a (no next-sentence labels)"),
    }
    Ok(())
}

fn run_fill_mask(args: FillMaskArgs) -> Result<()> {
    use crate::application::evaluate_use_case::EvaluateUseCase;

    let ids      = args.token_ids()?;
    let use_case = EvaluateUseCase::new(&args.checkpoint_dir)?;

    for prediction in use_case.fill_mask(&ids, args.top_k)? {
        let ranked: Vec<String> = prediction
            .candidates
            .iter()
            .map(|(id, p)| format!("{id} ({p:.3})"))
            .collect();
        println!("position {:>3}: {}", prediction.position, ranked.join(", "));
    }
    Ok(())
}
