// ============================================================
// Layer 1 - CLI / Presentation Layer
// ============================================================
// Entry point for all user interaction. Arguments are parsed
// with clap; all work is delegated to Layer 2 (application).
//
//   1. `train`   - trains a classifier on an image directory
//   2. `predict` - loads a checkpoint and classifies an image

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, PredictArgs, TrainArgs};

#[derive(Parser, Debug)]
#[command(
    name = "fruit-classifier",
    version = "0.1.0",
    about = "Train a CNN image classifier on a directory of labelled images, then classify new images."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Match on the subcommand and dispatch to the correct use case.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args) => run_train(args),
            Commands::Predict(args) => run_predict(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!("Starting training on images in: {}", args.train_dir);

    let use_case = TrainUseCase::new(args.into());
    let history = use_case.execute()?;

    if let Some(best) = history.best() {
        tracing::info!(
            "Lowest val_loss {:.4} at epoch {} of {}",
            best.val_loss,
            best.epoch,
            history.len()
        );
    }
    if let Some(last) = history.last() {
        println!(
            "Training complete. Final val_acc: {:.4}. Checkpoint saved.",
            last.val_acc
        );
    }
    Ok(())
}

fn run_predict(args: PredictArgs) -> Result<()> {
    use crate::application::predict_use_case::PredictUseCase;

    let use_case = PredictUseCase::new(&args.checkpoint_dir, args.backend.into());
    let top = use_case.classify(&args.image, args.top_k)?;

    println!("\n{}", args.image.display());
    for (rank, (name, p)) in top.iter().enumerate() {
        println!("  {}. {:<20} {:.2}%", rank + 1, name, p * 100.0);
    }
    Ok(())
}
