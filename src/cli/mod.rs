// ============================================================
// Layer 1 - CLI / Presentation Layer
// ============================================================
// Parses the command line with clap and routes to a use case.
//
//   1. `train`   - fine-tune on an ImageFolder dataset
//   2. `predict` - classify one image with the best checkpoint
//
// Results are printed here; the use cases only return them.

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, PredictArgs, TrainArgs};

use crate::application::{
    predict_use_case::PredictUseCase,
    train_use_case::{TrainConfig, TrainUseCase},
};

#[derive(Parser, Debug)]
#[command(
    name = "image-finetune",
    version,
    about = "Fine-tune ResNet-50 or EfficientNet on an image folder, then classify images."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)   => run_train(args),
            Commands::Predict(args) => run_predict(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    tracing::info!("Starting training on dataset in: {}", args.root.display());

    let config  = TrainConfig::try_from(args)?;
    let summary = TrainUseCase::new(config).execute()?;

    println!("\nEpoch  train loss  train acc  val loss  val acc");
    for report in &summary.history {
        println!(
            "{:>5}  {:>10.4}  {:>9.4}  {:>8.4}  {:>7.4}{}",
            report.val.epoch,
            report.train.loss,
            report.train.accuracy,
            report.val.loss,
            report.val.accuracy,
            if report.is_best { "  *" } else { "" }
        );
    }
    println!(

        "Best val Acc {:.4} at epoch {} ({} classes: {})",
        summary.best_accuracy,
        summary.best_epoch,
        summary.class_names.len(),
        summary.class_names.join(", ")
    );
    Ok(())
}

fn run_predict(args: PredictArgs) -> Result<()> {
    let image = args.image.clone();
    let prediction = PredictUseCase::new(args.into()).execute()?;

    println!("\n{}", image.display());
    println!(
        "predicted: {} [label {}] ({:.2}%)",
        prediction.class_name,
        prediction.class_index,
        prediction.confidence * 100.0
    );
    for (rank, class) in prediction.top_k.iter().enumerate() {
        println!("  {}. {:<20} {:.4}", rank + 1, class.name, class.probability);
    }
    Ok(())
}
