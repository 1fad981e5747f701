// ============================================================
// Layer 5 - Training Loop
// ============================================================
// Epochs × phases with best-snapshot selection:
//
//   for epoch in 1..=num_epochs
//     train    → autodiff model, backward + optimizer step per batch,
//                scheduler steps once when the phase ends
//     validate → model.valid() on the inner backend (BatchNorm uses
//                running stats, dropout off, no graph is recorded)
//     both     → loss / acc normalised by the phase sample count,
//                emitted to the metrics sink
//     validate → strictly better accuracy replaces the best snapshot
//
// After the last epoch the best snapshot is loaded back into the
// model and written, together with the optimizer state, to the
// checkpoint store.
//
// Burn has no accumulated gradients to clear: each backward() call
// returns a fresh gradient set that is consumed by the step.

use std::time::Instant;

use anyhow::Result;
use burn::{
    module::AutodiffModule,
    nn::loss::CrossEntropyLossConfig,
    optim::{GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use indicatif::{ProgressBar, ProgressStyle};

use crate::data::source::BatchSource;
use crate::domain::{
    best_state::BestTracker,
    phase::{EpochMetrics, EpochReport, Phase, PhaseTotals},
    traits::MetricsSink,
};
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::{classifier::ImageClassifier, scheduler::StepLr};

/// Batch sources of both phases.
pub struct PhaseSources<'a, B: AutodiffBackend> {
    pub train: &'a dyn BatchSource<B>,
    pub val:   &'a dyn BatchSource<B::InnerBackend>,
}

impl<B: AutodiffBackend> PhaseSources<'_, B> {
    fn size(&self, phase: Phase) -> usize {
        match phase {
            Phase::Train    => self.train.num_samples(),
            Phase::Validate => self.val.num_samples(),
        }
    }
}

/// What a finished run hands back.
#[derive(Debug)]
pub struct TrainOutcome<M> {
    /// Holds the parameters of the best validation epoch
    pub model:         M,
    pub best_accuracy: f64,
    /// 0 when no epoch beat the initial parameters
    pub best_epoch:    usize,
    pub history:       Vec<EpochReport>,
}

/// Fine-tune `model` and persist the best validation state.
pub fn train_model<B, M, O>(
    model:       M,
    mut optim:   O,
    sources:     PhaseSources<'_, B>,
    scheduler:   &mut StepLr,
    num_epochs:  usize,
    metrics:     &mut dyn MetricsSink,
    checkpoints: &CheckpointManager,
) -> Result<TrainOutcome<M>>
where
    B: AutodiffBackend,
    M: ImageClassifier<B> + AutodiffModule<B>,
    M::InnerModule: ImageClassifier<B::InnerBackend>,
    O: Optimizer<M, B>,
{
    let since = Instant::now();

    // Records are immutable tensor handles: later optimizer steps
    // produce new tensors and never touch a stored snapshot.
    let mut best    = BestTracker::new(model.clone().into_record());
    let mut model   = model;
    let mut history = Vec::with_capacity(num_epochs);

    for epoch in 1..=num_epochs {
        println!("Epoch {}/{}", epoch, num_epochs);
        println!("{}", "-".repeat(10));

        let mut train_metrics = None;

        for phase in Phase::ALL {
            let bar = phase_bar(phase, epoch, num_epochs, &sources);

            let totals = match phase {
                Phase::Train => {
                    let lr = scheduler.current_lr();
                    let (trained, totals) =
                        run_train_phase(model, &mut optim, sources.train, lr, &bar)?;
                    model = trained;
                    scheduler.step();
                    totals
                }
                Phase::Validate => run_val_phase(&model.valid(), sources.val, &bar)?,
            };
            bar.finish_and_clear();

            let epoch_metrics = EpochMetrics::from_totals(epoch, phase, &totals, sources.size(phase))?;
            metrics.add_scalar(phase.loss_tag(), epoch_metrics.loss, epoch)?;
            metrics.add_scalar(phase.acc_tag(), epoch_metrics.accuracy, epoch)?;
            println!(
                "{} Loss: {:.4} Acc: {:.4}",
                epoch_metrics.phase, epoch_metrics.loss, epoch_metrics.accuracy
            );

            match phase {
                Phase::Train => train_metrics = Some(epoch_metrics),
                Phase::Validate => {
                    let is_best = best.observe(epoch, epoch_metrics.accuracy, || {
                        model.clone().into_record()
                    });
                    if is_best {
                        tracing::info!(
                            "Epoch {}: new best val acc {:.4}",
                            epoch,
                            epoch_metrics.accuracy
                        );
                    }
                    if let Some(train) = train_metrics.take() {
                        history.push(EpochReport { train, val: epoch_metrics, is_best });
                    }
                }
            }
        }
        println!();
    }

    let elapsed = since.elapsed().as_secs_f64();
    println!(
        "Training complete in {:.0}m {:.0}s",
        (elapsed / 60.0).floor(),
        elapsed % 60.0
    );
    println!("Best val Acc: {:.4}", best.accuracy());

    let best_accuracy = best.accuracy();
    let best_epoch    = best.epoch();
    let model = model.load_record(best.into_snapshot().state);

    checkpoints.save_checkpoint::<B, M, O>(&model, &optim)?;
    metrics.flush()?;

    Ok(TrainOutcome { model, best_accuracy, best_epoch, history })
}

fn run_train_phase<B, M, O>(
    mut model: M,
    optim:     &mut O,
    source:    &dyn BatchSource<B>,
    lr:        f64,
    bar:       &ProgressBar,
) -> Result<(M, PhaseTotals)>
where
    B: AutodiffBackend,
    M: ImageClassifier<B> + AutodiffModule<B>,
    O: Optimizer<M, B>,
{
    let mut totals = PhaseTotals::new();

    for batch in source.batches() {
        let batch = batch?;
        let (batch_size, image_size) = (batch.len(), batch.image_size());

        let logits  = model.forward(batch.images);
        let loss    = cross_entropy(logits.clone(), batch.targets.clone());
        let correct = count_correct(logits, batch.targets);
        let batch_loss = loss.clone().into_scalar().elem::<f64>();

        let grads = GradientsParams::from_grads(loss.backward(), &model);
        model = optim.step(lr, model, grads).after_train_step();

        totals.add_batch(batch_loss, batch_size, correct);
        update_bar(bar, &totals, batch_size, image_size);
    }

    Ok((model, totals))
}

fn run_val_phase<B, M>(model: &M, source: &dyn BatchSource<B>, bar: &ProgressBar) -> Result<PhaseTotals>
where
    B: Backend,
    M: ImageClassifier<B>,
{
    let mut totals = PhaseTotals::new();

    for batch in source.batches() {
        let batch = batch?;
        let (batch_size, image_size) = (batch.len(), batch.image_size());

        let logits  = model.forward(batch.images);
        let loss    = cross_entropy(logits.clone(), batch.targets.clone());
        let correct = count_correct(logits, batch.targets);

        totals.add_batch(loss.into_scalar().elem::<f64>(), batch_size, correct);
        update_bar(bar, &totals, batch_size, image_size);
    }

    Ok(totals)
}

/// Batch-mean cross entropy over raw logits
fn cross_entropy<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> Tensor<B, 1> {
    CrossEntropyLossConfig::new()
        .init(&logits.device())
        .forward(logits, targets)
}

/// Samples whose arg-max logit equals the label
fn count_correct<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    // argmax(1) keeps the reduced dim: [N, 1] → [N]
    let predicted = logits.argmax(1).flatten::<1>(0, 1);
    predicted
        .equal(targets)
        .int()
        .sum()
        .into_scalar()
        .elem::<i64>() as usize
}

fn phase_bar<B: AutodiffBackend>(
    phase:      Phase,
    epoch:      usize,
    num_epochs: usize,
    sources:    &PhaseSources<'_, B>,
) -> ProgressBar {
    let len = match phase {
        Phase::Train    => sources.train.num_batches(),
        Phase::Validate => sources.val.num_batches(),
    };

    let bar = ProgressBar::new(len as u64);
    bar.set_style(
        ProgressStyle::with_template(
            "  {prefix} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-"),
    );
    bar.set_prefix(format!("Epoch: {}/{} {:>5}", epoch, num_epochs, phase));
    bar
}

fn update_bar(bar: &ProgressBar, totals: &PhaseTotals, batch_size: usize, image_size: usize) {
    bar.set_message(format!(
        "loss={:.4} bs={} img={}",
        totals.mean_loss(),
        batch_size,
        image_size
    ));
    bar.inc(1);
}
