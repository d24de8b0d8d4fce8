// ============================================================
// Layer 5 - Training Loop
// ============================================================
// Fits a compiled model on two batch sequences.
//
// One epoch:
//   1. take `steps_per_epoch` batches from the training sequence;
//      forward, cross-entropy, backward and one Adam step each
//   2. take `validation_steps` batches from the test sequence and
//      evaluate them with model.valid() (no autodiff, no updates)
//   3. print one progress line and record the epoch in the History
//
// Both sequences are endless, so the step counts decide where an
// epoch ends. When left unset they default to one full pass.
//
//   - model.valid() returns the model on B::InnerBackend, so the
//     validation batches are unwrapped with batch.inner()
//   - loss and accuracy are averaged per sample, not per batch,
//     so a short remainder batch does not weigh as much as a full one

use anyhow::{bail, Context, Result};
use burn::{
    module::AutodiffModule,
    optim::{GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use std::time::Instant;

use crate::data::flow::BatchSequence;
use crate::infra::metrics::EpochMetrics;
use crate::ml::model::{
    correct_predictions, sparse_categorical_crossentropy, CompiledModel, ImageClassifier,
};

/// How long to train and how much of each sequence to consume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FitOptions {
    /// Informational only: the batch size belongs to the sequence.
    pub batch_size: Option<usize>,
    pub epochs: usize,
    /// Training batches per epoch; defaults to one pass.
    pub steps_per_epoch: Option<usize>,
    /// Validation batches per epoch; defaults to one pass.
    pub validation_steps: Option<usize>,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            batch_size: None,
            epochs: 1,
            steps_per_epoch: None,
            validation_steps: None,
        }
    }
}

impl FitOptions {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_steps_per_epoch(mut self, steps: usize) -> Self {
        self.steps_per_epoch = Some(steps);
        self
    }

    pub fn with_validation_steps(mut self, steps: usize) -> Self {
        self.validation_steps = Some(steps);
        self
    }
}

/// Running sums for one phase of an epoch.
#[derive(Debug, Default)]
struct Tally {
    loss_sum: f64,
    correct: usize,
    seen: usize,
}

impl Tally {
    fn add(&mut self, batch_loss: f64, correct: usize, batch_len: usize) {
        self.loss_sum += batch_loss * batch_len as f64;
        self.correct += correct;
        self.seen += batch_len;
    }

    fn loss(&self) -> f64 {
        if self.seen > 0 {
            self.loss_sum / self.seen as f64
        } else {
            f64::NAN
        }
    }

    fn accuracy(&self) -> f64 {
        if self.seen > 0 {
            self.correct as f64 / self.seen as f64
        } else {
            0.0
        }
    }
}

/// Train `compiled` for `options.epochs` epochs and hand it back with
/// updated parameters and one History entry per epoch.
pub fn train_model<B, M, O, T, V>(
    mut compiled: CompiledModel<B, M, O>,
    train_data: &mut T,
    test_data: &mut V,
    options: &FitOptions,
) -> Result<CompiledModel<B, M, O>>
where
    B: AutodiffBackend,
    M: ImageClassifier<B> + AutodiffModule<B>,
    M::InnerModule: ImageClassifier<B::InnerBackend>,
    O: Optimizer<M, B>,
    T: BatchSequence<B>,
    V: BatchSequence<B>,
{
    if options.epochs == 0 {
        bail!("epochs must be at least 1");
    }

    let steps = options
        .steps_per_epoch
        .unwrap_or_else(|| train_data.batches_per_epoch());
    let validation_steps = options
        .validation_steps
        .unwrap_or_else(|| test_data.batches_per_epoch());

    if steps == 0 {
        bail!("steps_per_epoch is 0: the training data yields no batches");
    }
    if validation_steps == 0 {
        bail!("validation_steps is 0: the validation data yields no batches");
    }

    if let Some(requested) = options.batch_size {
        if requested != train_data.batch_size() {
            tracing::warn!(
                "Ignoring batch_size={}: the training data already batches by {}",
                requested,
                train_data.batch_size()
            );
        }
    }

    let lr = compiled.learning_rate();
    tracing::info!(
        "Training for {} epochs: {} steps, {} validation steps, lr={}",
        options.epochs,
        steps,
        validation_steps,
        lr
    );

    for epoch in 1..=options.epochs {
        let started = Instant::now();

        // ── Training phase ────────────────────────────────────────────────────
        let mut train = Tally::default();
        for step in 1..=steps {
            let batch = train_data.next_batch().with_context(|| {
                format!("Cannot read training batch {step}/{steps} of epoch {epoch}")
            })?;
            let batch_len = batch.len();

            let logits = compiled.model.forward_logits(batch.images);
            let correct = correct_predictions(logits.clone().detach(), batch.targets.clone());
            let loss = sparse_categorical_crossentropy(logits, batch.targets);
            train.add(loss.clone().into_scalar().elem::<f64>(), correct, batch_len);

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &compiled.model);
            compiled.model = compiled.optim.step(lr, compiled.model, grads);
        }

        // ── Validation phase ──────────────────────────────────────────────────
        let model_valid = compiled.model.valid();
        let mut valid = Tally::default();
        for step in 1..=validation_steps {
            let batch = test_data
                .next_batch()
                .with_context(|| {
                    format!("Cannot read validation batch {step}/{validation_steps} of epoch {epoch}")
                })?
                .inner();
            let batch_len = batch.len();

            let logits = model_valid.forward_logits(batch.images);
            let correct = correct_predictions(logits.clone(), batch.targets.clone());
            let loss = sparse_categorical_crossentropy(logits, batch.targets);
            valid.add(loss.into_scalar().elem::<f64>(), correct, batch_len);
        }

        let metrics = EpochMetrics {
            epoch,
            loss: train.loss(),
            acc: train.accuracy(),
            val_loss: valid.loss(),
            val_acc: valid.accuracy(),
            steps,
            validation_steps,
        };

        let elapsed = started.elapsed().as_secs_f64();
        println!("Epoch {}/{}", epoch, options.epochs);
        println!(
            "{steps}/{steps} - {:.0}s - loss: {:.4} - acc: {:.4} - val_loss: {:.4} - val_acc: {:.4}",
            elapsed, metrics.loss, metrics.acc, metrics.val_loss, metrics.val_acc,
        );
        tracing::debug!("Epoch {} took {:.2}s ({} samples)", epoch, elapsed, train.seen);

        compiled.history.push(metrics);
    }

    tracing::info!("Training complete!");
    Ok(compiled)
}
