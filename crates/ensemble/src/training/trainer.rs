//! Ensemble training loop: per-example Adam updates on the adversarial NLL.
//!
//! Each step replicates one shuffled example into a small batch of identical
//! copies, takes one optimizer step, then records the post-update training
//! loss and the mean validation loss.

use std::time::Instant;

use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use indicatif::{ProgressBar, ProgressStyle};

use crate::error::EnsembleError;
use crate::key::PrngKey;
use crate::model::bridge::{embeddings_to_tensor, tensor_to_f64, tile_embedding, tile_label};
use crate::model::ensemble::{EnsembleBlock, EnsembleConfig};
use crate::training::data::LabeledBatch;
use crate::training::loss::{adversarial_loss, AdversarialLossConfig};
use crate::training::metrics::LossHistory;

/// Configuration for ensemble training.
#[derive(Config, Debug)]
pub struct TrainingConfig {
    /// Learning rate for Adam.
    #[config(default = 1e-2)]
    pub lr: f64,
    /// Adam first-moment decay.
    #[config(default = 0.8)]
    pub beta_1: f64,
    /// Adam second-moment decay.
    #[config(default = 0.9)]
    pub beta_2: f64,
    /// Adam epsilon, added after the square root.
    #[config(default = 1e-4)]
    pub epsilon: f64,
    /// Number of passes over the shuffled training set.
    #[config(default = 3)]
    pub epochs: usize,
    /// Copies of each example per training batch.
    #[config(default = 5)]
    pub tile: usize,
    /// Adversarial NLL settings.
    #[config(default = "AdversarialLossConfig::new()")]
    pub loss: AdversarialLossConfig,
    /// Steps between debug log lines. 0 disables.
    #[config(default = 0)]
    pub log_interval: usize,
    /// Stop after this many optimizer steps, if set.
    pub max_steps: Option<usize>,
}

/// Trained ensemble with its loss histories.
#[derive(Debug)]
pub struct TrainingOutcome<B: AutodiffBackend> {
    pub model: EnsembleBlock<B>,
    pub history: LossHistory,
}

/// Mean adversarial loss over a validation set, each example tiled like a
/// training step.
pub fn validation_loss<B: AutodiffBackend>(
    model: &EnsembleBlock<B>,
    val_set: &LabeledBatch,
    config: &TrainingConfig,
    device: &B::Device,
) -> Result<f64, EnsembleError> {
    if val_set.is_empty() {
        return Err(EnsembleError::EmptyDataset("validation"));
    }
    check_tile(config.tile)?;
    let mut total = 0.0;
    for (input, label) in val_set.iter() {
        let inputs = tile_embedding::<B>(input, config.tile, device);
        let labels = tile_label::<B>(label, config.tile, device);
        total += tensor_to_f64(adversarial_loss(model, inputs, labels, &config.loss)?);
    }
    Ok(total / val_set.len() as f64)
}

fn check_tile(tile: usize) -> Result<(), EnsembleError> {
    if tile == 0 {
        return Err(EnsembleError::InvalidConfig("tile must be > 0".to_string()));
    }
    Ok(())
}

/// Run the ensemble training loop.
///
/// Parameters are initialized from a key split off `key`, with the input
/// dimension inferred from the training inputs. Every epoch reshuffles the
/// training pairs with a fresh key.
///
/// # Arguments
/// - `config`: optimizer and loop hyperparameters
/// - `ensemble`: ensemble architecture
/// - `key`: root pseudo-random key
/// - `train_set`: training inputs and labels
/// - `val_set`: validation inputs and labels
/// - `device`: burn device for tensor operations
///
/// # Returns
/// The trained ensemble and one training/validation loss entry per step.
///
/// # Errors
/// `EmptyDataset` for an empty training or validation set, `ShapeMismatch`
/// when the validation dimension differs from the training dimension,
/// `InvalidConfig` for `tile == 0` or an architecture with no members or a
/// zero hidden width.
/// Non-finite losses are logged but not treated as errors.
pub fn train<B: AutodiffBackend>(
    config: &TrainingConfig,
    ensemble: &EnsembleConfig,
    key: PrngKey,
    train_set: &LabeledBatch,
    val_set: &LabeledBatch,
    device: &B::Device,
) -> Result<TrainingOutcome<B>, EnsembleError> {
    if train_set.is_empty() {
        return Err(EnsembleError::EmptyDataset("training"));
    }
    if val_set.is_empty() {
        return Err(EnsembleError::EmptyDataset("validation"));
    }
    check_tile(config.tile)?;
    ensemble.check()?;
    let sample = embeddings_to_tensor::<B>(&train_set.inputs, device)?;
    let [_, d_input] = sample.dims();
    if let Some(val_dim) = val_set.dim() {
        if val_dim != d_input {
            return Err(EnsembleError::ShapeMismatch {
                expected: d_input,
                actual: val_dim,
            });
        }
    }

    let (init_key, mut key) = key.split();
    let mut model = ensemble.init(init_key, &sample, device)?;

    let mut optimizer = AdamConfig::new()
        .with_beta_1(config.beta_1 as f32)
        .with_beta_2(config.beta_2 as f32)
        .with_epsilon(config.epsilon as f32)
        .init();

    let steps_per_epoch = train_set.len();
    let planned_steps = config.epochs * steps_per_epoch;
    let total_steps = config
        .max_steps
        .map_or(planned_steps, |max| max.min(planned_steps));

    tracing::info!(
        d_input,
        model_number = ensemble.model_number,
        hidden_shape = ?ensemble.hidden_shape,
        train_examples = train_set.len(),
        val_examples = val_set.len(),
        epochs = config.epochs,
        total_steps,
        lr = config.lr,
        adversarial_epsilon = config.loss.epsilon,
        "Starting ensemble training"
    );

    let pb = ProgressBar::new(total_steps as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );

    let mut history = LossHistory::new(steps_per_epoch);
    let mut step = 0usize;
    let mut warned_non_finite = false;
    let train_start = Instant::now();

    'epochs: for epoch in 0..config.epochs {
        let (shuffle_key, next_key) = key.split();
        key = next_key;
        let shuffled = train_set.shuffled(shuffle_key)?;

        for (input, label) in shuffled.iter() {
            if step >= total_steps {
                break 'epochs;
            }

            let inputs = tile_embedding::<B>(input, config.tile, device);
            let labels = tile_label::<B>(label, config.tile, device);

            // Backward + optimizer step
            let loss = adversarial_loss(&model, inputs.clone(), labels.clone(), &config.loss)?;
            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optimizer.step(config.lr, model, grads);

            let train_loss = tensor_to_f64(adversarial_loss(&model, inputs, labels, &config.loss)?);
            let val_loss = validation_loss(&model, val_set, config, device)?;

            if !warned_non_finite && !(train_loss.is_finite() && val_loss.is_finite()) {
                tracing::warn!(
                    step,
                    epoch,
                    train_loss,
                    val_loss,
                    "Non-finite loss; it will propagate through later updates"
                );
                warned_non_finite = true;
            }

            history.push(train_loss, val_loss);
            step += 1;
            pb.set_message(format!("loss={train_loss:.4} val={val_loss:.4}"));
            pb.inc(1);

            if config.log_interval > 0 && step % config.log_interval == 0 {
                tracing::debug!(step, epoch, train_loss, val_loss, "Training step");
            }
        }

        let epoch_means = history.epoch_train_means();
        let val_means = history.epoch_validation_means();
        tracing::info!(
            epoch,
            train_loss = %format!("{:.4}", epoch_means.get(epoch).copied().unwrap_or(f64::NAN)),
            val_loss = %format!("{:.4}", val_means.get(epoch).copied().unwrap_or(f64::NAN)),
            "Epoch finished"
        );
    }

    pb.finish_and_clear();

    let warnings = history.health_check();
    if !warnings.is_empty() {
        tracing::warn!("Health check warnings: {:?}", warnings);
    }
    tracing::info!(
        steps = step,
        elapsed_secs = %format!("{:.1}", train_start.elapsed().as_secs_f64()),
        "Training loop finished"
    );

    Ok(TrainingOutcome { model, history })
}
