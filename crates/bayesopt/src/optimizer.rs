//! Gradient ascent on Expected Improvement over a single candidate embedding.
//!
//! The candidate lives in a one-parameter module so burn's Adam can drive it
//! exactly as it drives model weights. The ensemble is frozen for the whole
//! run; only the embedding receives gradients.

use std::time::Instant;

use burn::module::{Module, Param};
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::TensorData;
use ensemble::model::bridge::{tensor_to_f64, tensor_to_vec};
use ensemble::{EnsembleError, EnsemblePredictor, PrngKey};

use crate::acquisition::{best_observed, expected_improvement_over, AcquisitionConfig};
use crate::AcquisitionError;

/// Configuration for embedding optimization.
#[derive(Config, Debug)]
pub struct EmbeddingOptimizerConfig {
    /// Candidate width. Defaults to the predictor's input dimension.
    pub embedding_dim: Option<usize>,
    /// Number of Adam updates.
    #[config(default = 50)]
    pub num_steps: usize,
    /// Adam learning rate.
    #[config(default = 1e-2)]
    pub lr: f64,
    #[config(default = 0.8)]
    pub beta_1: f64,
    #[config(default = 0.9)]
    pub beta_2: f64,
    #[config(default = 1e-5)]
    pub epsilon: f64,
    /// Seed for the initial embedding.
    #[config(default = 0)]
    pub seed: u64,
    /// Expected Improvement settings.
    #[config(default = "AcquisitionConfig::new()")]
    pub acquisition: AcquisitionConfig,
}

/// Result of [`optimize_embedding`].
#[derive(Debug, Clone)]
pub struct OptimizedEmbedding {
    /// Final candidate, length `embedding_dim`.
    pub embedding: Vec<f32>,
    /// EI of the candidate before each update.
    pub trace: Vec<f64>,
}

impl OptimizedEmbedding {
    /// EI at the last recorded step, if any step ran.
    pub fn last_acquisition(&self) -> Option<f64> {
        self.trace.last().copied()
    }
}

/// A single trainable embedding of shape `(1, dim)`.
#[derive(Module, Debug)]
pub struct Candidate<B: Backend> {
    embedding: Param<Tensor<B, 2>>,
}

impl<B: Backend> Candidate<B> {
    /// Standard-normal draw from `key`.
    pub fn from_key(key: PrngKey, dim: usize, device: &B::Device) -> Self {
        Self::from_values(key.standard_normal(dim), device)
    }

    pub fn from_values(values: Vec<f32>, device: &B::Device) -> Self {
        let dim = values.len();
        let tensor = Tensor::from_data(TensorData::new(values, [1, dim]), device);
        Self {
            embedding: Param::from_tensor(tensor),
        }
    }

    pub fn embedding(&self) -> Tensor<B, 2> {
        self.embedding.val()
    }

    pub fn to_vec(&self) -> Vec<f32> {
        tensor_to_vec(self.embedding())
    }
}

/// Propose a new embedding by ascending Expected Improvement.
///
/// Starts from a standard-normal draw seeded by `config.seed`, then runs
/// `config.num_steps` Adam updates minimizing `-EI` against the best of
/// `observed_labels`. The model's parameters are never updated.
pub fn optimize_embedding<B, P>(
    model: &P,
    observed_labels: &[f32],
    config: &EmbeddingOptimizerConfig,
    device: &B::Device,
) -> Result<OptimizedEmbedding, AcquisitionError>
where
    B: AutodiffBackend,
    P: EnsemblePredictor<B> + Module<B>,
{
    let d_input = model.d_input();
    let dim = config.embedding_dim.unwrap_or(d_input);
    if dim != d_input {
        return Err(EnsembleError::ShapeMismatch {
            expected: d_input,
            actual: dim,
        }
        .into());
    }
    let (init_key, _) = PrngKey::new(config.seed).split();
    optimize_embedding_from(model, observed_labels, init_key.standard_normal(dim), config, device)
}

/// Same as [`optimize_embedding`], starting from `initial` instead of a
/// seeded draw. `config.seed` and `config.embedding_dim` are ignored.
pub fn optimize_embedding_from<B, P>(
    model: &P,
    observed_labels: &[f32],
    initial: Vec<f32>,
    config: &EmbeddingOptimizerConfig,
    device: &B::Device,
) -> Result<OptimizedEmbedding, AcquisitionError>
where
    B: AutodiffBackend,
    P: EnsemblePredictor<B> + Module<B>,
{
    let best = best_observed(observed_labels)?;
    let dim = initial.len();
    if dim != model.d_input() {
        return Err(EnsembleError::ShapeMismatch {
            expected: model.d_input(),
            actual: dim,
        }
        .into());
    }

    let frozen = model.clone().no_grad();
    let mut candidate = Candidate::<B>::from_values(initial, device);

    let mut optimizer = AdamConfig::new()
        .with_beta_1(config.beta_1 as f32)
        .with_beta_2(config.beta_2 as f32)
        .with_epsilon(config.epsilon as f32)
        .init();

    tracing::info!(
        dim,
        steps = config.num_steps,
        lr = config.lr,
        best,
        xi = config.acquisition.xi,
        "Starting embedding optimization"
    );

    let start = Instant::now();
    let mut trace = Vec::with_capacity(config.num_steps);
    let mut warned_non_finite = false;

    for step in 0..config.num_steps {
        let ei = expected_improvement_over(&frozen, candidate.embedding(), best, &config.acquisition)?;
        let value = tensor_to_f64(ei.clone());
        if !value.is_finite() && !warned_non_finite {
            tracing::warn!(step, value, "Non-finite expected improvement");
            warned_non_finite = true;
        }
        trace.push(value);
        tracing::debug!(step, ei = value, "Embedding step");

        let objective = ei.neg();
        let grads = GradientsParams::from_grads(objective.backward(), &candidate);
        candidate = optimizer.step(config.lr, candidate, grads);
    }

    tracing::info!(
        steps = trace.len(),
        first_ei = trace.first().copied().unwrap_or(f64::NAN),
        last_ei = trace.last().copied().unwrap_or(f64::NAN),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Embedding optimization complete"
    );

    Ok(OptimizedEmbedding {
        embedding: candidate.to_vec(),
        trace,
    })
}
