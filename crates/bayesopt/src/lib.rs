//! Bayesian-optimization proposals in embedding space.
//!
//! Scores candidate embeddings with Expected Improvement under a trained
//! ensemble's joint Gaussian estimate and ascends that score with Adam to
//! propose a new embedding. Also loads the TOML configuration shared by the
//! training and proposal stages.

pub mod acquisition;
pub mod config;
pub mod optimizer;

use ensemble::EnsembleError;

pub use acquisition::{best_observed, expected_improvement, AcquisitionConfig};
pub use optimizer::{
    optimize_embedding, optimize_embedding_from, EmbeddingOptimizerConfig, OptimizedEmbedding,
};

/// Errors that can occur while scoring or optimizing candidate embeddings.
#[derive(Debug, thiserror::Error)]
pub enum AcquisitionError {
    /// Error from the ensemble predictor or reducer.
    #[error("Ensemble error: {0}")]
    Ensemble(#[from] EnsembleError),
    /// No observed labels to improve upon.
    #[error("No observed labels; expected improvement needs a best value")]
    NoObservations,
}
