//! Deep-ensemble regression for sequence-embedding property prediction.
//!
//! Provides an ensemble of small MLPs that predicts a Gaussian (mean, spread)
//! per member, a moment-matching reducer that collapses the members into a
//! joint estimate, and an adversarially regularized NLL training loop driven
//! by Adam.

pub mod error;
pub mod key;
pub mod model;
pub mod training;

pub use error::EnsembleError;
pub use key::PrngKey;
pub use model::ensemble::{EnsembleBlock, EnsembleConfig, EnsemblePredictor};
pub use model::reduce::{reduce, JointEstimate, VarianceGuard};
pub use training::data::{shuffle_in_unison, LabeledBatch};
pub use training::trainer::{train, TrainingConfig, TrainingOutcome};
