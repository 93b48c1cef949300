//! Ensemble training pipeline: paired shuffling, the adversarial Gaussian
//! NLL, loss history with health checks, and the Adam training loop.

pub mod checkpoint;
pub mod data;
pub mod loss;
pub mod metrics;
pub mod trainer;
