//! Expected Improvement over the best observed label.
//!
//! The ensemble's joint estimate gives a mean and a variance per candidate.
//! With `improvement = mean - best - xi` and `z = improvement / scale`:
//!
//! `EI = improvement * Phi(z) + scale * phi(z)`
//!
//! where `scale` is the joint variance after the configured [`VarianceGuard`].
//! Everything stays on the tensor graph so EI is differentiable with respect
//! to the candidate embedding.

use std::f64::consts::{PI, SQRT_2};

use burn::prelude::*;
use ensemble::{reduce, EnsemblePredictor, JointEstimate, VarianceGuard};

use crate::AcquisitionError;

/// Configuration for Expected Improvement.
#[derive(Config, Debug)]
pub struct AcquisitionConfig {
    /// Exploration margin subtracted from the improvement.
    #[config(default = 0.1)]
    pub xi: f64,
    /// How the joint variance is made usable as the EI scale.
    #[config(default = "VarianceGuard::Floor { min: 1e-6 }")]
    pub variance_guard: VarianceGuard,
    /// Fail on non-positive joint variance instead of guarding it.
    #[config(default = false)]
    pub strict_variance: bool,
}

/// Largest observed label, ignoring NaNs.
pub fn best_observed(labels: &[f32]) -> Result<f64, AcquisitionError> {
    if labels.is_empty() {
        return Err(AcquisitionError::NoObservations);
    }
    Ok(labels.iter().copied().fold(f32::NEG_INFINITY, f32::max) as f64)
}

/// Standard normal CDF via `erf`.
pub fn normal_cdf<B: Backend, const D: usize>(z: Tensor<B, D>) -> Tensor<B, D> {
    (z / SQRT_2).erf().add_scalar(1.0).mul_scalar(0.5)
}

/// Standard normal PDF.
pub fn normal_pdf<B: Backend, const D: usize>(z: Tensor<B, D>) -> Tensor<B, D> {
    z.powf_scalar(2.0)
        .mul_scalar(-0.5)
        .exp()
        .mul_scalar(1.0 / (2.0 * PI).sqrt())
}

/// EI for each entry of an already reduced joint estimate. Returns `(batch,)`.
pub fn expected_improvement_from_estimate<B: Backend>(
    joint: JointEstimate<B>,
    best: f64,
    config: &AcquisitionConfig,
) -> Result<Tensor<B, 1>, AcquisitionError> {
    if let Err(err) = joint.ensure_nondegenerate(f64::MIN_POSITIVE) {
        if config.strict_variance {
            return Err(err.into());
        }
        tracing::warn!(%err, guard = ?config.variance_guard, "Degenerate joint variance in acquisition");
    }

    let scale = config.variance_guard.apply(joint.variance);
    let improvement = joint.mean.sub_scalar(best + config.xi);
    let z = improvement.clone() / scale.clone();

    Ok(improvement * normal_cdf(z.clone()) + scale * normal_pdf(z))
}

/// EI of `candidates` (shape `(batch, d_input)`) against a known best value.
pub fn expected_improvement_over<B: Backend, P: EnsemblePredictor<B>>(
    model: &P,
    candidates: Tensor<B, 2>,
    best: f64,
    config: &AcquisitionConfig,
) -> Result<Tensor<B, 1>, AcquisitionError> {
    let output = model.predict(candidates)?;
    expected_improvement_from_estimate(reduce(output), best, config)
}

/// EI of `candidates` against the best of `observed_labels`.
///
/// Returns `(batch,)`; higher is better.
pub fn expected_improvement<B: Backend, P: EnsemblePredictor<B>>(
    model: &P,
    candidates: Tensor<B, 2>,
    observed_labels: &[f32],
    config: &AcquisitionConfig,
) -> Result<Tensor<B, 1>, AcquisitionError> {
    let best = best_observed(observed_labels)?;
    expected_improvement_over(model, candidates, best, config)
}
