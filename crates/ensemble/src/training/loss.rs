//! Gaussian negative log-likelihood and its fast-gradient-sign adversarial
//! extension.
//!
//! Member outputs are read as `[mean, spread]`; the spread is used directly
//! as a variance after passing through a [`VarianceGuard`].

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

use crate::error::EnsembleError;
use crate::model::ensemble::EnsemblePredictor;
use crate::model::reduce::VarianceGuard;

/// Configuration for the adversarial NLL loss.
#[derive(Config, Debug)]
pub struct AdversarialLossConfig {
    /// Magnitude of the fast-gradient-sign input perturbation.
    #[config(default = 1e-5)]
    pub epsilon: f64,
    /// Guard applied to member spreads before they divide the residual.
    #[config(default = "VarianceGuard::Floor { min: 1e-6 }")]
    pub variance_guard: VarianceGuard,
}

/// Per-example Gaussian NLL summed over ensemble members.
///
/// `0.5 * log(s) + 0.5 * (label - mean)^2 / s` with `s` the guarded spread.
///
/// # Arguments
/// - `output`: shape `(model_number, batch, 2)`
/// - `labels`: shape `(batch,)`
///
/// # Returns
/// Tensor of shape `(batch,)`.
pub fn gaussian_nll<B: Backend>(
    output: Tensor<B, 3>,
    labels: Tensor<B, 1>,
    guard: &VarianceGuard,
) -> Tensor<B, 1> {
    let means: Tensor<B, 2> = output.clone().narrow(2, 0, 1).squeeze::<2>(2);
    let spreads = guard.apply(output.narrow(2, 1, 1).squeeze::<2>(2));

    let residual = labels.unsqueeze_dim::<2>(0) - means; // broadcast over members
    let nll = spreads.clone().log() * 0.5 + residual.powf_scalar(2.0) * 0.5 / spreads;
    nll.sum_dim(0).squeeze::<1>(0)
}

/// Scalar deep-ensemble loss: the member-summed NLL averaged over the batch.
///
/// For a batch of identical tiled copies this equals the per-example value.
pub fn deep_ensemble_loss<B: Backend, P: EnsemblePredictor<B>>(
    model: &P,
    inputs: Tensor<B, 2>,
    labels: Tensor<B, 1>,
    guard: &VarianceGuard,
) -> Result<Tensor<B, 1>, EnsembleError> {
    check_lengths(&inputs, &labels)?;
    let output = model.predict(inputs)?;
    Ok(gaussian_nll(output, labels, guard).mean())
}

/// Fast-gradient-sign perturbation: `inputs + epsilon * sign(d loss / d inputs)`.
///
/// The gradient is taken on a detached copy of the inputs, so the sign enters
/// the returned tensor as a constant.
pub fn fgsm_perturb<B: AutodiffBackend, P: EnsemblePredictor<B>>(
    model: &P,
    inputs: Tensor<B, 2>,
    labels: Tensor<B, 1>,
    config: &AdversarialLossConfig,
) -> Result<Tensor<B, 2>, EnsembleError> {
    let x = inputs.clone().detach().require_grad();
    let loss = deep_ensemble_loss(model, x.clone(), labels.detach(), &config.variance_guard)?;
    let grads = loss.backward();

    let direction = match x.grad(&grads) {
        Some(grad) => grad.sign(),
        None => Tensor::zeros(inputs.dims(), &inputs.device().clone()),
    };
    Ok(inputs + Tensor::from_inner(direction) * config.epsilon)
}

/// Adversarially regularized loss: NLL on the clean batch plus NLL on its
/// fast-gradient-sign perturbation.
///
/// # Returns
/// Scalar loss tensor of shape `(1,)`, differentiable with respect to the
/// model parameters.
pub fn adversarial_loss<B: AutodiffBackend, P: EnsemblePredictor<B>>(
    model: &P,
    inputs: Tensor<B, 2>,
    labels: Tensor<B, 1>,
    config: &AdversarialLossConfig,
) -> Result<Tensor<B, 1>, EnsembleError> {
    let perturbed = fgsm_perturb(model, inputs.clone(), labels.clone(), config)?;
    let clean = deep_ensemble_loss(model, inputs, labels.clone(), &config.variance_guard)?;
    let adversarial = deep_ensemble_loss(model, perturbed, labels, &config.variance_guard)?;
    Ok(clean + adversarial)
}

fn check_lengths<B: Backend>(inputs: &Tensor<B, 2>, labels: &Tensor<B, 1>) -> Result<(), EnsembleError> {
    let [n_inputs, _] = inputs.dims();
    let [n_labels] = labels.dims();
    if n_inputs != n_labels {
        return Err(EnsembleError::LengthMismatch {
            inputs: n_inputs,
            labels: n_labels,
        });
    }
    Ok(())
}
