//! Moment-matching reduction of per-member Gaussians into a joint estimate.

use burn::prelude::*;

use crate::error::EnsembleError;

/// How a variance-like quantity is made safe before it is used as a divisor
/// or scale.
#[derive(Config, Debug, PartialEq)]
pub enum VarianceGuard {
    /// Use the value as-is.
    Raw,
    /// Use its absolute value.
    Abs,
    /// Use its absolute value, clamped below at `min`.
    Floor { min: f64 },
}

impl Default for VarianceGuard {
    fn default() -> Self {
        VarianceGuard::Floor { min: 1e-6 }
    }
}

impl VarianceGuard {
    pub fn apply<B: Backend, const D: usize>(&self, variance: Tensor<B, D>) -> Tensor<B, D> {
        match self {
            VarianceGuard::Raw => variance,
            VarianceGuard::Abs => variance.abs(),
            VarianceGuard::Floor { min } => variance.abs().clamp_min(*min),
        }
    }
}

/// Joint Gaussian estimate per input: `mean` and `variance`, both `(batch,)`.
///
/// The variance comes from a subtraction of second moments and may be
/// slightly negative or zero through cancellation.
#[derive(Debug, Clone)]
pub struct JointEstimate<B: Backend> {
    pub mean: Tensor<B, 1>,
    pub variance: Tensor<B, 1>,
}

impl<B: Backend> JointEstimate<B> {
    /// Fail with `DegenerateVariance` at the first entry whose variance is
    /// not finite or is below `min`.
    pub fn ensure_nondegenerate(&self, min: f64) -> Result<(), EnsembleError> {
        let values: Vec<f32> = self
            .variance
            .clone()
            .into_data()
            .convert::<f32>()
            .to_vec()
            .unwrap_or_default();
        for (index, &v) in values.iter().enumerate() {
            let variance = v as f64;
            if !variance.is_finite() || variance < min {
                return Err(EnsembleError::DegenerateVariance { index, variance });
            }
        }
        Ok(())
    }
}

/// Collapse `(model_number, batch, 2)` member outputs into a joint estimate.
///
/// - `mean = E[mu_i]`
/// - `variance = E[spread_i + mu_i^2] - mean^2`
pub fn reduce<B: Backend>(output: Tensor<B, 3>) -> JointEstimate<B> {
    let means: Tensor<B, 2> = output.clone().narrow(2, 0, 1).squeeze::<2>(2);
    let spreads: Tensor<B, 2> = output.narrow(2, 1, 1).squeeze::<2>(2);

    let mean: Tensor<B, 1> = means.clone().mean_dim(0).squeeze::<1>(0);
    let second_moment: Tensor<B, 1> =
        (spreads + means.powf_scalar(2.0)).mean_dim(0).squeeze::<1>(0);
    let variance = second_moment - mean.clone().powf_scalar(2.0);

    JointEstimate { mean, variance }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;
    use burn::tensor::TensorData;

    type TestBackend = NdArray<f32>;

    fn to_vec(t: Tensor<TestBackend, 1>) -> Vec<f32> {
        t.into_data().to_vec().unwrap()
    }

    #[test]
    fn test_single_member_is_identity() {
        let device = Default::default();
        // model_number = 1, batch = 3
        let output = Tensor::<TestBackend, 3>::from_data(
            TensorData::from([[[0.5_f32, 0.25], [-1.0, 2.0], [3.0, 0.125]]]),
            &device,
        );
        let joint = reduce(output);
        let mean = to_vec(joint.mean);
        let variance = to_vec(joint.variance);
        assert_eq!(mean, vec![0.5, -1.0, 3.0]);
        for (v, expected) in variance.iter().zip([0.25_f32, 2.0, 0.125]) {
            assert!((v - expected).abs() < 1e-6, "variance {v} != {expected}");
        }
    }

    #[test]
    fn test_equal_means_give_average_spread() {
        let device = Default::default();
        // Three members, one example, identical means.
        let output = Tensor::<TestBackend, 3>::from_data(
            TensorData::from([[[1.0_f32, 0.2]], [[1.0, 0.4]], [[1.0, 0.9]]]),
            &device,
        );
        let joint = reduce(output);
        let mean = to_vec(joint.mean);
        let variance = to_vec(joint.variance);
        assert!((mean[0] - 1.0).abs() < 1e-6);
        assert!((variance[0] - 0.5).abs() < 1e-5, "got {}", variance[0]);
        assert!(variance[0] >= 0.0);
    }

    #[test]
    fn test_law_of_total_variance() {
        let device = Default::default();
        // Two members: N(0, 1) and N(2, 3).
        // mean = 1, E[var] = 2, Var[mean] = 1 → variance = 3.
        let output = Tensor::<TestBackend, 3>::from_data(
            TensorData::from([[[0.0_f32, 1.0]], [[2.0, 3.0]]]),
            &device,
        );
        let joint = reduce(output);
        assert!((to_vec(joint.mean)[0] - 1.0).abs() < 1e-6);
        assert!((to_vec(joint.variance)[0] - 3.0).abs() < 1e-5);
    }

    #[test]
    fn test_negative_spread_can_give_negative_variance() {
        let device = Default::default();
        let output = Tensor::<TestBackend, 3>::from_data(
            TensorData::from([[[1.0_f32, -0.5]], [[1.0, -0.5]]]),
            &device,
        );
        let joint = reduce(output);
        assert!(to_vec(joint.variance.clone())[0] < 0.0);
        match joint.ensure_nondegenerate(1e-6) {
            Err(EnsembleError::DegenerateVariance { index, variance }) => {
                assert_eq!(index, 0);
                assert!((variance + 0.5).abs() < 1e-5);
            }
            other => panic!("Expected DegenerateVariance, got {other:?}"),
        }
    }

    #[test]
    fn test_ensure_nondegenerate_ok() {
        let device = Default::default();
        let joint = JointEstimate::<TestBackend> {
            mean: Tensor::from_data(TensorData::from([0.0_f32, 1.0]), &device),
            variance: Tensor::from_data(TensorData::from([0.5_f32, 2.0]), &device),
        };
        assert!(joint.ensure_nondegenerate(1e-6).is_ok());

        let nan = JointEstimate::<TestBackend> {
            mean: Tensor::from_data(TensorData::from([0.0_f32, 1.0]), &device),
            variance: Tensor::from_data(TensorData::from([0.5_f32, f32::NAN]), &device),
        };
        assert!(matches!(
            nan.ensure_nondegenerate(1e-6),
            Err(EnsembleError::DegenerateVariance { index: 1, .. })
        ));
    }

    #[test]
    fn test_variance_guard() {
        let device = Default::default();
        let v = Tensor::<TestBackend, 1>::from_data(TensorData::from([-0.5_f32, 0.0, 2.0]), &device);

        assert_eq!(to_vec(VarianceGuard::Raw.apply(v.clone())), vec![-0.5, 0.0, 2.0]);
        assert_eq!(to_vec(VarianceGuard::Abs.apply(v.clone())), vec![0.5, 0.0, 2.0]);
        assert_eq!(
            to_vec(VarianceGuard::Floor { min: 0.1 }.apply(v)),
            vec![0.5, 0.1, 2.0]
        );
        assert_eq!(VarianceGuard::default(), VarianceGuard::Floor { min: 1e-6 });
    }
}
