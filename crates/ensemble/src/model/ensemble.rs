use burn::prelude::*;

use crate::error::EnsembleError;
use crate::key::PrngKey;
use crate::model::dense::{DenseLayer, DenseLayerConfig};

/// Outputs per member: `[mean, spread]`.
pub const N_OUTPUTS: usize = 2;

/// A model that maps a batch of embeddings to per-member Gaussian outputs.
///
/// `predict` takes `(batch, d_input)` and returns `(model_number, batch, 2)`
/// where the last axis holds `[mean, spread]`.
pub trait EnsemblePredictor<B: Backend> {
    fn predict(&self, inputs: Tensor<B, 2>) -> Result<Tensor<B, 3>, EnsembleError>;

    fn model_number(&self) -> usize;

    fn d_input(&self) -> usize;
}

/// Configuration for the EnsembleBlock.
///
/// Every member is an independent MLP with the same architecture:
///
/// ```text
/// (batch, d_input)
///   → Dense(d_input→h1) → ReLU → ... → Dense(hk→2)
///   → (batch, 2)
/// ```
///
/// With an empty `hidden_shape` each member is a single affine map.
#[derive(Config, Debug)]
pub struct EnsembleConfig {
    /// Hidden layer widths of each member.
    #[config(default = "Vec::new()")]
    pub hidden_shape: Vec<usize>,
    /// Number of ensemble members.
    #[config(default = 5)]
    pub model_number: usize,
}

/// One ensemble member: dense layers with ReLU between them.
#[derive(Module, Debug)]
pub struct Mlp<B: Backend> {
    layers: Vec<DenseLayer<B>>,
}

impl<B: Backend> Mlp<B> {
    /// Build a member from explicit layers. Layer dimensions must chain.
    pub fn from_layers(layers: Vec<DenseLayer<B>>) -> Result<Self, EnsembleError> {
        for pair in layers.windows(2) {
            if pair[0].d_output() != pair[1].d_input() {
                return Err(EnsembleError::ShapeMismatch {
                    expected: pair[0].d_output(),
                    actual: pair[1].d_input(),
                });
            }
        }
        Ok(Self { layers })
    }

    pub fn d_input(&self) -> usize {
        self.layers.first().map(|l| l.d_input()).unwrap_or(0)
    }

    pub fn d_output(&self) -> usize {
        self.layers.last().map(|l| l.d_output()).unwrap_or(0)
    }

    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let last = self.layers.len().saturating_sub(1);
        let mut x = input;
        for (i, layer) in self.layers.iter().enumerate() {
            x = layer.forward(x);
            if i < last {
                x = burn::tensor::activation::relu(x);
            }
        }
        x
    }
}

/// Ensemble of `model_number` independently parameterized MLPs.
///
/// Members share no weights; each sees the full input batch.
#[derive(Module, Debug)]
pub struct EnsembleBlock<B: Backend> {
    members: Vec<Mlp<B>>,
    d_input: usize,
}

impl EnsembleConfig {
    /// Initialize an EnsembleBlock, inferring the input dimension from a
    /// representative batch of shape `(batch, d_input)`.
    pub fn init<B: Backend>(
        &self,
        key: PrngKey,
        sample: &Tensor<B, 2>,
        device: &B::Device,
    ) -> Result<EnsembleBlock<B>, EnsembleError> {
        let [_, d_input] = sample.dims();
        self.init_with_input_dim(key, d_input, device)
    }

    /// Initialize an EnsembleBlock for inputs of dimension `d_input`.
    ///
    /// Each member and each layer draws from its own key split off `key`.
    ///
    /// # Errors
    /// `InvalidConfig` for zero members, a zero hidden width or a zero
    /// input dimension.
    pub fn init_with_input_dim<B: Backend>(
        &self,
        key: PrngKey,
        d_input: usize,
        device: &B::Device,
    ) -> Result<EnsembleBlock<B>, EnsembleError> {
        self.check()?;
        if d_input == 0 {
            return Err(EnsembleError::InvalidConfig(
                "input dimension must be > 0".to_string(),
            ));
        }

        let mut dims = Vec::with_capacity(self.hidden_shape.len() + 2);
        dims.push(d_input);
        dims.extend(self.hidden_shape.iter().copied());
        dims.push(N_OUTPUTS);

        let members = key
            .split_n(self.model_number)
            .into_iter()
            .map(|member_key| {
                let layer_keys = member_key.split_n(dims.len() - 1);
                let layers = dims
                    .windows(2)
                    .zip(layer_keys)
                    .map(|(pair, layer_key)| {
                        DenseLayerConfig::new(pair[0], pair[1]).init(layer_key, device)
                    })
                    .collect();
                Mlp { layers }
            })
            .collect();

        Ok(EnsembleBlock { members, d_input })
    }

    /// Reject architectures that cannot be initialized.
    pub fn check(&self) -> Result<(), EnsembleError> {
        if self.model_number == 0 {
            return Err(EnsembleError::InvalidConfig(
                "model_number must be > 0".to_string(),
            ));
        }
        if let Some(i) = self.hidden_shape.iter().position(|&w| w == 0) {
            return Err(EnsembleError::InvalidConfig(format!(
                "hidden_shape[{i}] must be > 0"
            )));
        }
        Ok(())
    }
}

impl<B: Backend> EnsembleBlock<B> {
    /// Hidden layer widths, read from the first member.
    pub fn hidden_shape(&self) -> Vec<usize> {
        self.members
            .first()
            .map(|member| {
                let layers = &member.layers;
                layers[..layers.len().saturating_sub(1)]
                    .iter()
                    .map(|layer| layer.d_output())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Build an ensemble from explicit members. All members must accept the
    /// same input dimension and produce `[mean, spread]`.
    pub fn from_members(members: Vec<Mlp<B>>) -> Result<Self, EnsembleError> {
        if members.is_empty() {
            return Err(EnsembleError::EmptyDataset("ensemble member"));
        }
        let d_input = members[0].d_input();
        for member in &members {
            if member.d_input() != d_input {
                return Err(EnsembleError::ShapeMismatch {
                    expected: d_input,
                    actual: member.d_input(),
                });
            }
            if member.d_output() != N_OUTPUTS {
                return Err(EnsembleError::ShapeMismatch {
                    expected: N_OUTPUTS,
                    actual: member.d_output(),
                });
            }
        }
        Ok(Self { members, d_input })
    }

    /// Forward pass: applies every member to the same batch.
    ///
    /// Input shape: `(batch, d_input)`
    /// Output shape: `(model_number, batch, 2)`
    pub fn forward(&self, inputs: Tensor<B, 2>) -> Result<Tensor<B, 3>, EnsembleError> {
        let [_, d] = inputs.dims();
        if d != self.d_input {
            return Err(EnsembleError::ShapeMismatch {
                expected: self.d_input,
                actual: d,
            });
        }

        let outputs: Vec<Tensor<B, 2>> = self
            .members
            .iter()
            .map(|member| member.forward(inputs.clone()))
            .collect();
        Ok(Tensor::stack::<3>(outputs, 0))
    }
}

impl<B: Backend> EnsemblePredictor<B> for EnsembleBlock<B> {
    fn predict(&self, inputs: Tensor<B, 2>) -> Result<Tensor<B, 3>, EnsembleError> {
        self.forward(inputs)
    }

    fn model_number(&self) -> usize {
        self.members.len()
    }

    fn d_input(&self) -> usize {
        self.d_input
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;
    use burn::backend::Autodiff;
    use burn::tensor::{Distribution, TensorData};

    type TestBackend = NdArray<f32>;
    type TestAutodiffBackend = Autodiff<NdArray<f32>>;

    fn small_ensemble(device: &<TestBackend as Backend>::Device) -> EnsembleBlock<TestBackend> {
        EnsembleConfig::new()
            .with_hidden_shape(vec![4])
            .with_model_number(3)
            .init_with_input_dim::<TestBackend>(PrngKey::new(0), 8, device)
            .unwrap()
    }

    #[test]
    fn test_forward_shape() {
        let device = Default::default();
        let model = small_ensemble(&device);
        let input = Tensor::<TestBackend, 2>::random(
            [6, 8],
            Distribution::Normal(0.0, 1.0),
            &device,
        );
        let output = model.forward(input).unwrap();
        assert_eq!(output.dims(), [3, 6, 2]);
        assert_eq!(model.model_number(), 3);
        assert_eq!(model.d_input(), 8);
    }

    #[test]
    fn test_default_config_shape() {
        let device = Default::default();
        let sample = Tensor::<TestBackend, 2>::zeros([5, 1900], &device);
        let model = EnsembleConfig::new().init(PrngKey::new(0), &sample, &device).unwrap();
        assert_eq!(model.d_input(), 1900);
        assert_eq!(model.model_number(), 5);
        assert_eq!(model.predict(sample).unwrap().dims(), [5, 5, 2]);
    }

    #[test]
    fn test_shape_mismatch() {
        let device = Default::default();
        let model = small_ensemble(&device);
        let input = Tensor::<TestBackend, 2>::zeros([2, 7], &device);
        match model.forward(input) {
            Err(EnsembleError::ShapeMismatch { expected, actual }) => {
                assert_eq!(expected, 8);
                assert_eq!(actual, 7);
            }
            other => panic!("Expected ShapeMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_predict_is_pure() {
        let device = Default::default();
        let model = small_ensemble(&device);
        let input = Tensor::<TestBackend, 2>::random(
            [4, 8],
            Distribution::Normal(0.0, 1.0),
            &device,
        );
        let a: Vec<f32> = model.predict(input.clone()).unwrap().into_data().to_vec().unwrap();
        let b: Vec<f32> = model.predict(input).unwrap().into_data().to_vec().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_same_key_same_parameters() {
        let device = Default::default();
        let input = Tensor::<TestBackend, 2>::random(
            [4, 8],
            Distribution::Normal(0.0, 1.0),
            &device,
        );
        let a = small_ensemble(&device).predict(input.clone()).unwrap();
        let b = small_ensemble(&device).predict(input.clone()).unwrap();
        let c = EnsembleConfig::new()
            .with_hidden_shape(vec![4])
            .with_model_number(3)
            .init_with_input_dim::<TestBackend>(PrngKey::new(1), 8, &device)
            .unwrap()
            .predict(input)
            .unwrap();

        let a: Vec<f32> = a.into_data().to_vec().unwrap();
        let b: Vec<f32> = b.into_data().to_vec().unwrap();
        let c: Vec<f32> = c.into_data().to_vec().unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_members_are_independent() {
        let device = Default::default();
        let model = small_ensemble(&device);
        let input = Tensor::<TestBackend, 2>::random(
            [2, 8],
            Distribution::Normal(0.0, 1.0),
            &device,
        );
        let output = model.forward(input).unwrap();
        let m0 = output.clone().narrow(0, 0, 1);
        let m1 = output.narrow(0, 1, 1);
        let diff: f32 = (m0 - m1).abs().sum().into_scalar().elem();
        assert!(diff > 1e-6, "Members should not share weights, diff={diff}");
    }

    #[test]
    fn test_from_members_explicit_weights() {
        let device = Default::default();
        let layer = |w: [[f32; 2]; 1], b: [f32; 2]| {
            DenseLayer::<TestBackend>::from_tensors(
                Tensor::from_data(TensorData::from(w), &device),
                Tensor::from_data(TensorData::from(b), &device),
            )
        };
        let members = vec![
            Mlp::from_layers(vec![layer([[1.0, 0.0]], [0.0, 0.5])]).unwrap(),
            Mlp::from_layers(vec![layer([[2.0, 0.0]], [0.0, 1.0])]).unwrap(),
        ];
        let model = EnsembleBlock::from_members(members).unwrap();
        let input = Tensor::from_data(TensorData::from([[3.0_f32]]), &device);
        let values: Vec<f32> = model.forward(input).unwrap().into_data().to_vec().unwrap();
        assert_eq!(values, vec![3.0, 0.5, 6.0, 1.0]);
    }

    #[test]
    fn test_from_members_rejects_bad_output() {
        let device = Default::default();
        let bad = Mlp::from_layers(vec![DenseLayerConfig::new(4, 3)
            .init::<TestBackend>(PrngKey::new(0), &device)])
        .unwrap();
        assert!(matches!(
            EnsembleBlock::from_members(vec![bad]),
            Err(EnsembleError::ShapeMismatch { expected: 2, actual: 3 })
        ));
        assert!(matches!(
            EnsembleBlock::<TestBackend>::from_members(vec![]),
            Err(EnsembleError::EmptyDataset(_))
        ));
    }

    #[test]
    fn test_mlp_rejects_unchained_layers() {
        let device = Default::default();
        let layers = vec![
            DenseLayerConfig::new(4, 3).init::<TestBackend>(PrngKey::new(0), &device),
            DenseLayerConfig::new(5, 2).init::<TestBackend>(PrngKey::new(1), &device),
        ];
        assert!(Mlp::from_layers(layers).is_err());
    }

    #[test]
    fn test_init_rejects_invalid_architecture() {
        let device = Default::default();
        let no_members = EnsembleConfig::new()
            .with_model_number(0)
            .init_with_input_dim::<TestBackend>(PrngKey::new(0), 8, &device);
        assert!(matches!(no_members, Err(EnsembleError::InvalidConfig(_))));

        let zero_width = EnsembleConfig::new()
            .with_hidden_shape(vec![4, 0])
            .init_with_input_dim::<TestBackend>(PrngKey::new(0), 8, &device);
        match zero_width {
            Err(EnsembleError::InvalidConfig(msg)) => assert!(msg.contains("hidden_shape[1]")),
            other => panic!("Expected InvalidConfig, got {other:?}"),
        }

        let zero_input = EnsembleConfig::new().init_with_input_dim::<TestBackend>(
            PrngKey::new(0),
            0,
            &device,
        );
        assert!(matches!(zero_input, Err(EnsembleError::InvalidConfig(_))));
    }

    #[test]
    fn test_hidden_shape_read_from_members() {
        let device = Default::default();
        assert_eq!(small_ensemble(&device).hidden_shape(), vec![4]);
        let linear = EnsembleConfig::new()
            .init_with_input_dim::<TestBackend>(PrngKey::new(0), 3, &device)
            .unwrap();
        assert!(linear.hidden_shape().is_empty());
    }

    #[test]
    fn test_parameter_count() {
        let device = Default::default();
        let model = small_ensemble(&device);
        // Per member: 8*4 + 4 + 4*2 + 2 = 46; three members.
        assert_eq!(model.num_params(), 138);
    }

    #[test]
    fn test_gradient_flows_to_every_member() {
        use burn::optim::GradientsParams;

        let device = Default::default();
        let model = EnsembleConfig::new()
            .with_hidden_shape(vec![4])
            .with_model_number(3)
            .init_with_input_dim::<TestAutodiffBackend>(PrngKey::new(2), 8, &device)
            .unwrap();
        let input = Tensor::<TestAutodiffBackend, 2>::random(
            [4, 8],
            Distribution::Normal(0.0, 1.0),
            &device,
        );
        let loss = model.forward(input).unwrap().sum();
        let grads = GradientsParams::from_grads(loss.backward(), &model);

        for (i, member) in model.members.iter().enumerate() {
            let last = member.layers.last().unwrap();
            let grad = grads
                .get::<NdArray<f32>, 2>(last.weight.id)
                .unwrap_or_else(|| panic!("member {i} output weight should have gradient"));
            let grad_sum: f32 = grad.abs().sum().into_scalar().elem();
            assert!(grad_sum > 0.0, "member {i} gradient is zero");
        }
    }
}
