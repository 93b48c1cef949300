use burn::module::Param;
use burn::prelude::*;
use burn::tensor::TensorData;

use crate::key::PrngKey;

/// Configuration for a fully connected layer.
#[derive(Config, Debug)]
pub struct DenseLayerConfig {
    /// Input dimension.
    pub d_input: usize,
    /// Output dimension.
    pub d_output: usize,
}

/// Affine layer `y = x W + b` with weights drawn from an explicit key.
#[derive(Module, Debug)]
pub struct DenseLayer<B: Backend> {
    /// Weight matrix, shape (d_input, d_output).
    pub(crate) weight: Param<Tensor<B, 2>>,
    /// Bias, shape (d_output,). Zero initialized.
    pub(crate) bias: Param<Tensor<B, 1>>,
}

impl DenseLayerConfig {
    /// Initialize a DenseLayer from `key`.
    ///
    /// Weight is truncated normal with standard deviation `1/sqrt(fan_in)`,
    /// bias is zero.
    pub fn init<B: Backend>(&self, key: PrngKey, device: &B::Device) -> DenseLayer<B> {
        let std_dev = 1.0 / (self.d_input as f64).sqrt();
        let values = key.truncated_normal(self.d_input * self.d_output, std_dev);
        let weight = Tensor::from_data(
            TensorData::new(values, [self.d_input, self.d_output]),
            device,
        );

        DenseLayer {
            weight: Param::from_tensor(weight),
            bias: Param::from_tensor(Tensor::zeros([self.d_output], device)),
        }
    }
}

impl<B: Backend> DenseLayer<B> {
    /// Build a layer from explicit weight `(d_input, d_output)` and bias `(d_output,)`.
    pub fn from_tensors(weight: Tensor<B, 2>, bias: Tensor<B, 1>) -> Self {
        Self {
            weight: Param::from_tensor(weight),
            bias: Param::from_tensor(bias),
        }
    }

    pub fn d_input(&self) -> usize {
        self.weight.val().dims()[0]
    }

    pub fn d_output(&self) -> usize {
        self.weight.val().dims()[1]
    }

    /// Input shape `(batch, d_input)`, output shape `(batch, d_output)`.
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        input.matmul(self.weight.val()) + self.bias.val().unsqueeze_dim::<2>(0)
    }
}
