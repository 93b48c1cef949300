//! Tensor bridge: conversions between raw embeddings (`Vec<f32>`) produced by
//! an external sequence encoder and burn tensors.

use burn::prelude::*;
use burn::tensor::TensorData;

use crate::error::EnsembleError;

/// Convert a batch of f32 embeddings to a burn 2D tensor `(batch, dim)`.
///
/// # Errors
/// `EmptyDataset` if `embeddings` is empty, `ShapeMismatch` if the vectors
/// have inconsistent lengths.
pub fn embeddings_to_tensor<B: Backend>(
    embeddings: &[Vec<f32>],
    device: &B::Device,
) -> Result<Tensor<B, 2>, EnsembleError> {
    let dim = embeddings
        .first()
        .map(|e| e.len())
        .ok_or(EnsembleError::EmptyDataset("embedding"))?;
    for emb in embeddings {
        if emb.len() != dim {
            return Err(EnsembleError::ShapeMismatch {
                expected: dim,
                actual: emb.len(),
            });
        }
    }

    let batch = embeddings.len();
    let flat: Vec<f32> = embeddings.iter().flat_map(|v| v.iter().copied()).collect();
    Ok(Tensor::from_data(TensorData::new(flat, [batch, dim]), device))
}

/// Replicate a single embedding `copies` times into a `(copies, dim)` batch.
pub fn tile_embedding<B: Backend>(
    embedding: &[f32],
    copies: usize,
    device: &B::Device,
) -> Tensor<B, 2> {
    let dim = embedding.len();
    let flat: Vec<f32> = std::iter::repeat(embedding)
        .take(copies)
        .flat_map(|e| e.iter().copied())
        .collect();
    Tensor::from_data(TensorData::new(flat, [copies, dim]), device)
}

/// Replicate a scalar label `copies` times.
pub fn tile_label<B: Backend>(label: f32, copies: usize, device: &B::Device) -> Tensor<B, 1> {
    Tensor::from_data(TensorData::new(vec![label; copies], [copies]), device)
}

/// Convert a slice of labels to a burn 1D tensor.
pub fn labels_to_tensor<B: Backend>(labels: &[f32], device: &B::Device) -> Tensor<B, 1> {
    Tensor::from_data(TensorData::new(labels.to_vec(), [labels.len()]), device)
}

/// Extract f32 values from any burn tensor, row-major.
pub fn tensor_to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Vec<f32> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec()
        .unwrap_or_default()
}

/// Extract a single f64 scalar from a burn 1D tensor.
///
/// # Panics
/// Panics if the tensor does not contain exactly one element.
pub fn tensor_to_f64<B: Backend>(tensor: Tensor<B, 1>) -> f64 {
    tensor.into_scalar().elem::<f64>()
}
