//! Paired dataset helpers for ensemble training.
//!
//! Embeddings arrive as `Vec<f32>` from an external sequence encoder; this
//! module never encodes sequences itself.

use rand::seq::SliceRandom;

use crate::error::EnsembleError;
use crate::key::PrngKey;

/// Inputs paired with scalar labels.
#[derive(Clone, Debug, PartialEq)]
pub struct LabeledBatch {
    pub inputs: Vec<Vec<f32>>,
    pub labels: Vec<f32>,
}

impl LabeledBatch {
    /// Pair `inputs` with `labels`.
    ///
    /// # Errors
    /// `LengthMismatch` if the lengths differ, `ShapeMismatch` if the inputs
    /// do not share one dimensionality.
    pub fn new(inputs: Vec<Vec<f32>>, labels: Vec<f32>) -> Result<Self, EnsembleError> {
        check_paired(&inputs, &labels)?;
        if let Some(first) = inputs.first() {
            let dim = first.len();
            if let Some(bad) = inputs.iter().find(|x| x.len() != dim) {
                return Err(EnsembleError::ShapeMismatch {
                    expected: dim,
                    actual: bad.len(),
                });
            }
        }
        Ok(Self { inputs, labels })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Embedding dimension, or `None` for an empty batch.
    pub fn dim(&self) -> Option<usize> {
        self.inputs.first().map(|x| x.len())
    }

    /// Iterate over `(input, label)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&[f32], f32)> {
        self.inputs
            .iter()
            .map(|x| x.as_slice())
            .zip(self.labels.iter().copied())
    }

    /// The batch reordered by one permutation drawn from `key`.
    pub fn shuffled(&self, key: PrngKey) -> Result<Self, EnsembleError> {
        let (inputs, labels) = shuffle_in_unison(key, &self.inputs, &self.labels)?;
        Ok(Self { inputs, labels })
    }
}

/// Permute `a` and `b` with the same random permutation drawn from `key`.
///
/// For every output index `i` there is one source index `j` with
/// `(a'[i], b'[i]) == (a[j], b[j])`.
pub fn shuffle_in_unison<T: Clone, U: Clone>(
    key: PrngKey,
    a: &[T],
    b: &[U],
) -> Result<(Vec<T>, Vec<U>), EnsembleError> {
    check_paired(a, b)?;
    let mut order: Vec<usize> = (0..a.len()).collect();
    order.shuffle(&mut key.rng());
    Ok((
        order.iter().map(|&i| a[i].clone()).collect(),
        order.iter().map(|&i| b[i].clone()).collect(),
    ))
}

fn check_paired<T, U>(inputs: &[T], labels: &[U]) -> Result<(), EnsembleError> {
    if inputs.len() != labels.len() {
        return Err(EnsembleError::LengthMismatch {
            inputs: inputs.len(),
            labels: labels.len(),
        });
    }
    Ok(())
}
