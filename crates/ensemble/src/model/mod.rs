//! Ensemble model components: dense layers, the ensemble block and its
//! moment-matching reducer, and the tensor bridge for raw embeddings.

pub mod bridge;
pub mod dense;
pub mod ensemble;
pub mod reduce;
