/// Errors raised by the ensemble predictor, loss and training loop.
#[derive(Debug, thiserror::Error)]
pub enum EnsembleError {
    /// Input dimensionality disagrees with the initialized parameters.
    #[error("Shape mismatch: expected input dimension {expected}, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    /// Inputs and labels have different lengths.
    #[error("Length mismatch: {inputs} inputs but {labels} labels")]
    LengthMismatch { inputs: usize, labels: usize },

    /// A variance used as a divisor is zero, negative or not finite.
    #[error("Degenerate variance {variance} at index {index}")]
    DegenerateVariance { index: usize, variance: f64 },

    /// A configuration value that cannot produce a usable model or batch.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A dataset that must contain at least one example is empty.
    #[error("Empty {0} set")]
    EmptyDataset(&'static str),
}
