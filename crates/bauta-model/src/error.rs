use thiserror::Error;

/// The error type for Bauta model operations.
///
/// Covers configuration problems detected before a model is built and
/// input tensors that the network cannot process.
#[derive(Error, Debug)]
pub enum BautaError {
    /// Error for when an invalid model configuration is provided.
    #[error("Invalid model configuration: {reason}")]
    InvalidConfiguration {
        /// The reason why the configuration is invalid.
        reason: String,
    },

    /// Error for when an input tensor has an invalid shape.
    #[error("Invalid input tensor shape: expected {expected}, got {actual}")]
    InvalidInputShape {
        /// The expected tensor shape.
        expected: String,
        /// The actual tensor shape.
        actual: String,
    },
}

/// A specialized `Result` type for Bauta model operations.
pub type BautaResult<T> = Result<T, BautaError>;
