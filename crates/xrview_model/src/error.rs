//! Error types for xrview_model.

use thiserror::Error;

/// Result type alias using [`ModelError`].
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors that can occur in model adapter operations.
#[derive(Error, Debug)]
pub enum ModelError {
    /// The classifier exposes no layer attribution methods can attach to.
    #[error("Model '{model}' exposes no target layer for attribution")]
    NoTargetLayer {
        /// Name of the offending model.
        model: String,
    },

    /// The adapter was constructed with an inconsistent label set.
    #[error("Invalid label set: {0}")]
    InvalidLabels(String),

    /// Raw image bytes could not be decoded.
    #[error("Image decode error: {0}")]
    Decode(String),

    /// Input tensor has the wrong shape for the model.
    #[error("Invalid input: expected {expected}, got {got}")]
    InvalidInput {
        /// Expected shape description.
        expected: String,
        /// Actual shape description.
        got: String,
    },

    /// `k` exceeds the number of classes.
    #[error("Cannot take top {k} of {n_classes} classes")]
    TopK {
        /// Requested k.
        k: usize,
        /// Number of classes available.
        n_classes: usize,
    },

    /// Tensor data could not be read back from the backend.
    #[error("Tensor error: {0}")]
    Tensor(String),
}
