//! Error types for xrview_explain.

use thiserror::Error;
use xrview_model::ModelError;

/// Result type alias using [`ExplainError`].
pub type Result<T> = std::result::Result<T, ExplainError>;

/// Errors that can occur while computing explanations.
#[derive(Error, Debug)]
pub enum ExplainError {
    /// A method identifier outside the closed registry was requested.
    #[error("Unknown CAM method '{0}'")]
    UnknownMethod(String),

    /// The aggregator was configured inconsistently.
    #[error("Invalid aggregator config: {0}")]
    InvalidConfig(String),

    /// Target class outside the model's label range.
    #[error("Class {class_id} out of range for {n_classes} classes")]
    ClassOutOfRange {
        /// Requested class id.
        class_id: usize,
        /// Number of classes the model emits.
        n_classes: usize,
    },

    /// A single attribution computation failed. Absorbed per method at
    /// the aggregator boundary.
    #[error("Attribution computation failed: {0}")]
    Computation(String),

    /// Model adapter error.
    #[error(transparent)]
    Model(#[from] ModelError),
}
