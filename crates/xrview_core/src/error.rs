//! Error types for xrview_core.

use thiserror::Error;

/// Result type alias using [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors that can occur in xrview_core operations.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Session identifier failed validation.
    #[error("Invalid session id '{got}': {reason}")]
    InvalidSessionId {
        /// The rejected identifier.
        got: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Generic error.
    #[error("{0}")]
    Other(String),
}
