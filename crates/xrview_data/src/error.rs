//! Error types for xrview_data.

use thiserror::Error;

/// Result type alias using [`DataError`].
pub type Result<T> = std::result::Result<T, DataError>;

/// Errors that can occur in catalog and storage operations.
///
/// Fetch and write failures are recoverable: they surface to the
/// reviewer as a visible message, and the same image or flush may be
/// retried.
#[derive(Error, Debug)]
pub enum DataError {
    /// No access credential was supplied. Disables image and feedback
    /// I/O; in-process review logic is unaffected.
    #[error("No access key supplied; storage access is disabled")]
    MissingCredential,

    /// The requested object does not exist.
    #[error("Object '{key}' not found")]
    NotFound {
        /// The missing key.
        key: String,
    },

    /// The storage backend refused access.
    #[error("Access denied for object '{key}'")]
    AccessDenied {
        /// The refused key.
        key: String,
    },

    /// Malformed catalog or metadata content.
    #[error("Format error: {0}")]
    Format(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
