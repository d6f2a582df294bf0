//! Error types for xrview_review.

use thiserror::Error;

/// Result type alias using [`ReviewError`].
pub type Result<T> = std::result::Result<T, ReviewError>;

/// Errors that can occur in the review workflow.
#[derive(Error, Debug)]
pub enum ReviewError {
    /// `advance` was called before feedback for the current finding
    /// was recorded. A logic fault, not a recoverable condition.
    #[error("No feedback recorded for '{filename}' finding {rank}")]
    MissingFeedback {
        /// Image whose finding lacks feedback.
        filename: String,
        /// Rank of the finding.
        rank: usize,
    },

    /// The session is in its terminal state; no images remain.
    #[error("Review session is complete; no images remain")]
    SessionComplete,

    /// Session constructed with impossible geometry.
    #[error("Invalid session config: {0}")]
    InvalidConfig(String),

    /// Session counters left their declared bounds. A logic fault;
    /// fail loudly rather than silently corrupting state.
    #[error("Session state corrupted: {0}")]
    CorruptState(String),

    /// The feedback payload could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The persistence collaborator rejected a write. Recoverable: the
    /// in-memory store keeps everything accumulated so far.
    #[error("Feedback sink error: {0}")]
    Sink(String),
}
