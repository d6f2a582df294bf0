//! # xrview_review
//!
//! The review workflow: session state machine, feedback accumulation,
//! and persistence contract.
//!
//! This crate provides:
//! - [`ReviewSession`] — advances a reviewer through images and,
//!   within an image, through its ranked findings
//! - [`FeedbackStore`] — insertion-ordered accumulator, serialized on
//!   image completion
//! - [`submit_feedback`] — the interface-layer-agnostic entry point
//!   (web handler, CLI, test harness) that records feedback and
//!   advances the session
//!
//! Session and store are plain owned values threaded explicitly through
//! every operation; there is no ambient or global session state.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod feedback;
mod session;
mod submit;

pub use error::{ReviewError, Result};
pub use feedback::{
    FeedbackRecord, FeedbackSelection, FeedbackSink, FeedbackStore, MemorySink,
};
pub use session::{ImageRecord, Progress, ReviewSession, Transition};
pub use submit::{submit_and_flush, submit_feedback, SubmitOutcome};
