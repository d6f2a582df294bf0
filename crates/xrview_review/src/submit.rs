//! The interface-layer-agnostic feedback entry point.
//!
//! Any front end (web handler, CLI, test harness) records feedback the
//! same way: build a [`FeedbackSelection`], call [`submit_feedback`],
//! and flush when the outcome says an image completed. No framework
//! callback is involved.

use xrview_core::SessionId;

use crate::error::{ReviewError, Result};
use crate::feedback::{FeedbackRecord, FeedbackSelection, FeedbackSink, FeedbackStore};
use crate::session::{Progress, ReviewSession, Transition};

/// What one submission did to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOutcome {
    /// The transition the submission caused.
    pub transition: Transition,
    /// Session progress after the transition.
    pub progress: Progress,
    /// Whether an image's review completed, making a feedback flush
    /// due.
    pub flush_triggered: bool,
}

/// Record the reviewer's selection for the current finding and advance
/// the session.
///
/// The record's rank is taken from the session's current state, so a
/// submission always applies to the finding actually under review.
///
/// # Errors
///
/// - [`ReviewError::SessionComplete`] when no image remains.
/// - Any invariant violation surfaced by [`ReviewSession::advance`].
pub fn submit_feedback(
    session: &mut ReviewSession,
    store: &mut FeedbackStore,
    selection: FeedbackSelection,
) -> Result<SubmitOutcome> {
    let image = session.current().ok_or(ReviewError::SessionComplete)?.clone();
    let record = FeedbackRecord::new(session.current_rank(), selection);
    store.insert(&image.filename, record);

    let transition = session.advance(store)?;
    let flush_triggered = transition.completes_image().is_some();

    Ok(SubmitOutcome {
        transition,
        progress: session.progress(),
        flush_triggered,
    })
}

/// [`submit_feedback`], plus the flush the transition may trigger.
///
/// On image completion the whole store is flushed through `sink`,
/// tagged with `session_id`. A sink failure is returned to the caller
/// but never discards accumulated feedback.
pub fn submit_and_flush(
    session: &mut ReviewSession,
    store: &mut FeedbackStore,
    selection: FeedbackSelection,
    session_id: &SessionId,
    sink: &mut dyn FeedbackSink,
) -> Result<SubmitOutcome> {
    let outcome = submit_feedback(session, store, selection)?;
    if outcome.flush_triggered {
        store.flush(session_id, sink)?;
    }
    Ok(outcome)
}
