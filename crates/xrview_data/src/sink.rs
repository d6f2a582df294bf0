//! Feedback persistence over an object store.

use xrview_review::{FeedbackSink, ReviewError};

use crate::store::ObjectStore;

/// [`FeedbackSink`] writing flushed payloads into an object store.
///
/// The flush key already carries the session id, so concurrent
/// sessions writing through different sinks never collide.
pub struct ObjectFeedbackSink<'a, S: ObjectStore> {
    store: &'a mut S,
}

impl<'a, S: ObjectStore> ObjectFeedbackSink<'a, S> {
    /// Wrap a store.
    pub fn new(store: &'a mut S) -> Self {
        Self { store }
    }
}

impl<S: ObjectStore> FeedbackSink for ObjectFeedbackSink<'_, S> {
    fn write(&mut self, key: &str, payload: &str) -> xrview_review::Result<()> {
        self.store
            .put(key, payload.as_bytes())
            .map_err(|e| ReviewError::Sink(e.to_string()))
    }
}
