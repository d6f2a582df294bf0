//! Feedback accumulation and the persistence contract.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use xrview_core::SessionId;

use crate::error::{ReviewError, Result};

/// What the reviewer entered for one finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackSelection {
    /// Whether the reviewer confirms the finding.
    pub confirm: bool,
    /// Free-text comment, possibly empty.
    pub comment: String,
    /// The method the reviewer judged best for this finding, when one
    /// was chosen. Serialized as `null` otherwise.
    pub best_cam_method: Option<String>,
}

impl FeedbackSelection {
    /// A plain confirmation with no comment and no method choice.
    #[must_use]
    pub fn confirmed() -> Self {
        Self {
            confirm: true,
            comment: String::new(),
            best_cam_method: None,
        }
    }

    /// A plain rejection with no comment and no method choice.
    #[must_use]
    pub fn rejected() -> Self {
        Self {
            confirm: false,
            comment: String::new(),
            best_cam_method: None,
        }
    }

    /// Attach a comment.
    #[must_use]
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    /// Attach a best-method choice.
    #[must_use]
    pub fn with_best_method(mut self, method: impl Into<String>) -> Self {
        self.best_cam_method = Some(method.into());
        self
    }
}

/// One feedback record for one (image, finding-rank) pair, in the
/// persisted wire shape: `{"result": rank, "selection": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    /// Rank of the finding the feedback applies to.
    pub result: usize,
    /// The reviewer's entries.
    pub selection: FeedbackSelection,
}

impl FeedbackRecord {
    /// Create a record for the given finding rank.
    #[must_use]
    pub fn new(result: usize, selection: FeedbackSelection) -> Self {
        Self { result, selection }
    }
}

/// External persistence collaborator the store flushes through.
pub trait FeedbackSink {
    /// Write the serialized payload under the given key.
    ///
    /// # Errors
    ///
    /// Implementations surface storage failures as
    /// [`ReviewError::Sink`]; the caller's in-memory store is
    /// unaffected either way.
    fn write(&mut self, key: &str, payload: &str) -> Result<()>;
}

/// In-memory sink recording every write, for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemorySink {
    /// `(key, payload)` pairs in write order.
    pub writes: Vec<(String, String)>,
}

impl MemorySink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl FeedbackSink for MemorySink {
    fn write(&mut self, key: &str, payload: &str) -> Result<()> {
        self.writes.push((key.to_string(), payload.to_string()));
        Ok(())
    }
}

/// Accumulates feedback records per image, in review order.
///
/// The store grows monotonically within a session and is flushed in
/// full each time an image's review completes.
#[derive(Debug, Clone, Default)]
pub struct FeedbackStore {
    entries: Vec<(String, Vec<FeedbackRecord>)>,
}

impl FeedbackStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record to the image's sequence, creating it on first
    /// use.
    ///
    /// No deduplication: if the same (image, rank) is submitted twice
    /// (the reviewer navigated back), both records are kept in order.
    /// Consumers that want a single record per rank use
    /// [`FeedbackStore::latest_for`].
    pub fn insert(&mut self, image_key: &str, record: FeedbackRecord) {
        match self.entries.iter_mut().find(|(key, _)| key == image_key) {
            Some((_, records)) => records.push(record),
            None => self.entries.push((image_key.to_string(), vec![record])),
        }
    }

    /// All records for an image, in insertion order.
    #[must_use]
    pub fn records(&self, image_key: &str) -> Option<&[FeedbackRecord]> {
        self.entries
            .iter()
            .find(|(key, _)| key == image_key)
            .map(|(_, records)| records.as_slice())
    }

    /// Whether a record for this (image, rank) pair exists.
    #[must_use]
    pub fn has_record(&self, image_key: &str, rank: usize) -> bool {
        self.latest_for(image_key, rank).is_some()
    }

    /// The most recent record for this (image, rank) pair.
    ///
    /// Duplicates are kept on insert; this accessor is the documented
    /// last-write-wins view for consumers wanting one record per rank.
    #[must_use]
    pub fn latest_for(&self, image_key: &str, rank: usize) -> Option<&FeedbackRecord> {
        self.records(image_key)?
            .iter()
            .rev()
            .find(|r| r.result == rank)
    }

    /// Image keys in insertion order.
    pub fn images(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    /// Number of images with at least one record.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize everything accumulated so far to the canonical JSON
    /// object: keys are image filenames in insertion order, values are
    /// the ordered record arrays.
    pub fn to_json(&self) -> Result<String> {
        let mut root = Map::new();
        for (key, records) in &self.entries {
            let array = records
                .iter()
                .map(|r| serde_json::to_value(r).map_err(|e| ReviewError::Serialization(e.to_string())))
                .collect::<Result<Vec<Value>>>()?;
            root.insert(key.clone(), Value::Array(array));
        }
        serde_json::to_string_pretty(&Value::Object(root))
            .map_err(|e| ReviewError::Serialization(e.to_string()))
    }

    /// Serialize the whole store and hand it to the persistence
    /// collaborator, keyed by session id.
    ///
    /// The payload always covers everything accumulated so far, so
    /// repeated flushes are idempotent: the storage layer's last write
    /// for the key wins and supersedes earlier partial payloads.
    ///
    /// Returns the storage key written.
    pub fn flush(&self, session_id: &SessionId, sink: &mut dyn FeedbackSink) -> Result<String> {
        let payload = self.to_json()?;
        let key = format!("feedback/feedback_{session_id}.json");
        sink.write(&key, &payload)?;
        info!(
            key = %key,
            images = self.len(),
            "flushed accumulated feedback"
        );
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xrview_core::Seed;

    fn record(rank: usize, confirm: bool) -> FeedbackRecord {
        FeedbackRecord::new(
            rank,
            FeedbackSelection {
                confirm,
                comment: String::new(),
                best_cam_method: None,
            },
        )
    }

    #[test]
    fn test_insert_creates_sequences() {
        let mut store = FeedbackStore::new();
        store.insert("a.png", record(0, true));
        store.insert("b.png", record(0, false));
        store.insert("a.png", record(1, true));

        assert_eq!(store.len(), 2);
        assert_eq!(store.records("a.png").unwrap().len(), 2);
        assert_eq!(store.records("b.png").unwrap().len(), 1);
        assert!(store.records("c.png").is_none());
    }

    #[test]
    fn test_duplicates_kept_last_write_wins() {
        let mut store = FeedbackStore::new();
        store.insert("a.png", record(0, true));
        store.insert("a.png", record(0, false));

        // Both records are kept in order...
        assert_eq!(store.records("a.png").unwrap().len(), 2);
        // ...and the documented consumer view takes the last one.
        assert!(!store.latest_for("a.png", 0).unwrap().selection.confirm);
    }

    #[test]
    fn test_images_keep_insertion_order() {
        let mut store = FeedbackStore::new();
        store.insert("z.png", record(0, true));
        store.insert("a.png", record(0, true));
        store.insert("m.png", record(0, true));

        let keys: Vec<&str> = store.images().collect();
        assert_eq!(keys, vec!["z.png", "a.png", "m.png"]);
    }

    #[test]
    fn test_to_json_wire_shape() {
        let mut store = FeedbackStore::new();
        store.insert("a.png", record(0, true));

        let json = store.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["a.png"][0]["result"], 0);
        assert_eq!(value["a.png"][0]["selection"]["confirm"], true);
        assert!(value["a.png"][0]["selection"]["best_cam_method"].is_null());
    }

    #[test]
    fn test_json_preserves_insertion_order() {
        let mut store = FeedbackStore::new();
        store.insert("zzz.png", record(0, true));
        store.insert("aaa.png", record(0, true));

        let json = store.to_json().unwrap();
        let z = json.find("zzz.png").unwrap();
        let a = json.find("aaa.png").unwrap();
        assert!(z < a, "keys must serialize in insertion order");
    }

    #[test]
    fn test_flush_writes_under_session_key() {
        let mut store = FeedbackStore::new();
        store.insert("a.png", record(0, true));
        store.insert("a.png", record(1, false));

        let session_id = SessionId::from_seed(Seed::new(9));
        let mut sink = MemorySink::new();
        let key = store.flush(&session_id, &mut sink).unwrap();

        assert_eq!(key, format!("feedback/feedback_{session_id}.json"));
        assert_eq!(sink.writes.len(), 1);

        let value: serde_json::Value = serde_json::from_str(&sink.writes[0].1).unwrap();
        assert_eq!(value["a.png"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_flush_is_repeatable() {
        let mut store = FeedbackStore::new();
        store.insert("a.png", record(0, true));

        let session_id = SessionId::from_seed(Seed::new(9));
        let mut sink = MemorySink::new();
        store.flush(&session_id, &mut sink).unwrap();
        store.insert("b.png", record(0, true));
        store.flush(&session_id, &mut sink).unwrap();

        // Same key both times; the later payload supersedes and
        // contains every record accumulated so far.
        assert_eq!(sink.writes[0].0, sink.writes[1].0);
        let last: serde_json::Value = serde_json::from_str(&sink.writes[1].1).unwrap();
        assert!(last.get("a.png").is_some());
        assert!(last.get("b.png").is_some());
    }

    struct RejectingSink;

    impl FeedbackSink for RejectingSink {
        fn write(&mut self, _key: &str, _payload: &str) -> Result<()> {
            Err(ReviewError::Sink("storage unavailable".into()))
        }
    }

    #[test]
    fn test_sink_failure_leaves_store_intact() {
        let mut store = FeedbackStore::new();
        store.insert("a.png", record(0, true));

        let session_id = SessionId::from_seed(Seed::new(1));
        let result = store.flush(&session_id, &mut RejectingSink);
        assert!(matches!(result, Err(ReviewError::Sink(_))));
        assert_eq!(store.records("a.png").unwrap().len(), 1);
    }
}
