//! The image catalog: filenames and ground-truth labels.

use rand::seq::SliceRandom;

use xrview_core::Seed;
use xrview_review::ImageRecord;

use crate::error::{DataError, Result};
use crate::store::ObjectStore;

/// Default storage key of the catalog file.
pub const METADATA_KEY: &str = "metadata.csv";

/// The catalog of reviewable images.
///
/// Loaded once at session start and read-only afterwards; the
/// authoritative copy stays here while sessions own their sampled
/// queues.
#[derive(Debug, Clone)]
pub struct MetadataStore {
    entries: Vec<ImageRecord>,
}

impl MetadataStore {
    /// Load the catalog from `metadata.csv` in the object store.
    ///
    /// The file is `filename,label` per line; a `filename,label`
    /// header row is skipped. Labels may contain commas (everything
    /// after the first comma belongs to the label).
    pub fn from_store(store: &dyn ObjectStore) -> Result<Self> {
        Self::from_store_key(store, METADATA_KEY)
    }

    /// Load the catalog from an explicit key.
    pub fn from_store_key(store: &dyn ObjectStore, key: &str) -> Result<Self> {
        let bytes = store.get(key)?;
        let text = String::from_utf8(bytes)
            .map_err(|e| DataError::Format(format!("catalog is not UTF-8: {e}")))?;
        Self::parse(&text)
    }

    /// Build a catalog from already-loaded records.
    #[must_use]
    pub fn from_records(entries: Vec<ImageRecord>) -> Self {
        Self { entries }
    }

    fn parse(text: &str) -> Result<Self> {
        let mut entries = Vec::new();
        for (line_no, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line_no == 0 && line.eq_ignore_ascii_case("filename,label") {
                continue;
            }
            let (filename, label) = line.split_once(',').ok_or_else(|| {
                DataError::Format(format!("line {}: expected 'filename,label'", line_no + 1))
            })?;
            let filename = filename.trim();
            if filename.is_empty() {
                return Err(DataError::Format(format!("line {}: empty filename", line_no + 1)));
            }
            entries.push(ImageRecord::new(filename, label.trim()));
        }
        Ok(Self { entries })
    }

    /// Number of catalog entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries, in catalog order.
    #[must_use]
    pub fn entries(&self) -> &[ImageRecord] {
        &self.entries
    }

    /// The stored label for a filename.
    #[must_use]
    pub fn full_label(&self, filename: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.filename == filename)
            .map(|e| e.label.as_str())
    }

    /// Distinct labels, sorted.
    #[must_use]
    pub fn unique_labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = self.entries.iter().map(|e| e.label.clone()).collect();
        labels.sort();
        labels.dedup();
        labels
    }

    /// A fixed-size random sample of records for one session's queue.
    ///
    /// The same seed yields the same queue. Requests larger than the
    /// catalog return every entry (shuffled).
    #[must_use]
    pub fn sample(&self, n: usize, seed: Seed) -> Vec<ImageRecord> {
        let mut records = self.entries.clone();
        records.shuffle(&mut seed.to_rng());
        records.truncate(n);
        records
    }

    /// Like [`MetadataStore::sample`], restricted to one label.
    #[must_use]
    pub fn sample_filtered(&self, n: usize, label: &str, seed: Seed) -> Vec<ImageRecord> {
        let mut records: Vec<ImageRecord> = self
            .entries
            .iter()
            .filter(|e| e.label == label)
            .cloned()
            .collect();
        records.shuffle(&mut seed.to_rng());
        records.truncate(n);
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryObjectStore;

    fn catalog() -> MetadataStore {
        MetadataStore::from_records(vec![
            ImageRecord::new("a.png", "Effusion"),
            ImageRecord::new("b.png", "Cardiomegaly"),
            ImageRecord::new("c.png", "Effusion"),
            ImageRecord::new("d.png", "Pneumonia"),
        ])
    }

    #[test]
    fn test_parse_skips_header_and_blanks() {
        let mut store = MemoryObjectStore::new();
        store
            .put(
                METADATA_KEY,
                b"filename,label\na.png,Effusion\n\nb.png,Mass\n",
            )
            .unwrap();

        let catalog = MetadataStore::from_store(&store).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.full_label("b.png"), Some("Mass"));
    }

    #[test]
    fn test_parse_rejects_malformed_line() {
        let mut store = MemoryObjectStore::new();
        store.put(METADATA_KEY, b"a.png Effusion\n").unwrap();
        assert!(matches!(
            MetadataStore::from_store(&store),
            Err(DataError::Format(_))
        ));
    }

    #[test]
    fn test_missing_catalog_is_not_found() {
        let store = MemoryObjectStore::new();
        assert!(matches!(
            MetadataStore::from_store(&store),
            Err(DataError::NotFound { .. })
        ));
    }

    #[test]
    fn test_unique_labels_sorted() {
        assert_eq!(
            catalog().unique_labels(),
            vec!["Cardiomegaly", "Effusion", "Pneumonia"]
        );
    }

    #[test]
    fn test_sample_is_reproducible() {
        let catalog = catalog();
        let a = catalog.sample(3, Seed::new(42));
        let b = catalog.sample(3, Seed::new(42));
        assert_eq!(a, b);
        assert_eq!(a.len(), 3);
    }

    #[test]
    fn test_sample_caps_at_catalog_size() {
        assert_eq!(catalog().sample(10, Seed::new(1)).len(), 4);
    }

    #[test]
    fn test_sample_filtered_matches_label() {
        let sampled = catalog().sample_filtered(10, "Effusion", Seed::new(7));
        assert_eq!(sampled.len(), 2);
        assert!(sampled.iter().all(|r| r.label == "Effusion"));
    }
}
