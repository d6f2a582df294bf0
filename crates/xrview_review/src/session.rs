//! The review session state machine.

use serde::{Deserialize, Serialize};

use crate::error::{ReviewError, Result};
use crate::feedback::FeedbackStore;

/// One catalog entry: an image filename and its stored ground-truth
/// label. Immutable once loaded; the session owns its copy for the
/// session's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// Storage key of the image.
    pub filename: String,
    /// Ground-truth label from the catalog.
    pub label: String,
}

impl ImageRecord {
    /// Create a record.
    pub fn new(filename: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            label: label.into(),
        }
    }
}

/// Where the session currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Reviewing finding `finding_rank` of image `image_index`.
    Reviewing {
        /// Index into the queue.
        image_index: usize,
        /// Rank of the finding under review (0-based).
        finding_rank: usize,
    },
    /// Terminal: no images remain. The interface must present an
    /// explicit "no more images" outcome and take no further action.
    Complete,
}

/// Result of one `advance` transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Moved to the next finding of the same image.
    NextFinding,
    /// Finished an image and moved to the next one. Triggers a flush
    /// for the completed image.
    NextImage {
        /// Filename of the image whose review just completed.
        completed: String,
    },
    /// Finished the last image; the session is now terminal. Also
    /// triggers a flush.
    Finished {
        /// Filename of the final completed image.
        completed: String,
    },
}

impl Transition {
    /// Filename of the image this transition completed, if any.
    /// `Some` means a feedback flush is due.
    #[must_use]
    pub fn completes_image(&self) -> Option<&str> {
        match self {
            Transition::NextFinding => None,
            Transition::NextImage { completed } | Transition::Finished { completed } => {
                Some(completed)
            }
        }
    }
}

/// Tracks which image and which ranked finding is currently under
/// review for one reviewer.
///
/// States are `(current_index, num_result)` pairs starting at `(0, 0)`;
/// `current_index == queue.len()` is terminal. The only mutation is
/// [`ReviewSession::advance`], and no transition can skip a finding or
/// an image.
#[derive(Debug, Clone)]
pub struct ReviewSession {
    queue: Vec<ImageRecord>,
    current_index: usize,
    num_result: usize,
    num_findings: usize,
}

impl ReviewSession {
    /// Create a session over a fixed queue, reviewing `num_findings`
    /// (K) ranked findings per image.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError::InvalidConfig`] when `num_findings` is
    /// zero.
    pub fn new(queue: Vec<ImageRecord>, num_findings: usize) -> Result<Self> {
        if num_findings == 0 {
            return Err(ReviewError::InvalidConfig(
                "num_findings must be >= 1".into(),
            ));
        }
        Ok(Self {
            queue,
            current_index: 0,
            num_result: 0,
            num_findings,
        })
    }

    /// The image currently under review, or `None` when complete.
    #[must_use]
    pub fn current(&self) -> Option<&ImageRecord> {
        self.queue.get(self.current_index)
    }

    /// Rank of the finding currently under review (0-based).
    #[must_use]
    pub fn current_rank(&self) -> usize {
        self.num_result
    }

    /// Number of findings reviewed per image (K).
    #[must_use]
    pub fn num_findings(&self) -> usize {
        self.num_findings
    }

    /// Queue length (N).
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// The full queue, in review order.
    #[must_use]
    pub fn queue(&self) -> &[ImageRecord] {
        &self.queue
    }

    /// Where the session currently stands.
    #[must_use]
    pub fn progress(&self) -> Progress {
        if self.current_index >= self.queue.len() {
            Progress::Complete
        } else {
            Progress::Reviewing {
                image_index: self.current_index,
                finding_rank: self.num_result,
            }
        }
    }

    /// Advance to the next finding, or to the next image once the last
    /// finding of the current image has feedback.
    ///
    /// Legal only after feedback for the current finding exists in
    /// `store`; the interface layer must keep its "next" control
    /// disabled until then, and a call without pending feedback is a
    /// logic fault surfaced as [`ReviewError::MissingFeedback`].
    ///
    /// # Errors
    ///
    /// - [`ReviewError::SessionComplete`] in the terminal state.
    /// - [`ReviewError::MissingFeedback`] without a recorded feedback
    ///   record for the current finding.
    /// - [`ReviewError::CorruptState`] if the counters left their
    ///   bounds.
    pub fn advance(&mut self, store: &FeedbackStore) -> Result<Transition> {
        self.check_invariants()?;

        let image = self.current().ok_or(ReviewError::SessionComplete)?.clone();
        if !store.has_record(&image.filename, self.num_result) {
            return Err(ReviewError::MissingFeedback {
                filename: image.filename,
                rank: self.num_result,
            });
        }

        let transition = if self.num_result < self.num_findings - 1 {
            self.num_result += 1;
            Transition::NextFinding
        } else {
            self.current_index += 1;
            self.num_result = 0;
            if self.current_index == self.queue.len() {
                Transition::Finished {
                    completed: image.filename,
                }
            } else {
                Transition::NextImage {
                    completed: image.filename,
                }
            }
        };

        self.check_invariants()?;
        Ok(transition)
    }

    fn check_invariants(&self) -> Result<()> {
        if self.current_index > self.queue.len() {
            return Err(ReviewError::CorruptState(format!(
                "current_index {} beyond queue of {}",
                self.current_index,
                self.queue.len()
            )));
        }
        if self.num_result >= self.num_findings {
            return Err(ReviewError::CorruptState(format!(
                "num_result {} beyond {} findings per image",
                self.num_result, self.num_findings
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::{FeedbackRecord, FeedbackSelection};

    fn queue(n: usize) -> Vec<ImageRecord> {
        (0..n)
            .map(|i| ImageRecord::new(format!("img{i}.png"), format!("label{i}")))
            .collect()
    }

    fn record(rank: usize) -> FeedbackRecord {
        FeedbackRecord::new(rank, FeedbackSelection::confirmed())
    }

    #[test]
    fn test_initial_state() {
        let session = ReviewSession::new(queue(3), 3).unwrap();
        assert_eq!(
            session.progress(),
            Progress::Reviewing {
                image_index: 0,
                finding_rank: 0
            }
        );
    }

    #[test]
    fn test_zero_findings_rejected() {
        assert!(matches!(
            ReviewSession::new(queue(1), 0),
            Err(ReviewError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_empty_queue_is_complete() {
        let session = ReviewSession::new(vec![], 3).unwrap();
        assert_eq!(session.progress(), Progress::Complete);
        assert!(session.current().is_none());
    }

    #[test]
    fn test_advance_requires_feedback() {
        let mut session = ReviewSession::new(queue(2), 3).unwrap();
        let store = FeedbackStore::new();

        let result = session.advance(&store);
        assert!(matches!(
            result,
            Err(ReviewError::MissingFeedback { rank: 0, .. })
        ));
        // State unchanged by the rejected transition.
        assert_eq!(
            session.progress(),
            Progress::Reviewing {
                image_index: 0,
                finding_rank: 0
            }
        );
    }

    #[test]
    fn test_k_advances_reach_next_image_with_one_completion() {
        let mut session = ReviewSession::new(queue(2), 3).unwrap();
        let mut store = FeedbackStore::new();
        let mut completions = Vec::new();

        for rank in 0..3 {
            store.insert("img0.png", record(rank));
            let transition = session.advance(&store).unwrap();
            if let Some(completed) = transition.completes_image() {
                completions.push(completed.to_string());
            }
        }

        assert_eq!(
            session.progress(),
            Progress::Reviewing {
                image_index: 1,
                finding_rank: 0
            }
        );
        assert_eq!(completions, vec!["img0.png".to_string()]);
    }

    #[test]
    fn test_counters_stay_in_bounds() {
        let n_images = 4;
        let k = 3;
        let mut session = ReviewSession::new(queue(n_images), k).unwrap();
        let mut store = FeedbackStore::new();

        while let Progress::Reviewing {
            image_index,
            finding_rank,
        } = session.progress()
        {
            assert!(image_index < n_images);
            assert!(finding_rank < k);
            let filename = session.current().unwrap().filename.clone();
            store.insert(&filename, record(finding_rank));
            session.advance(&store).unwrap();
        }
        assert_eq!(session.progress(), Progress::Complete);
    }

    #[test]
    fn test_last_image_finishes_session() {
        let mut session = ReviewSession::new(queue(1), 2).unwrap();
        let mut store = FeedbackStore::new();

        store.insert("img0.png", record(0));
        assert_eq!(session.advance(&store).unwrap(), Transition::NextFinding);

        store.insert("img0.png", record(1));
        let transition = session.advance(&store).unwrap();
        assert_eq!(
            transition,
            Transition::Finished {
                completed: "img0.png".to_string()
            }
        );
        assert_eq!(session.progress(), Progress::Complete);
    }

    #[test]
    fn test_advance_past_terminal_is_rejected() {
        let mut session = ReviewSession::new(vec![], 3).unwrap();
        let store = FeedbackStore::new();
        assert!(matches!(
            session.advance(&store),
            Err(ReviewError::SessionComplete)
        ));
    }

    #[test]
    fn test_feedback_for_wrong_rank_does_not_unlock() {
        let mut session = ReviewSession::new(queue(1), 3).unwrap();
        let mut store = FeedbackStore::new();

        store.insert("img0.png", record(2));
        assert!(matches!(
            session.advance(&store),
            Err(ReviewError::MissingFeedback { rank: 0, .. })
        ));
    }
}
