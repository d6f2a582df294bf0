//! # xrview
//!
//! Human review of an image classifier's top findings on chest X-rays.
//!
//! For each image in a sampled queue, the pipeline surfaces the model's
//! top-K findings, renders a grid of attribution overlays (one per CAM
//! method) for the finding under review, and records structured
//! reviewer feedback that is persisted when the image's review
//! completes.
//!
//! - **Catalog and storage**: queue sampling, blob access ([`data`])
//! - **Model adapter**: preprocessing, inference, top-k ([`model`])
//! - **Explanation**: CAM registry, scoped capture, grid ([`explain`])
//! - **Review**: session state machine, feedback store ([`review`])
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use xrview::prelude::*;
//!
//! let catalog = MetadataStore::from_store(&store)?;
//! let queue = catalog.sample(10, Seed::new(42));
//! let mut session = ReviewSession::new(queue, 3)?;
//! let mut feedback = FeedbackStore::new();
//!
//! while let Progress::Reviewing { finding_rank, .. } = session.progress() {
//!     let image = session.current().unwrap().clone();
//!     let (display, input) = adapter.preprocess(&store.get(&image.filename)?)?;
//!     let probs = adapter.infer(input.clone())?;
//!     let finding = &adapter.findings(&probs, 3)?[finding_rank];
//!     let grid = aggregator.compute_grid(adapter.model(), &input, &display, finding.class_id);
//!     // ...show grid, collect the reviewer's selection...
//!     submit_and_flush(&mut session, &mut feedback, selection, &session_id, &mut sink)?;
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

// Re-export all crates
pub use xrview_core as core;
pub use xrview_data as data;
pub use xrview_explain as explain;
pub use xrview_model as model;
pub use xrview_review as review;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use xrview::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use xrview_core::{Seed, SessionId};

    // Data
    pub use xrview_data::{
        AccessKey, LocalObjectStore, MemoryObjectStore, MetadataStore, ObjectFeedbackSink,
        ObjectStore,
    };

    // Model
    pub use xrview_model::{
        ChestClassifier, ConvClassifier, ConvClassifierConfig, Finding, ModelAdapter, XRV_LABELS,
    };

    // Explain
    pub use xrview_explain::{
        AggregatorConfig, CamMethod, ExplanationAggregator, ExplanationGrid, GridCell,
    };

    // Review
    pub use xrview_review::{
        submit_and_flush, submit_feedback, FeedbackRecord, FeedbackSelection, FeedbackStore,
        ImageRecord, Progress, ReviewSession, SubmitOutcome, Transition,
    };
}
