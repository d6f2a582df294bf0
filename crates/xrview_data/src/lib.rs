//! # xrview_data
//!
//! Catalog and storage access for xrview.
//!
//! This crate provides:
//! - [`ObjectStore`] — read/write access to image and feedback blobs,
//!   gated by a caller-supplied [`AccessKey`]
//! - [`MetadataStore`] — the image catalog: filenames with ground-truth
//!   labels, sampled into a fixed-size review queue
//! - [`ObjectFeedbackSink`] — the persistence collaborator the review
//!   crate flushes through

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod catalog;
mod error;
mod sink;
mod store;

pub use catalog::MetadataStore;
pub use error::{DataError, Result};
pub use sink::ObjectFeedbackSink;
pub use store::{AccessKey, LocalObjectStore, MemoryObjectStore, ObjectStore};
