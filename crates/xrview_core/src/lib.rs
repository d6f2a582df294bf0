//! # xrview_core
//!
//! Core primitives shared across the xrview workspace.
//!
//! This crate provides:
//! - [`Seed`] for deterministic random number generation (catalog sampling,
//!   session-id derivation)
//! - [`SessionId`] identifying one reviewer session, used to partition
//!   persisted feedback
//! - Error types and common utilities

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod seed;
mod session;

pub use error::{CoreError, Result};
pub use seed::Seed;
pub use session::SessionId;
