//! Core types shared by the flowlab crates.
//!
//! This crate provides the `Result` alias used at reporting boundaries and
//! the ULID-backed identifiers for simulation runs and graph snapshots.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{GraphVersionId, ParseIdError, RunId};
