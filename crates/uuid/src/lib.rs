//! Identifier utilities.
//!
//! Carelith uses two kinds of generated identifier:
//!
//! - [`GrantId`]: a *canonical* UUID for consent grants, **32 lowercase hexadecimal characters**
//!   (no hyphens). Externally supplied grant ids (REST paths, CLI arguments) must already be in
//!   this form; [`GrantId::parse`] rejects anything else.
//! - [`TimestampId`]: a millisecond UTC timestamp rendered as `YYYYMMDDTHHMMSS.mmmZ`, used to
//!   derive subject-scoped document identifiers such as
//!   `42_20260111T143522.045Z`. [`TimestampIdGenerator`] guarantees strictly increasing values
//!   for a subject when given the previous id.

mod service;

pub use service::{GrantId, TimestampId, TimestampIdGenerator, Uuid};

/// Error type for identifier operations.
#[derive(Debug, thiserror::Error)]
pub enum UuidError {
    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for identifier operations.
pub type UuidResult<T> = Result<T, UuidError>;
