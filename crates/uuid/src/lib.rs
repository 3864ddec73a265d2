//! Unique identifiers for stored files.
//!
//! Depot names every stored file after a freshly generated UUID. To keep references stable and
//! easy to compare, identifiers always use the *canonical* representation: **32 lowercase
//! hexadecimal characters** (no hyphens).
//!
//! This crate provides:
//! - [`FileId`], a wrapper that guarantees canonical form once constructed.
//! - [`IdGenerator`], the seam through which the storage service obtains new identifiers, with
//!   [`RandomIdGenerator`] as the production implementation.
//!
//! ## Canonical form
//! - Length: 32
//! - Characters: `0-9` and `a-f` only
//! - Example: `550e8400e29b41d4a716446655440000`
//!
//! Uniqueness comes from UUID version 4, so no coordination between processes writing into the
//! same storage roots is needed.

mod service;

pub use service::{FileId, IdGenerator, RandomIdGenerator, Uuid};

/// Error type for identifier operations.
#[derive(Debug, thiserror::Error)]
pub enum UuidError {
    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for identifier operations.
pub type UuidResult<T> = Result<T, UuidError>;
