//! Depot File Storage
//!
//! This crate stores opaque byte streams on the local filesystem and mirrors them across several
//! storage roots.
//!
//! ## Design Principles
//!
//! - Files are addressed by an opaque reference, never by a caller-chosen path
//! - References embed a date bucket, a generated unique name and, optionally, the original filename
//! - The first configured root is primary and receives every write synchronously
//! - Further roots are secondaries that receive copies asynchronously, best effort
//! - Failures affecting the primary copy are always returned to the caller
//! - Failures affecting a secondary copy are only reported to a failure handler
//!
//! ## Reference Format
//!
//! ```text
//! <year>/<month>/<day>/<generated-id>[.ext][*<percent-encoded original filename>]
//!
//! 2024/03/05/550e8400e29b41d4a716446655440000.pdf*report.pdf
//! ```
//!
//! ## Example Usage
//!
//! ```no_run
//! use depot_files::{FileStorage, StorageConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = StorageConfig::new("work").with_root_dirs("/data/primary,/data/secondary");
//! let storage = FileStorage::new(&config)?;
//!
//! let reference = storage.create_reference(Some("report.pdf"));
//! storage.save_stream(&reference, &mut [1u8, 2, 3].as_slice())?;
//! assert_eq!(storage.read(&reference)?, vec![1, 2, 3]);
//!
//! storage.shutdown();
//! # Ok(())
//! # }
//! ```

mod clock;
pub mod config;
mod constants;
mod files;
mod reference;
mod replication;
mod roots;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{ReadFallback, StorageConfig};
pub use constants::{DEFAULT_ROOT_DIR_NAME, DEFAULT_STORAGE_NAME, REFERENCE_SEPARATOR};
pub use depot_uuid::{FileId, IdGenerator, RandomIdGenerator};
pub use files::{FileInfo, FileStorage, StorageCollaborators};
pub use reference::{extract_original_filename, to_relative_path, FileReference, ReferenceCodec};
pub use replication::{
    LogFailureHandler, ReplicationFailure, ReplicationFailureHandler, ReplicationFailureReason,
    ReplicationPool, ReplicationTask,
};
pub use roots::StorageRootSet;

/// Errors that can occur during file storage operations
#[derive(Debug, thiserror::Error)]
pub enum FilesError {
    /// No roots are configured, or the primary root directory is missing
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Immutable storage refused to overwrite an existing file
    #[error("File {0} already exists in storage")]
    FileAlreadyExists(String),

    /// No storage root contains the referenced file
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// The reference string is malformed
    #[error("Invalid file reference: {0}")]
    InvalidReferenceFormat(String),

    /// A configuration value is missing or cannot be parsed
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
