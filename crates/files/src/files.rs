//! Multi-root file storage service.
//!
//! [`FileStorage`] stores byte streams under date-bucketed paths and mirrors them into secondary
//! roots in the background.
//!
//! # Storage Layout
//!
//! Every root holds the same tree; only the primary is written synchronously:
//!
//! ```text
//! <root>/
//! └── 2024/
//!     └── 03/
//!         └── 05/
//!             └── 550e8400e29b41d4a716446655440000.pdf
//! ```
//!
//! # Guarantees
//!
//! - A successful [`FileStorage::save_stream`] means the bytes are committed in the primary root.
//! - Secondary copies are eventually consistent and best effort. Their failures are reported to
//!   the configured [`ReplicationFailureHandler`] and never to the caller.
//! - Reads take the first root that has the file; removals visit every root.

use crate::clock::{Clock, SystemClock};
use crate::config::{ReadFallback, StorageConfig};
use crate::reference::{FileReference, ReferenceCodec};
use crate::replication::{
    LogFailureHandler, ReplicationFailureHandler, ReplicationPool, ReplicationTask,
};
use crate::roots::StorageRootSet;
use crate::FilesError;
use chrono::{DateTime, Utc};
use depot_uuid::{IdGenerator, RandomIdGenerator};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Metadata for a stored file.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct FileInfo {
    /// Canonical reference string
    pub reference: String,

    /// Original filename recorded in the reference (empty if none)
    pub original_filename: String,

    /// Path relative to the storage root
    pub relative_path: PathBuf,

    /// Root the file was found in
    pub root: PathBuf,

    /// Size of the file in bytes
    pub size_bytes: u64,

    /// Last modification time of the stored copy, if the platform reports one
    pub modified_at: Option<DateTime<Utc>>,

    /// Detected media type (MIME type), if available
    ///
    /// Best-effort magic-byte detection; not authoritative.
    pub media_type: Option<String>,
}

/// Collaborators injected into a [`FileStorage`].
#[derive(Clone)]
pub struct StorageCollaborators {
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn IdGenerator>,
    pub on_replication_failure: Arc<dyn ReplicationFailureHandler>,
}

impl Default for StorageCollaborators {
    fn default() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            ids: Arc::new(RandomIdGenerator),
            on_replication_failure: Arc::new(LogFailureHandler),
        }
    }
}

/// File storage over a primary root and optional secondary roots.
///
/// The root set is resolved when the service is constructed and the replication pool lives as
/// long as the service. Call [`FileStorage::shutdown`] to wait for queued copies; dropping the
/// service does the same.
#[derive(Debug)]
pub struct FileStorage {
    storage_name: String,
    roots: StorageRootSet,
    codec: ReferenceCodec,
    immutable: bool,
    read_fallback: ReadFallback,
    replication: ReplicationPool,
}

impl FileStorage {
    /// Creates a service with the system clock, random ids and logging failure handler.
    ///
    /// # Errors
    ///
    /// Returns `FilesError` if the default root cannot be created or the replication pool cannot
    /// be started.
    pub fn new(config: &StorageConfig) -> Result<Self, FilesError> {
        Self::with_collaborators(config, StorageCollaborators::default())
    }

    /// Creates a service with explicit collaborators.
    ///
    /// # Errors
    ///
    /// Same as [`FileStorage::new`].
    pub fn with_collaborators(
        config: &StorageConfig,
        collaborators: StorageCollaborators,
    ) -> Result<Self, FilesError> {
        let roots = StorageRootSet::resolve(config.root_dirs(), config.work_dir())?;
        Self::with_roots(config, roots, collaborators)
    }

    /// Creates a service over an already resolved root set. `config.root_dirs()` is ignored.
    ///
    /// # Errors
    ///
    /// Returns `FilesError` if the replication pool cannot be started.
    pub fn with_roots(
        config: &StorageConfig,
        roots: StorageRootSet,
        collaborators: StorageCollaborators,
    ) -> Result<Self, FilesError> {
        let replication = ReplicationPool::start(
            config.replication_workers(),
            config.replication_queue_capacity(),
            collaborators.on_replication_failure,
        )?;

        Ok(Self {
            storage_name: config.storage_name().to_owned(),
            roots,
            codec: ReferenceCodec::new(collaborators.clock, collaborators.ids),
            immutable: config.immutable(),
            read_fallback: config.read_fallback(),
            replication,
        })
    }

    pub fn storage_name(&self) -> &str {
        &self.storage_name
    }

    pub fn roots(&self) -> &StorageRootSet {
        &self.roots
    }

    /// Creates a reference for a new file. No I/O is performed.
    pub fn create_reference(&self, original_filename: Option<&str>) -> FileReference {
        self.codec.create_reference(original_filename)
    }

    /// Writes `input` to the primary root and schedules copies to every secondary root.
    ///
    /// Returns the number of bytes written to the primary root. The call does not wait for the
    /// secondary copies.
    ///
    /// # Errors
    ///
    /// Returns `FilesError` if:
    /// - No roots are configured or the primary root is missing (`StorageUnavailable`)
    /// - Immutable mode is on and the file exists (`FileAlreadyExists`)
    /// - The file exists, or creating, copying or flushing fails (`Io`); a partial file is removed
    pub fn save_stream<R>(
        &self,
        reference: &FileReference,
        input: &mut R,
    ) -> Result<u64, FilesError>
    where
        R: Read + ?Sized,
    {
        let primary = self.roots.primary().ok_or_else(|| {
            FilesError::StorageUnavailable("no storage roots are configured".into())
        })?;

        if !primary.is_dir() {
            return Err(FilesError::StorageUnavailable(format!(
                "primary storage root does not exist: {}",
                primary.display()
            )));
        }

        let relative_path = reference.relative_path();
        let storage_path = primary.join(&relative_path);

        // Immutability check
        if self.immutable && storage_path.exists() {
            return Err(FilesError::FileAlreadyExists(reference.to_string()));
        }

        let size = write_new_file(&storage_path, input)?;

        for secondary in self.roots.secondaries() {
            if !secondary.is_dir() {
                tracing::warn!(
                    "secondary storage root {} does not exist, skipping replication of {}",
                    secondary.display(),
                    reference
                );
                continue;
            }
            self.replication.submit(ReplicationTask::new(
                &storage_path,
                secondary.join(&relative_path),
            ));
        }

        Ok(size)
    }

    /// Opens the stored file from the first root that has it.
    ///
    /// # Errors
    ///
    /// Returns `FileNotFound` if no root contains the file, or if a root contains it but it
    /// cannot be opened. Under [`ReadFallback::Strict`] the first failed open ends the search;
    /// under [`ReadFallback::NextRoot`] later roots are tried before giving up.
    pub fn open_stream(&self, reference: &FileReference) -> Result<fs::File, FilesError> {
        self.open_first(reference, |path| fs::File::open(path))
    }

    /// Applies `open` to the file in the first root that has it, honouring the read policy.
    fn open_first<T, F>(&self, reference: &FileReference, open: F) -> Result<T, FilesError>
    where
        F: Fn(&Path) -> io::Result<T>,
    {
        let relative_path = reference.relative_path();

        for root in self.roots.iter() {
            let path = root.join(&relative_path);
            if !path.is_file() {
                continue;
            }

            match open(&path) {
                Ok(file) => return Ok(file),
                Err(e) if self.read_fallback == ReadFallback::NextRoot => {
                    tracing::warn!(
                        "failed to open {}, trying next root: {}",
                        path.display(),
                        e
                    );
                }
                Err(e) => {
                    tracing::error!("failed to open {}: {}", path.display(), e);
                    break;
                }
            }
        }

        Err(FilesError::FileNotFound(reference.to_string()))
    }

    /// Reads the whole stored file into memory.
    ///
    /// # Errors
    ///
    /// Same as [`FileStorage::open_stream`], plus `Io` if reading fails.
    pub fn read(&self, reference: &FileReference) -> Result<Vec<u8>, FilesError> {
        let mut file = self.open_stream(reference)?;
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer).map_err(|e| {
            FilesError::Io(io::Error::new(
                e.kind(),
                format!("Failed to read {}: {}", reference, e),
            ))
        })?;
        Ok(buffer)
    }

    /// Returns true if any root contains the file.
    pub fn file_exists(&self, reference: &FileReference) -> bool {
        let relative_path = reference.relative_path();
        self.roots
            .iter()
            .any(|root| root.join(&relative_path).exists())
    }

    /// Deletes the file from every root that has it.
    ///
    /// Removing a file that no root contains is not an error.
    ///
    /// # Errors
    ///
    /// Returns `FilesError::Io` on the first failed deletion. Copies already deleted from earlier
    /// roots stay deleted.
    pub fn remove_file(&self, reference: &FileReference) -> Result<(), FilesError> {
        let relative_path = reference.relative_path();

        for root in self.roots.iter() {
            let path = root.join(&relative_path);
            if !path.exists() {
                continue;
            }
            fs::remove_file(&path).map_err(|e| {
                FilesError::Io(io::Error::new(
                    e.kind(),
                    format!("Failed to delete {}: {}", path.display(), e),
                ))
            })?;
            tracing::debug!("deleted {}", path.display());
        }

        Ok(())
    }

    /// Describes the stored file as found in the first root that has it.
    ///
    /// # Errors
    ///
    /// Returns `FileNotFound` if no root contains the file, or `Io` if its metadata cannot be
    /// read.
    pub fn file_info(&self, reference: &FileReference) -> Result<FileInfo, FilesError> {
        let relative_path = reference.relative_path();

        let (root, path) = self
            .roots
            .iter()
            .map(|root| (root, root.join(&relative_path)))
            .find(|(_, path)| path.is_file())
            .ok_or_else(|| FilesError::FileNotFound(reference.to_string()))?;

        let metadata = fs::metadata(&path).map_err(|e| {
            FilesError::Io(io::Error::new(
                e.kind(),
                format!("Failed to read metadata of {}: {}", path.display(), e),
            ))
        })?;

        // Detect media type (best-effort)
        let media_type = infer::get_from_path(&path)
            .ok()
            .flatten()
            .map(|kind| kind.mime_type().to_owned());

        Ok(FileInfo {
            reference: reference.to_string(),
            original_filename: reference.original_filename().to_owned(),
            relative_path,
            root: root.to_path_buf(),
            size_bytes: metadata.len(),
            modified_at: metadata.modified().ok().map(DateTime::<Utc>::from),
            media_type,
        })
    }

    /// Stops the replication pool after queued copies finish.
    pub fn shutdown(self) {
        self.replication.shutdown();
    }
}

/// Creates `path` exclusively and streams `input` into it.
///
/// On failure the partially written file is removed.
fn write_new_file<R>(path: &Path, input: &mut R) -> Result<u64, FilesError>
where
    R: Read + ?Sized,
{
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            FilesError::Io(io::Error::new(
                e.kind(),
                format!(
                    "Failed to create storage directory {}: {}",
                    parent.display(),
                    e
                ),
            ))
        })?;
    }

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| {
            FilesError::Io(io::Error::new(
                e.kind(),
                format!("Failed to create {}: {}", path.display(), e),
            ))
        })?;

    let written = io::copy(input, &mut file).and_then(|size| {
        file.flush()?;
        Ok(size)
    });

    match written {
        Ok(size) => Ok(size),
        Err(e) => {
            drop(file);
            let _ = fs::remove_file(path);
            Err(FilesError::Io(io::Error::new(
                e.kind(),
                format!("Failed to write {}: {}", path.display(), e),
            )))
        }
    }
}
