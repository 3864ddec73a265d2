//! Storage root resolution.
//!
//! Roots are resolved once, when the storage service is constructed, and never change for the
//! life of that service. Changing configuration afterwards requires building a new service.

use crate::constants::DEFAULT_ROOT_DIR_NAME;
use crate::FilesError;
use std::fs;
use std::path::{Path, PathBuf};

/// Ordered storage roots: index 0 is primary, the rest are secondaries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageRootSet {
    roots: Vec<PathBuf>,
}

impl StorageRootSet {
    /// Resolves the root list.
    ///
    /// A blank `configured` value yields `<fallback_work_dir>/filestorage`, which is created if
    /// missing. Otherwise the comma-separated entries are trimmed and de-duplicated in first-seen
    /// order; those directories are not created.
    ///
    /// # Errors
    ///
    /// Returns [`FilesError::Io`] if the fallback directory cannot be created.
    pub fn resolve(configured: Option<&str>, fallback_work_dir: &Path) -> Result<Self, FilesError> {
        let configured = configured.map(str::trim).filter(|value| !value.is_empty());

        let Some(configured) = configured else {
            let dir = fallback_work_dir.join(DEFAULT_ROOT_DIR_NAME);
            fs::create_dir_all(&dir).map_err(|e| {
                FilesError::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create default storage root {}: {}",
                        dir.display(),
                        e
                    ),
                ))
            })?;
            tracing::info!("using default storage root {}", dir.display());
            return Ok(Self { roots: vec![dir] });
        };

        let mut roots: Vec<PathBuf> = Vec::new();
        for entry in configured.split(',').map(str::trim) {
            if entry.is_empty() {
                continue;
            }
            let path = PathBuf::from(entry);
            if !roots.contains(&path) {
                roots.push(path);
            }
        }

        tracing::info!(
            "resolved {} storage root(s): {}",
            roots.len(),
            roots
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(Self { roots })
    }

    /// Builds a root set from explicit paths, de-duplicating in order.
    pub fn from_paths<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut roots: Vec<PathBuf> = Vec::new();
        for path in paths {
            let path = path.into();
            if !roots.contains(&path) {
                roots.push(path);
            }
        }
        Self { roots }
    }

    pub fn primary(&self) -> Option<&Path> {
        self.roots.first().map(PathBuf::as_path)
    }

    pub fn secondaries(&self) -> &[PathBuf] {
        self.roots.get(1..).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.roots.iter().map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_blank_configuration_uses_work_dir() {
        let temp = TempDir::new().unwrap();
        let work = temp.path().join("work");

        for configured in [None, Some(""), Some("   ")] {
            let roots = StorageRootSet::resolve(configured, &work).unwrap();

            assert_eq!(roots.len(), 1);
            assert_eq!(roots.primary(), Some(work.join("filestorage").as_path()));
            assert!(roots.secondaries().is_empty());
            assert!(work.join("filestorage").is_dir());
        }
    }

    #[test]
    fn test_configured_roots_trimmed_and_deduplicated() {
        let temp = TempDir::new().unwrap();

        let roots = StorageRootSet::resolve(
            Some(" /data/primary , /data/secondary,/data/primary,, /data/third "),
            temp.path(),
        )
        .unwrap();

        let resolved: Vec<&Path> = roots.iter().collect();
        assert_eq!(
            resolved,
            vec![
                Path::new("/data/primary"),
                Path::new("/data/secondary"),
                Path::new("/data/third"),
            ]
        );
        assert_eq!(roots.primary(), Some(Path::new("/data/primary")));
        assert_eq!(roots.secondaries().len(), 2);
    }

    #[test]
    fn test_configured_roots_are_not_created() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("missing");

        let roots =
            StorageRootSet::resolve(Some(missing.to_str().unwrap()), temp.path()).unwrap();

        assert_eq!(roots.primary(), Some(missing.as_path()));
        assert!(!missing.exists());
        assert!(!temp.path().join("filestorage").exists());
    }

    #[test]
    fn test_only_separators_yields_empty_set() {
        let temp = TempDir::new().unwrap();
        let roots = StorageRootSet::resolve(Some(" , ,"), temp.path()).unwrap();

        assert!(roots.is_empty());
        assert_eq!(roots.primary(), None);
        assert!(roots.secondaries().is_empty());
    }

    #[test]
    fn test_fallback_creation_failure_is_io_error() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("blocker");
        fs::write(&blocker, b"not a directory").unwrap();

        let result = StorageRootSet::resolve(None, &blocker);

        assert!(matches!(result, Err(FilesError::Io(_))));
    }

    #[test]
    fn test_from_paths_deduplicates() {
        let roots = StorageRootSet::from_paths(["/a", "/b", "/a"]);

        assert_eq!(roots.len(), 2);
        assert_eq!(roots.secondaries(), &[PathBuf::from("/b")]);
    }
}
