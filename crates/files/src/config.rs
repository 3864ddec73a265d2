//! Storage configuration.
//!
//! Configuration is resolved once at process startup and passed into [`crate::FileStorage`].
//! Library code never reads environment variables itself; binaries call
//! [`StorageConfig::from_lookup`] with `std::env::var` so tests can supply values directly.

use crate::constants::{
    DEFAULT_REPLICATION_QUEUE_CAPACITY, DEFAULT_REPLICATION_WORKERS, DEFAULT_STORAGE_NAME,
};
use crate::FilesError;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const ENV_STORAGE_DIRS: &str = "DEPOT_STORAGE_DIRS";
pub const ENV_WORK_DIR: &str = "DEPOT_WORK_DIR";
pub const ENV_IMMUTABLE: &str = "DEPOT_IMMUTABLE";
pub const ENV_REPLICATION_WORKERS: &str = "DEPOT_REPLICATION_WORKERS";
pub const ENV_REPLICATION_QUEUE: &str = "DEPOT_REPLICATION_QUEUE";
pub const ENV_READ_FALLBACK: &str = "DEPOT_READ_FALLBACK";
pub const ENV_STORAGE_NAME: &str = "DEPOT_STORAGE_NAME";

/// Work directory used when `DEPOT_WORK_DIR` is unset.
pub const DEFAULT_WORK_DIR: &str = "work";

/// What a read does when a root contains the file but opening it fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReadFallback {
    /// Log the error and fail with `FileNotFound` without trying later roots.
    #[default]
    Strict,
    /// Log the error and try the next root.
    NextRoot,
}

impl FromStr for ReadFallback {
    type Err = FilesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "next-root" | "next_root" => Ok(Self::NextRoot),
            other => Err(FilesError::InvalidConfig(format!(
                "read fallback must be 'strict' or 'next-root', got: '{}'",
                other
            ))),
        }
    }
}

/// Settings for a [`crate::FileStorage`] instance.
#[derive(Clone, Debug)]
pub struct StorageConfig {
    storage_name: String,
    root_dirs: Option<String>,
    work_dir: PathBuf,
    immutable: bool,
    replication_workers: usize,
    replication_queue_capacity: usize,
    read_fallback: ReadFallback,
}

impl StorageConfig {
    /// Creates a configuration with defaults and no explicit roots.
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            storage_name: DEFAULT_STORAGE_NAME.to_owned(),
            root_dirs: None,
            work_dir: work_dir.into(),
            immutable: false,
            replication_workers: DEFAULT_REPLICATION_WORKERS,
            replication_queue_capacity: DEFAULT_REPLICATION_QUEUE_CAPACITY,
            read_fallback: ReadFallback::default(),
        }
    }

    /// Sets the comma-separated list of root directories (primary first).
    pub fn with_root_dirs(mut self, root_dirs: impl Into<String>) -> Self {
        self.root_dirs = Some(root_dirs.into());
        self
    }

    pub fn with_immutable(mut self, immutable: bool) -> Self {
        self.immutable = immutable;
        self
    }

    pub fn with_replication_workers(mut self, workers: usize) -> Self {
        self.replication_workers = workers;
        self
    }

    pub fn with_replication_queue_capacity(mut self, capacity: usize) -> Self {
        self.replication_queue_capacity = capacity;
        self
    }

    pub fn with_read_fallback(mut self, read_fallback: ReadFallback) -> Self {
        self.read_fallback = read_fallback;
        self
    }

    /// # Errors
    ///
    /// Returns [`FilesError::InvalidConfig`] if `name` is blank.
    pub fn with_storage_name(mut self, name: impl AsRef<str>) -> Result<Self, FilesError> {
        let name = name.as_ref().trim();
        if name.is_empty() {
            return Err(FilesError::InvalidConfig(
                "storage name cannot be empty".into(),
            ));
        }
        self.storage_name = name.to_owned();
        Ok(self)
    }

    /// Builds a configuration from a key lookup, typically `|k| std::env::var(k).ok()`.
    ///
    /// Missing or blank values fall back to defaults.
    ///
    /// # Errors
    ///
    /// Returns [`FilesError::InvalidConfig`] for values that cannot be parsed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, FilesError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        };

        let work_dir = value(ENV_WORK_DIR).unwrap_or_else(|| DEFAULT_WORK_DIR.to_owned());
        let mut config = Self::new(work_dir);

        if let Some(root_dirs) = value(ENV_STORAGE_DIRS) {
            config = config.with_root_dirs(root_dirs);
        }
        if let Some(immutable) = value(ENV_IMMUTABLE) {
            config = config.with_immutable(parse_bool(ENV_IMMUTABLE, &immutable)?);
        }
        if let Some(workers) = value(ENV_REPLICATION_WORKERS) {
            config = config.with_replication_workers(parse_positive(
                ENV_REPLICATION_WORKERS,
                &workers,
            )?);
        }
        if let Some(capacity) = value(ENV_REPLICATION_QUEUE) {
            config = config.with_replication_queue_capacity(parse_positive(
                ENV_REPLICATION_QUEUE,
                &capacity,
            )?);
        }
        if let Some(fallback) = value(ENV_READ_FALLBACK) {
            config = config.with_read_fallback(fallback.parse()?);
        }
        if let Some(name) = value(ENV_STORAGE_NAME) {
            config = config.with_storage_name(name)?;
        }

        Ok(config)
    }

    pub fn storage_name(&self) -> &str {
        &self.storage_name
    }

    pub fn root_dirs(&self) -> Option<&str> {
        self.root_dirs.as_deref()
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn immutable(&self) -> bool {
        self.immutable
    }

    pub fn replication_workers(&self) -> usize {
        self.replication_workers
    }

    pub fn replication_queue_capacity(&self) -> usize {
        self.replication_queue_capacity
    }

    pub fn read_fallback(&self) -> ReadFallback {
        self.read_fallback
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, FilesError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(FilesError::InvalidConfig(format!(
            "{} must be a boolean, got: '{}'",
            key, value
        ))),
    }
}

fn parse_positive(key: &str, value: &str) -> Result<usize, FilesError> {
    match value.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(FilesError::InvalidConfig(format!(
            "{} must be a positive integer, got: '{}'",
            key, value
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_from_empty_lookup() {
        let config = StorageConfig::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config.storage_name(), "fs");
        assert_eq!(config.root_dirs(), None);
        assert_eq!(config.work_dir(), Path::new("work"));
        assert!(!config.immutable());
        assert_eq!(config.replication_workers(), 5);
        assert_eq!(config.replication_queue_capacity(), 1024);
        assert_eq!(config.read_fallback(), ReadFallback::Strict);
    }

    #[test]
    fn test_values_from_lookup() {
        let config = StorageConfig::from_lookup(lookup(&[
            (ENV_STORAGE_DIRS, "/data/primary,/data/secondary"),
            (ENV_WORK_DIR, "/var/lib/depot"),
            (ENV_IMMUTABLE, "Yes"),
            (ENV_REPLICATION_WORKERS, "2"),
            (ENV_REPLICATION_QUEUE, "16"),
            (ENV_READ_FALLBACK, "next-root"),
            (ENV_STORAGE_NAME, " archive "),
        ]))
        .unwrap();

        assert_eq!(config.root_dirs(), Some("/data/primary,/data/secondary"));
        assert_eq!(config.work_dir(), Path::new("/var/lib/depot"));
        assert!(config.immutable());
        assert_eq!(config.replication_workers(), 2);
        assert_eq!(config.replication_queue_capacity(), 16);
        assert_eq!(config.read_fallback(), ReadFallback::NextRoot);
        assert_eq!(config.storage_name(), "archive");
    }

    #[test]
    fn test_blank_values_fall_back_to_defaults() {
        let config = StorageConfig::from_lookup(lookup(&[
            (ENV_STORAGE_DIRS, "  "),
            (ENV_IMMUTABLE, ""),
        ]))
        .unwrap();

        assert_eq!(config.root_dirs(), None);
        assert!(!config.immutable());
    }

    #[test]
    fn test_invalid_values_rejected() {
        for (key, value) in [
            (ENV_IMMUTABLE, "maybe"),
            (ENV_REPLICATION_WORKERS, "0"),
            (ENV_REPLICATION_WORKERS, "five"),
            (ENV_REPLICATION_QUEUE, "-1"),
            (ENV_READ_FALLBACK, "random"),
        ] {
            let result = StorageConfig::from_lookup(lookup(&[(key, value)]));
            assert!(
                matches!(result, Err(FilesError::InvalidConfig(_))),
                "accepted {}={}",
                key,
                value
            );
        }
    }

    #[test]
    fn test_blank_storage_name_rejected() {
        let result = StorageConfig::new("work").with_storage_name("   ");
        assert!(matches!(result, Err(FilesError::InvalidConfig(_))));
    }
}
