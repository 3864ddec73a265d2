//! Best-effort replication of stored files into secondary roots.
//!
//! A [`ReplicationPool`] owns a fixed number of worker threads fed by a bounded queue. Submitting
//! never blocks the caller: when the queue is full, or the pool has shut down, the task is handed
//! to the [`ReplicationFailureHandler`] instead. Failed copies are reported the same way and are
//! never retried.
//!
//! Shutdown is orderly. Closing the queue lets workers drain whatever was already accepted, then
//! the workers are joined. It happens once, either through [`ReplicationPool::shutdown`] or when
//! the pool is dropped.

use crate::FilesError;
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Copy of one stored file into one secondary root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplicationTask {
    /// File in the primary root.
    pub source: PathBuf,
    /// Destination in the secondary root.
    pub target: PathBuf,
}

impl ReplicationTask {
    pub fn new(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }

    /// Copies through a sibling temporary file and renames it over the target, so readers of the
    /// secondary root never see a partial file.
    ///
    /// Returns `None` when the source was removed while the copy was in flight. The staged copy is
    /// discarded then, so a concurrent removal is not undone by the rename.
    fn run(&self) -> std::io::Result<Option<u64>> {
        if let Some(parent) = self.target.parent() {
            fs::create_dir_all(parent)?;
        }

        let staging = staging_path(&self.target);
        let copied = fs::copy(&self.source, &staging).and_then(|bytes| {
            Ok(self.publish(&staging)?.then_some(bytes))
        });

        if copied.is_err() {
            let _ = fs::remove_file(&staging);
        }
        copied
    }

    /// Moves `staging` over the target if the source still exists, otherwise deletes it.
    fn publish(&self, staging: &Path) -> std::io::Result<bool> {
        if !self.source.exists() {
            fs::remove_file(staging)?;
            return Ok(false);
        }
        fs::rename(staging, &self.target)?;
        Ok(true)
    }
}

fn staging_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{}.part", name))
}

/// Why a replication task did not complete.
#[derive(Debug, thiserror::Error)]
pub enum ReplicationFailureReason {
    #[error("replication queue is full")]
    QueueFull,

    #[error("replication pool has shut down")]
    Closed,

    #[error("copy failed: {0}")]
    Copy(#[source] std::io::Error),
}

#[derive(Debug)]
pub struct ReplicationFailure {
    pub task: ReplicationTask,
    pub reason: ReplicationFailureReason,
}

/// Receives every replication failure. Called from worker threads for copy errors and from the
/// submitting thread for rejected submissions.
pub trait ReplicationFailureHandler: Send + Sync {
    fn on_failure(&self, failure: &ReplicationFailure);
}

impl<F> ReplicationFailureHandler for F
where
    F: Fn(&ReplicationFailure) + Send + Sync,
{
    fn on_failure(&self, failure: &ReplicationFailure) {
        self(failure)
    }
}

/// Default handler: logs the failure.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogFailureHandler;

impl ReplicationFailureHandler for LogFailureHandler {
    fn on_failure(&self, failure: &ReplicationFailure) {
        tracing::error!(
            "failed to replicate {} to {}: {}",
            failure.task.source.display(),
            failure.task.target.display(),
            failure.reason
        );
    }
}

/// Fixed-size worker pool for replication tasks.
pub struct ReplicationPool {
    sender: Option<Sender<ReplicationTask>>,
    workers: Vec<JoinHandle<()>>,
    on_failure: Arc<dyn ReplicationFailureHandler>,
}

impl std::fmt::Debug for ReplicationPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicationPool")
            .field("workers", &self.workers.len())
            .field("open", &self.sender.is_some())
            .finish()
    }
}

impl ReplicationPool {
    /// Starts `workers` threads sharing a queue of `capacity` tasks.
    ///
    /// # Errors
    ///
    /// Returns [`FilesError::InvalidConfig`] if either size is zero, or [`FilesError::Io`] if a
    /// worker thread cannot be spawned (workers already started are shut down).
    pub fn start(
        workers: usize,
        capacity: usize,
        on_failure: Arc<dyn ReplicationFailureHandler>,
    ) -> Result<Self, FilesError> {
        if workers == 0 {
            return Err(FilesError::InvalidConfig(
                "replication pool needs at least one worker".into(),
            ));
        }
        if capacity == 0 {
            return Err(FilesError::InvalidConfig(
                "replication queue capacity must be positive".into(),
            ));
        }

        let (sender, receiver) = channel::bounded(capacity);
        let mut pool = Self {
            sender: Some(sender),
            workers: Vec::with_capacity(workers),
            on_failure,
        };

        for index in 0..workers {
            let receiver = receiver.clone();
            let on_failure = Arc::clone(&pool.on_failure);
            let handle = thread::Builder::new()
                .name(format!("depot-replica-{}", index))
                .spawn(move || run_worker(receiver, on_failure))
                .map_err(|e| {
                    FilesError::Io(std::io::Error::new(
                        e.kind(),
                        format!("Failed to spawn replication worker {}: {}", index, e),
                    ))
                })?;
            pool.workers.push(handle);
        }

        tracing::info!(
            "replication pool started with {} worker(s), queue capacity {}",
            workers,
            capacity
        );
        Ok(pool)
    }

    /// Queues a task without blocking. Rejected tasks go to the failure handler.
    pub fn submit(&self, task: ReplicationTask) {
        let Some(sender) = &self.sender else {
            self.reject(task, ReplicationFailureReason::Closed);
            return;
        };

        match sender.try_send(task) {
            Ok(()) => {}
            Err(TrySendError::Full(task)) => self.reject(task, ReplicationFailureReason::QueueFull),
            Err(TrySendError::Disconnected(task)) => {
                self.reject(task, ReplicationFailureReason::Closed)
            }
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Stops accepting tasks, lets workers finish queued copies, and joins them.
    pub fn shutdown(mut self) {
        self.close();
    }

    fn reject(&self, task: ReplicationTask, reason: ReplicationFailureReason) {
        self.on_failure
            .on_failure(&ReplicationFailure { task, reason });
    }

    fn close(&mut self) {
        if self.sender.take().is_none() && self.workers.is_empty() {
            return;
        }

        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                tracing::error!("replication worker panicked");
            }
        }
        tracing::info!("replication pool stopped");
    }
}

impl Drop for ReplicationPool {
    fn drop(&mut self) {
        self.close();
    }
}

fn run_worker(receiver: Receiver<ReplicationTask>, on_failure: Arc<dyn ReplicationFailureHandler>) {
    for task in receiver.iter() {
        match task.run() {
            Ok(Some(bytes)) => tracing::debug!(
                "replicated {} bytes to {}",
                bytes,
                task.target.display()
            ),
            Ok(None) => tracing::debug!(
                "source {} removed during replication, discarded copy",
                task.source.display()
            ),
            Err(e) => on_failure.on_failure(&ReplicationFailure {
                task,
                reason: ReplicationFailureReason::Copy(e),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    fn recording_handler() -> (Arc<Mutex<Vec<String>>>, Arc<dyn ReplicationFailureHandler>) {
        let recorded = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&recorded);
        let handler = move |failure: &ReplicationFailure| {
            sink.lock().unwrap().push(failure.reason.to_string());
        };
        (recorded, Arc::new(handler))
    }

    #[test]
    fn test_start_rejects_zero_sizes() {
        let (_, handler) = recording_handler();

        assert!(matches!(
            ReplicationPool::start(0, 4, Arc::clone(&handler)),
            Err(FilesError::InvalidConfig(_))
        ));
        assert!(matches!(
            ReplicationPool::start(2, 0, handler),
            Err(FilesError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_task_copies_into_nested_target() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("source.bin");
        fs::write(&source, b"replica bytes").unwrap();
        let target = temp.path().join("secondary/2024/03/05/source.bin");

        let (recorded, handler) = recording_handler();
        let pool = ReplicationPool::start(2, 8, handler).unwrap();
        assert_eq!(pool.worker_count(), 2);

        pool.submit(ReplicationTask::new(&source, &target));
        pool.shutdown();

        assert_eq!(fs::read(&target).unwrap(), b"replica bytes");
        assert!(!staging_path(&target).exists());
        assert!(recorded.lock().unwrap().is_empty());
    }

    #[test]
    fn test_task_replaces_existing_target() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("source.bin");
        let target = temp.path().join("target.bin");
        fs::write(&source, b"new").unwrap();
        fs::write(&target, b"stale content").unwrap();

        let (_, handler) = recording_handler();
        let pool = ReplicationPool::start(1, 1, handler).unwrap();
        pool.submit(ReplicationTask::new(&source, &target));
        pool.shutdown();

        assert_eq!(fs::read(&target).unwrap(), b"new");
    }

    #[test]
    fn test_publish_discards_copy_when_source_removed() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("source.bin");
        let target = temp.path().join("target.bin");
        let staging = staging_path(&target);
        fs::write(&staging, b"copied before removal").unwrap();

        let task = ReplicationTask::new(&source, &target);

        assert!(!task.publish(&staging).unwrap());
        assert!(!target.exists());
        assert!(!staging.exists());
    }

    #[test]
    fn test_publish_renames_when_source_present() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("source.bin");
        let target = temp.path().join("target.bin");
        let staging = staging_path(&target);
        fs::write(&source, b"content").unwrap();
        fs::write(&staging, b"content").unwrap();

        let task = ReplicationTask::new(&source, &target);

        assert!(task.publish(&staging).unwrap());
        assert_eq!(fs::read(&target).unwrap(), b"content");
        assert!(!staging.exists());
    }

    #[test]
    fn test_copy_failure_reaches_handler() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("out/missing.bin");

        let (recorded, handler) = recording_handler();
        let pool = ReplicationPool::start(1, 4, handler).unwrap();
        pool.submit(ReplicationTask::new(temp.path().join("missing.bin"), &target));
        pool.shutdown();

        let recorded = recorded.lock().unwrap();
        assert_eq!(recorded.len(), 1);
        assert!(recorded[0].starts_with("copy failed"));
        assert!(!target.exists());
        assert!(!staging_path(&target).exists());
    }

    #[test]
    fn test_full_queue_rejects_without_blocking() {
        let temp = TempDir::new().unwrap();
        let (entered_tx, entered_rx) = channel::bounded::<()>(1);
        let (release_tx, release_rx) = channel::bounded::<()>(1);
        let recorded = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&recorded);
        let handler = move |failure: &ReplicationFailure| {
            sink.lock().unwrap().push(failure.reason.to_string());
            if let ReplicationFailureReason::Copy(_) = failure.reason {
                let _ = entered_tx.try_send(());
                let _ = release_rx.recv();
            }
        };

        let pool = ReplicationPool::start(1, 1, Arc::new(handler)).unwrap();
        let missing = |name: &str| {
            ReplicationTask::new(temp.path().join(name), temp.path().join("out").join(name))
        };

        // The only worker parks inside the handler, leaving the queue empty.
        pool.submit(missing("a"));
        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        pool.submit(missing("b"));
        pool.submit(missing("c"));

        assert!(recorded
            .lock()
            .unwrap()
            .contains(&"replication queue is full".to_string()));

        drop(release_tx);
        pool.shutdown();

        let recorded = recorded.lock().unwrap();
        assert_eq!(recorded.len(), 3);
        assert_eq!(
            recorded.iter().filter(|r| r.starts_with("copy failed")).count(),
            2
        );
    }
}
