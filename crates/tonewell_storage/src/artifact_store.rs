#![forbid(unsafe_code)]

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tonewell_kernel_contracts::artifact::GeneratedArtifact;

use crate::StoreError;

/// Expiry applied when a download token is issued.
pub const ISSUED_ARTIFACT_TTL: Duration = Duration::from_secs(60 * 60);
/// Expiry applied right after a file has been streamed.
pub const DOWNLOADED_ARTIFACT_TTL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryOutcome {
    Deleted,
    AlreadyGone,
    Failed,
}

/// Handle to one scheduled deletion. Dropping it does not cancel the timer;
/// the delivery path never cancels, only tests and shutdown do.
#[derive(Debug)]
pub struct ExpiryHandle {
    task: JoinHandle<ExpiryOutcome>,
}

impl ExpiryHandle {
    pub fn cancel(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// `None` when the timer was cancelled before it fired.
    pub async fn wait(self) -> Option<ExpiryOutcome> {
        self.task.await.ok()
    }
}

/// Owns generated files in the scratch directory and deletes them on timers.
///
/// Timers are independent of each other and of the request that scheduled
/// them. Deletion is idempotent, so several timers on one path race safely.
#[derive(Debug, Clone)]
pub struct ExpiringArtifactStore {
    scratch_dir: PathBuf,
    runtime: Handle,
}

impl ExpiringArtifactStore {
    pub fn new(scratch_dir: PathBuf, runtime: Handle) -> Self {
        Self {
            scratch_dir,
            runtime,
        }
    }

    pub fn for_current_runtime(scratch_dir: PathBuf) -> Result<Self, StoreError> {
        let runtime = Handle::try_current().map_err(|_| StoreError::NoRuntime)?;
        Ok(Self::new(scratch_dir, runtime))
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    pub fn ensure_scratch_dir(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.scratch_dir)?;
        Ok(())
    }

    /// True for direct children of the scratch directory only.
    pub fn owns(&self, path: &Path) -> bool {
        path.parent() == Some(self.scratch_dir.as_path()) && path.file_name().is_some()
    }

    pub fn artifact_exists(&self, path: &Path) -> bool {
        self.owns(path) && path.is_file()
    }

    pub fn schedule_artifact_expiry(
        &self,
        artifact: &GeneratedArtifact,
        delay: Duration,
    ) -> Result<ExpiryHandle, StoreError> {
        self.schedule_expiry(&artifact.file_path, delay)
    }

    /// Deletes `path` once `delay` has elapsed. Failures are logged and never
    /// reach the caller; the returned handle exists for tests and shutdown.
    pub fn schedule_expiry(&self, path: &Path, delay: Duration) -> Result<ExpiryHandle, StoreError> {
        if !self.owns(path) {
            return Err(StoreError::OutsideScratch(path.to_path_buf()));
        }
        let path = path.to_path_buf();
        tracing::info!(
            path = %path.display(),
            delay_secs = delay.as_secs(),
            "artifact scheduled for expiry"
        );
        let task = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            expire_now(&path)
        });
        Ok(ExpiryHandle { task })
    }
}

fn expire_now(path: &Path) -> ExpiryOutcome {
    match delete_if_present(path) {
        Ok(true) => {
            tracing::info!(path = %path.display(), "expired artifact deleted");
            ExpiryOutcome::Deleted
        }
        Ok(false) => ExpiryOutcome::AlreadyGone,
        Err(err) => {
            tracing::error!(path = %path.display(), error = %err, "artifact cleanup failed");
            ExpiryOutcome::Failed
        }
    }
}

/// Removes a file, treating "already gone" as success. Returns whether this
/// call did the removal.
pub fn delete_if_present(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}
