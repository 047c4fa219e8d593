//! Exclusive, cross-process lock over the cache store.
//!
//! The lock lives in its own file and is advisory (`flock(2)` on Unix,
//! `LockFileEx` on Windows). Nothing is ever written to the lock file.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::instrument;

/// Holds an exclusive lock on a lock file until released or dropped.
///
/// Not `Clone`: exactly one owner releases the lock, exactly once.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    file: Option<File>,
}

impl LockGuard {
    /// Block until an exclusive lock on `path` is held.
    ///
    /// Waits for as long as it takes; there is no timeout. Use
    /// [`try_acquire`](Self::try_acquire) to build bounded waiting on top.
    ///
    /// - [`ErrorKind::LockFileCreateFailed`]: the file was missing and could
    ///   not be created.
    /// - [`ErrorKind::LockFileNotWritable`]: the file could not be opened for
    ///   writing.
    /// - [`ErrorKind::LockFailed`]: the OS rejected the lock request.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = open(path)?;
        FileExt::lock_exclusive(&file).or_raise(|| ErrorKind::LockFailed(path.to_path_buf()))?;
        tracing::debug!("Lock acquired");
        Ok(Self { path: path.to_path_buf(), file: Some(file) })
    }

    /// Take the lock if nobody else holds it, without waiting.
    ///
    /// Returns `Ok(None)` when the lock is held elsewhere.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn try_acquire(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref();
        let file = open(path)?;
        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => Ok(Some(Self { path: path.to_path_buf(), file: Some(file) })),
            Err(err) if err.raw_os_error() == fs2::lock_contended_error().raw_os_error() => Ok(None),
            Err(err) => Err(err).or_raise(|| ErrorKind::LockFailed(path.to_path_buf())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_held(&self) -> bool {
        self.file.is_some()
    }

    /// Unlock and close the lock file. Calling this again is a no-op.
    pub fn release(&mut self) -> Result<()> {
        let Some(file) = self.file.take() else {
            return Ok(());
        };
        // Closing the file would drop the lock too, but only once every
        // duplicate of the descriptor is gone.
        FileExt::unlock(&file).or_raise(|| ErrorKind::LockFailed(self.path.clone()))?;
        tracing::debug!(path = %self.path.display(), "Lock released");
        Ok(())
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            tracing::warn!(path = %self.path.display(), error = ?err, "Failed to release lock");
        }
    }
}

/// Create the lock file if needed, then open it for writing.
fn open(path: &Path) -> Result<File> {
    if !path.exists() {
        create(path).or_raise(|| ErrorKind::LockFileCreateFailed(path.to_path_buf()))?;
    }
    OpenOptions::new()
        .write(true)
        .open(path)
        .or_raise(|| ErrorKind::LockFileNotWritable(path.to_path_buf()))
}

fn create(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().write(true).create(true).truncate(false).open(path)?;
    Ok(())
}
