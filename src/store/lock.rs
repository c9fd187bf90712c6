//! Cross-process exclusive lock guarding the store's log tail and index.
//!
//! Uses an advisory OS lock (`fs2`) on a sidecar lock file. Acquisition
//! polls `try_lock_exclusive` until the timeout elapses, so a stuck holder
//! turns into `STORE_LOCKED` instead of a hang. The lock is released when
//! the guard is dropped, and by the OS if the process dies.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::error::{CtxError, ErrorCode};

/// A held store lock.
#[derive(Debug)]
pub struct StoreLock {
    file: File,
    path: PathBuf,
}

impl StoreLock {
    /// Acquire the lock at `path`, waiting at most `timeout`.
    pub fn acquire(path: &Path, timeout: Duration, poll: Duration) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)
            .with_context(|| format!("Failed to open lock file: {}", path.display()))?;

        let started = Instant::now();
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    tracing::debug!(
                        path = %path.display(),
                        waited_ms = started.elapsed().as_millis() as u64,
                        "store lock acquired"
                    );
                    return Ok(Self {
                        file,
                        path: path.to_path_buf(),
                    });
                }
                Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                    if started.elapsed() >= timeout {
                        return Err(CtxError::new(
                            ErrorCode::StoreLocked,
                            "Store is locked by another process.",
                        )
                        .with_detail("lock_path", path.display().to_string())
                        .with_detail("timeout_ms", timeout.as_millis() as u64)
                        .into());
                    }
                    std::thread::sleep(poll);
                }
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("Failed to lock store: {}", path.display()))
                }
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release store lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::classify;
    use tempfile::TempDir;

    #[test]
    fn test_second_holder_times_out() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("captures.lock");
        let held =
            StoreLock::acquire(&path, Duration::from_millis(100), Duration::from_millis(5))
                .unwrap();
        assert_eq!(held.path(), path.as_path());

        let started = Instant::now();
        let err = StoreLock::acquire(&path, Duration::from_millis(80), Duration::from_millis(5))
            .unwrap_err();
        assert_eq!(classify(&err).code, ErrorCode::StoreLocked);
        assert!(started.elapsed() >= Duration::from_millis(80));
    }

    #[test]
    fn test_released_on_drop() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("captures.lock");
        {
            let _held =
                StoreLock::acquire(&path, Duration::from_millis(100), Duration::from_millis(5))
                    .unwrap();
        }
        StoreLock::acquire(&path, Duration::from_millis(100), Duration::from_millis(5)).unwrap();
    }

    #[test]
    fn test_waits_for_release() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("captures.lock");
        let held =
            StoreLock::acquire(&path, Duration::from_millis(100), Duration::from_millis(5))
                .unwrap();

        let releaser = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            drop(held);
        });

        StoreLock::acquire(&path, Duration::from_secs(5), Duration::from_millis(5)).unwrap();
        releaser.join().unwrap();
    }
}
