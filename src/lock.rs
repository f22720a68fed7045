//! File-based locking to prevent concurrent execution.
//!
//! Uses flock-style advisory locking so only one client instance mutates
//! the set and the config file at a time.

use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::error::ApibanError;

pub const LOCK_FILE: &str = "/run/apiban-nft-client.lock";

/// Holds an exclusive lock; released when dropped.
#[derive(Debug)]
pub struct LockGuard {
    _file: File,
    path: PathBuf,
}

impl LockGuard {
    /// Acquire the default lock file.
    pub fn acquire() -> Result<Self, ApibanError> {
        Self::acquire_at(Path::new(LOCK_FILE))
    }

    /// Attempt to acquire an exclusive lock on `path` without blocking.
    ///
    /// Opens with create+read+write to avoid a race between creation and
    /// locking.
    pub fn acquire_at(path: &Path) -> Result<Self, ApibanError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| {
                ApibanError::Locked(format!("cannot open lock file {}: {}", path.display(), e))
            })?;

        // Owner read/write only
        if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
            tracing::debug!("Cannot restrict lock file permissions: {}", e);
        }

        file.try_lock_exclusive().map_err(|_| {
            ApibanError::Locked(format!(
                "another instance is already running (lock file: {})",
                path.display()
            ))
        })?;

        Ok(Self {
            _file: file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
