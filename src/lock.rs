// ABOUTME: Process-wide advisory lock guaranteeing single-flight scheduler cycles
// ABOUTME: Lock file keyed by config path with stale-holder reclaim
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Milo Training Intelligence

//! Advisory cycle lock.
//!
//! One cycle runs to completion before the next begins. The lock is a file in
//! the system temp directory whose name is derived from the configuration
//! path, so independent deployments (distinct configs) do not contend. A
//! second concurrent cycle fails fast with [`ErrorCode::AlreadyRunning`].
//!
//! [`ErrorCode::AlreadyRunning`]: crate::errors::ErrorCode::AlreadyRunning

use std::collections::hash_map::DefaultHasher;
use std::fs::{self, OpenOptions};
use std::hash::{Hash, Hasher};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::errors::{AppError, AppResult, ErrorCode};

/// Held advisory lock; released on drop
#[derive(Debug)]
pub struct CycleLock {
    path: PathBuf,
}

impl CycleLock {
    /// Acquire the cycle lock keyed by the given config path
    ///
    /// If an existing lock file names a process that is no longer alive, the
    /// stale lock is reclaimed.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyRunning` when a live process holds the lock, or an
    /// internal error when the lock file cannot be created.
    pub fn acquire(config_path: &Path) -> AppResult<Self> {
        let path = Self::lock_path(config_path);

        match Self::try_create(&path) {
            Ok(()) => Ok(Self { path }),
            Err(err) if err.code == ErrorCode::AlreadyRunning => {
                if Self::holder_is_stale(&path) {
                    warn!(lock = %path.display(), "reclaiming stale cycle lock");
                    let _ = fs::remove_file(&path);
                    Self::try_create(&path)?;
                    Ok(Self { path })
                } else {
                    Err(err)
                }
            }
            Err(err) => Err(err),
        }
    }

    /// Lock file location derived from the config path
    #[must_use]
    pub fn lock_path(config_path: &Path) -> PathBuf {
        let mut hasher = DefaultHasher::new();
        config_path.hash(&mut hasher);
        std::env::temp_dir().join(format!("milo-cycle-{:016x}.lock", hasher.finish()))
    }

    fn try_create(path: &Path) -> AppResult<()> {
        let result = OpenOptions::new().write(true).create_new(true).open(path);
        match result {
            Ok(mut file) => {
                let pid = std::process::id();
                let _ = writeln!(file, "{pid}");
                debug!(lock = %path.display(), pid, "acquired cycle lock");
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => Err(AppError::new(
                ErrorCode::AlreadyRunning,
                format!("cycle lock held: {}", path.display()),
            )),
            Err(err) => Err(AppError::internal(format!(
                "cannot create cycle lock {}: {err}",
                path.display()
            ))),
        }
    }

    /// Whether the recorded holder PID no longer refers to a live process
    fn holder_is_stale(path: &Path) -> bool {
        let Ok(contents) = fs::read_to_string(path) else {
            // Unreadable lock: treat as stale rather than wedging forever
            return true;
        };
        let Ok(pid) = contents.trim().parse::<u32>() else {
            return true;
        };
        if pid == std::process::id() {
            return false;
        }
        !Self::process_alive(pid)
    }

    #[cfg(unix)]
    fn process_alive(pid: u32) -> bool {
        Path::new(&format!("/proc/{pid}")).exists()
    }

    #[cfg(not(unix))]
    fn process_alive(_pid: u32) -> bool {
        // Without a portable liveness probe, assume the holder is alive and
        // let the operator remove the lock manually.
        true
    }
}

impl Drop for CycleLock {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            warn!(lock = %self.path.display(), %err, "failed to release cycle lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_while_held() {
        let config = tempfile::NamedTempFile::new().unwrap();
        let lock = CycleLock::acquire(config.path()).unwrap();

        let err = CycleLock::acquire(config.path()).unwrap_err();
        assert_eq!(err.code, ErrorCode::AlreadyRunning);

        drop(lock);
        let reacquired = CycleLock::acquire(config.path());
        assert!(reacquired.is_ok());
    }

    #[test]
    fn stale_lock_is_reclaimed() {
        let config = tempfile::NamedTempFile::new().unwrap();
        let path = CycleLock::lock_path(config.path());

        // Plant a lock naming a PID that cannot be alive
        fs::write(&path, "4294967294\n").unwrap();

        let lock = CycleLock::acquire(config.path());
        assert!(lock.is_ok());
    }

    #[test]
    fn distinct_configs_do_not_contend() {
        let a = tempfile::NamedTempFile::new().unwrap();
        let b = tempfile::NamedTempFile::new().unwrap();

        let lock_a = CycleLock::acquire(a.path()).unwrap();
        let lock_b = CycleLock::acquire(b.path());
        assert!(lock_b.is_ok());
        drop(lock_a);
    }
}
