// src/venv/lock.rs

//! Per-environment exclusive file lock.

use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs4::FileExt;
use tracing::{debug, info};

use crate::errors::{Result, ToolsError};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Held for as long as an environment is being created or updated.
#[derive(Debug)]
pub struct EnvLock {
    file: File,
    path: PathBuf,
}

impl EnvLock {
    /// Block until the lock at `path` is ours or `timeout` elapses.
    pub fn acquire(path: &Path, name: &str, timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;

        let deadline = Instant::now() + timeout;
        let mut announced = false;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    debug!(venv = name, lock = %path.display(), "acquired environment lock");
                    return Ok(Self {
                        file,
                        path: path.to_path_buf(),
                    });
                }
                Err(err) if is_contended(&err) => {
                    if Instant::now() >= deadline {
                        return Err(ToolsError::LockTimeout {
                            name: name.to_string(),
                            timeout_secs: timeout.as_secs(),
                        });
                    }
                    if !announced {
                        info!("Waiting for another process to finish preparing virtualenv({name}) ...");
                        announced = true;
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for EnvLock {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            debug!(lock = %self.path.display(), error = %err, "failed to release environment lock");
        }
    }
}

fn is_contended(err: &std::io::Error) -> bool {
    if err.kind() == ErrorKind::WouldBlock {
        return true;
    }
    #[cfg(windows)]
    if matches!(err.raw_os_error(), Some(32 | 33)) {
        return true;
    }
    false
}
