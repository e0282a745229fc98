//! Exclusive lock serialising refresh passes over one cache root.
//!
//! The lock file holds the pid of the process running the pass so a
//! waiting process can say who it is waiting for.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::time::{Duration, Instant};

use fs2::FileExt;
use thiserror::Error;

/// How long a second pass waits before giving up.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Held for the duration of a refresh pass. Released on drop.
#[derive(Debug)]
pub struct UpdateLock {
    file: File,
}

/// Why a pass could not take the lock.
#[derive(Error, Debug)]
pub enum LockError {
    /// Another pass kept the lock past the timeout. `holder` is its pid when
    /// the lock file names one.
    #[error("update lock is held by another process")]
    Busy { holder: Option<u32> },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

fn open_lock_file(lock_path: &Path) -> io::Result<File> {
    if let Some(parent) = lock_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path)
}

/// Pid recorded by the current or most recent holder of the lock.
pub fn lock_holder(lock_path: &Path) -> Option<u32> {
    std::fs::read_to_string(lock_path).ok()?.trim().parse().ok()
}

impl UpdateLock {
    fn claim(file: File) -> io::Result<Self> {
        file.set_len(0)?;
        let mut writer = &file;
        writeln!(writer, "{}", std::process::id())?;
        Ok(Self { file })
    }

    /// Take the lock, polling with backoff until `timeout` elapses.
    pub fn acquire(lock_path: &Path, timeout: Duration) -> Result<Self, LockError> {
        let file = open_lock_file(lock_path)?;

        let start = Instant::now();
        let mut sleep_duration = Duration::from_millis(10);
        let max_sleep = Duration::from_millis(500);

        loop {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(Self::claim(file)?),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if start.elapsed() >= timeout {
                        return Err(LockError::Busy {
                            holder: lock_holder(lock_path),
                        });
                    }
                    log::debug!("update lock busy, retrying in {:?}", sleep_duration);
                    std::thread::sleep(sleep_duration);
                    sleep_duration = (sleep_duration * 2).min(max_sleep);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Take the lock if nobody holds it.
    #[cfg(test)]
    pub(crate) fn try_acquire(lock_path: &Path) -> io::Result<Option<Self>> {
        let file = open_lock_file(lock_path)?;

        match file.try_lock_exclusive() {
            Ok(()) => Self::claim(file).map(Some),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl Drop for UpdateLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
