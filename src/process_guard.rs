//! One watcher per Claude home. The lock file doubles as the PID record.

use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use fs2::FileExt;
use tracing::debug;

use crate::config;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStatus {
    Free,
    Held { pid: Option<u32> },
}

/// Held for the lifetime of the watcher; unlocked and blanked on drop.
#[derive(Debug)]
pub struct WatcherLock {
    file: File,
    path: PathBuf,
}

impl Drop for WatcherLock {
    fn drop(&mut self) {
        let _ = self.file.set_len(0);
        let _ = self.file.unlock();
        debug!(path = %self.path.display(), "watcher lock released");
    }
}

pub fn claim_watcher_lock() -> Result<WatcherLock> {
    match try_claim(&config::lock_path())? {
        Ok(lock) => Ok(lock),
        Err(Some(pid)) => bail!("claude-context-watch is already running (PID {pid})"),
        Err(None) => bail!("claude-context-watch is already running"),
    }
}

pub fn watcher_lock_status() -> Result<LockStatus> {
    probe(&config::lock_path())
}

/// `Err` carries the PID of the current holder when it could be read.
fn try_claim(path: &Path) -> Result<Result<WatcherLock, Option<u32>>> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("cannot create {}", dir.display()))?;
    }

    let mut file = open(path)?;
    if file.try_lock_exclusive().is_err() {
        return Ok(Err(owner_pid(path)));
    }

    file.seek(SeekFrom::Start(0))?;
    file.set_len(0)?;
    write!(file, "{}", std::process::id())?;
    file.flush()?;
    Ok(Ok(WatcherLock {
        file,
        path: path.to_path_buf(),
    }))
}

fn probe(path: &Path) -> Result<LockStatus> {
    if !path.exists() {
        return Ok(LockStatus::Free);
    }

    let file = open(path)?;
    if file.try_lock_exclusive().is_ok() {
        let _ = file.unlock();
        return Ok(LockStatus::Free);
    }
    Ok(LockStatus::Held {
        pid: owner_pid(path),
    })
}

fn owner_pid(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

fn open(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)
        .with_context(|| format!("cannot open watcher lock {}", path.display()))
}
