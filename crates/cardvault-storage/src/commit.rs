//! Rename-based atomic replacement of the container by its temp file.
//!
//! Three names are involved: *main* (the container), *temp* (the fully
//! written replacement) and *backup* (`main` + `.bak`, the old container while
//! the swap is in flight). The protocol starts in one of two states:
//!
//! ```text
//! NoMain:  temp -> main                                   => Committed
//!          (rename fails: remove temp)                    => RolledBack
//! HasMain: main -> backup                                 (fails: remove temp => RolledBack)
//!          temp -> main                                   (fails: backup -> main, remove temp => RolledBack)
//!          remove backup                                  => Committed
//!          (remove fails: new container already visible)  => Committed, reported as error
//! ```
//!
//! At every point the main name holds no container, the old one, or the new
//! one, never a partial file.

use std::{
    ffi::OsString,
    fs, io,
    path::{Path, PathBuf},
};

use cardvault_core::capability::CommitError;
use tracing::{debug, warn};

/// State the commit started from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitStart {
    NoMain,
    HasMain,
}

/// Where a commit attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitPhase {
    Committed,
    RolledBack,
}

impl CommitPhase {
    /// Phase reached by a commit that returned `result`.
    pub fn of<T>(result: &Result<T, CommitError>) -> Self {
        match result {
            Ok(_) => CommitPhase::Committed,
            Err(err) if err.is_committed() => CommitPhase::Committed,
            Err(_) => CommitPhase::RolledBack,
        }
    }
}

/// The three sibling paths used by the protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitPaths {
    pub main: PathBuf,
    pub temp: PathBuf,
    pub backup: PathBuf,
}

impl CommitPaths {
    /// `main`, `main.tmp`, `main.bak`.
    pub fn for_main(main: impl Into<PathBuf>) -> Self {
        let main = main.into();
        Self {
            temp: with_suffix(&main, ".tmp"),
            backup: with_suffix(&main, ".bak"),
            main,
        }
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// The filesystem operations the protocol needs.
pub trait CommitFs {
    fn exists(&self, path: &Path) -> bool;
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
    fn remove(&self, path: &Path) -> io::Result<()>;
}

/// `std::fs` implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdFs;

impl CommitFs for StdFs {
    fn exists(&self, path: &Path) -> bool {
        fs::symlink_metadata(path).is_ok()
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }
}

/// Make the temp file the container. Returns the state the commit started from.
pub fn commit_temp<F: CommitFs + ?Sized>(
    fs: &F,
    paths: &CommitPaths,
) -> Result<CommitStart, CommitError> {
    if !fs.exists(&paths.main) {
        if let Err(source) = fs.rename(&paths.temp, &paths.main) {
            discard_temp(fs, paths);
            warn!(error = %source, "promoting temp file failed; rolled back");
            return Err(CommitError::PromoteTemp { source });
        }
        debug!(start = ?CommitStart::NoMain, "container committed");
        return Ok(CommitStart::NoMain);
    }

    if let Err(source) = fs.rename(&paths.main, &paths.backup) {
        discard_temp(fs, paths);
        warn!(error = %source, "moving container aside failed; rolled back");
        return Err(CommitError::BackupMain { source });
    }

    if let Err(source) = fs.rename(&paths.temp, &paths.main) {
        let restored = match fs.rename(&paths.backup, &paths.main) {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, backup = ?paths.backup, "restoring backup failed");
                false
            }
        };
        discard_temp(fs, paths);
        warn!(error = %source, restored, "replacing container failed; rolled back");
        return Err(CommitError::SwapTemp { restored, source });
    }

    if let Err(source) = fs.remove(&paths.backup) {
        warn!(error = %source, backup = ?paths.backup, "container committed but backup remains");
        return Err(CommitError::RemoveBackup { source });
    }

    debug!(start = ?CommitStart::HasMain, "container committed");
    Ok(CommitStart::HasMain)
}

fn discard_temp<F: CommitFs + ?Sized>(fs: &F, paths: &CommitPaths) {
    if let Err(err) = fs.remove(&paths.temp) {
        if err.kind() != io::ErrorKind::NotFound {
            warn!(error = %err, temp = ?paths.temp, "removing temp file failed");
        }
    }
}
