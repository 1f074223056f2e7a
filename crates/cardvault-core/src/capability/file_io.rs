use std::{fmt, io};

use thiserror::Error;

/// Which of the two caller-visible files an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileSlot {
    /// The committed container.
    Main,
    /// The shadow file written before an atomic commit.
    Temp,
}

impl fmt::Display for FileSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileSlot::Main => f.write_str("main"),
            FileSlot::Temp => f.write_str("temp"),
        }
    }
}

#[derive(Debug, Error)]
pub enum FileIoError {
    #[error("no open {slot} handle")]
    NotOpen { slot: FileSlot },
    #[error("{op} on {slot} file failed: {source}")]
    Io {
        op: &'static str,
        slot: FileSlot,
        #[source]
        source: io::Error,
    },
}

impl FileIoError {
    pub fn io(op: &'static str, slot: FileSlot, source: io::Error) -> Self {
        FileIoError::Io { op, slot, source }
    }

    /// `true` when the target file does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, FileIoError::Io { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}

/// Failures of the temp-to-main commit. Every variant leaves exactly one of
/// {no container, old container, new container} under the main name.
#[derive(Debug, Error)]
pub enum CommitError {
    /// No container existed and the temp file could not be renamed into place.
    /// The temp file has been removed.
    #[error("promoting temp file failed: {source}")]
    PromoteTemp {
        #[source]
        source: io::Error,
    },
    /// The existing container could not be moved aside. It is untouched and
    /// the temp file has been removed.
    #[error("moving container to backup failed: {source}")]
    BackupMain {
        #[source]
        source: io::Error,
    },
    /// The temp file could not replace the container. The backup was moved
    /// back when `restored` is set, and the temp file has been removed.
    #[error("replacing container failed (restored: {restored}): {source}")]
    SwapTemp {
        restored: bool,
        #[source]
        source: io::Error,
    },
    /// The new container is in place; only the stale backup remains.
    #[error("removing backup failed: {source}")]
    RemoveBackup {
        #[source]
        source: io::Error,
    },
}

impl CommitError {
    /// `true` when the new container is visible despite the error.
    pub fn is_committed(&self) -> bool {
        matches!(self, CommitError::RemoveBackup { .. })
    }
}

/// Two-phase file protocol over a single container.
///
/// Reads always target the committed file. Writes always go to the temp
/// file, which only becomes visible through [`FileIo::commit_temp`].
/// Reads and writes are exact: a short read or write is an error.
pub trait FileIo {
    fn open_read(&mut self) -> Result<(), FileIoError>;

    /// Create (or truncate) the temp file for writing.
    fn open_write_temp(&mut self) -> Result<(), FileIoError>;

    /// Fill `buf` completely from the read handle.
    fn read(&mut self, buf: &mut [u8]) -> Result<(), FileIoError>;

    fn write_temp(&mut self, buf: &[u8]) -> Result<(), FileIoError>;

    /// Idempotent.
    fn close_read(&mut self);

    /// Flush and close the temp handle. Idempotent once closed.
    fn close_write_temp(&mut self) -> Result<(), FileIoError>;

    fn position_read(&mut self) -> Result<u64, FileIoError>;

    fn position_write_temp(&mut self) -> Result<u64, FileIoError>;

    fn size(&self, slot: FileSlot) -> Result<u64, FileIoError>;

    fn exists(&self, slot: FileSlot) -> bool;

    fn delete(&mut self, slot: FileSlot) -> Result<(), FileIoError>;

    /// Atomically replace the container with the temp file.
    fn commit_temp(&mut self) -> Result<(), CommitError>;
}
