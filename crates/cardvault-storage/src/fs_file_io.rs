use std::{
    fs::{self, File, OpenOptions},
    io::{Read, Seek, Write},
    path::{Path, PathBuf},
};

use cardvault_core::capability::{CommitError, FileIo, FileIoError, FileSlot};
use tracing::{debug, instrument};

use crate::commit::{self, CommitPaths, StdFs};

/// Filesystem-backed file capability for a single container path.
///
/// Writes land in `<path>.tmp` and replace `<path>` only through
/// [`FileIo::commit_temp`], which goes through `<path>.bak`.
#[derive(Debug)]
pub struct FsFileIo {
    paths: CommitPaths,
    reader: Option<File>,
    writer: Option<File>,
}

impl FsFileIo {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            paths: CommitPaths::for_main(path),
            reader: None,
            writer: None,
        }
    }

    /// Path of the committed container.
    pub fn path(&self) -> &Path {
        &self.paths.main
    }

    pub fn paths(&self) -> &CommitPaths {
        &self.paths
    }

    fn path_for(&self, slot: FileSlot) -> &Path {
        match slot {
            FileSlot::Main => &self.paths.main,
            FileSlot::Temp => &self.paths.temp,
        }
    }
}

fn open_temp(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)
}

impl FileIo for FsFileIo {
    fn open_read(&mut self) -> Result<(), FileIoError> {
        let file = File::open(&self.paths.main)
            .map_err(|e| FileIoError::io("open", FileSlot::Main, e))?;
        self.reader = Some(file);
        Ok(())
    }

    fn open_write_temp(&mut self) -> Result<(), FileIoError> {
        let file =
            open_temp(&self.paths.temp).map_err(|e| FileIoError::io("open", FileSlot::Temp, e))?;
        self.writer = Some(file);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<(), FileIoError> {
        let reader = self.reader.as_mut().ok_or(FileIoError::NotOpen {
            slot: FileSlot::Main,
        })?;
        reader
            .read_exact(buf)
            .map_err(|e| FileIoError::io("read", FileSlot::Main, e))
    }

    fn write_temp(&mut self, buf: &[u8]) -> Result<(), FileIoError> {
        let writer = self.writer.as_mut().ok_or(FileIoError::NotOpen {
            slot: FileSlot::Temp,
        })?;
        writer
            .write_all(buf)
            .map_err(|e| FileIoError::io("write", FileSlot::Temp, e))
    }

    fn close_read(&mut self) {
        self.reader = None;
    }

    fn close_write_temp(&mut self) -> Result<(), FileIoError> {
        match self.writer.take() {
            Some(mut file) => {
                file.flush()
                    .map_err(|e| FileIoError::io("flush", FileSlot::Temp, e))?;
                file.sync_all()
                    .map_err(|e| FileIoError::io("sync", FileSlot::Temp, e))
            }
            None => Ok(()),
        }
    }

    fn position_read(&mut self) -> Result<u64, FileIoError> {
        let reader = self.reader.as_mut().ok_or(FileIoError::NotOpen {
            slot: FileSlot::Main,
        })?;
        reader
            .stream_position()
            .map_err(|e| FileIoError::io("seek", FileSlot::Main, e))
    }

    fn position_write_temp(&mut self) -> Result<u64, FileIoError> {
        let writer = self.writer.as_mut().ok_or(FileIoError::NotOpen {
            slot: FileSlot::Temp,
        })?;
        writer
            .stream_position()
            .map_err(|e| FileIoError::io("seek", FileSlot::Temp, e))
    }

    fn size(&self, slot: FileSlot) -> Result<u64, FileIoError> {
        fs::metadata(self.path_for(slot))
            .map(|meta| meta.len())
            .map_err(|e| FileIoError::io("stat", slot, e))
    }

    fn exists(&self, slot: FileSlot) -> bool {
        self.path_for(slot).exists()
    }

    fn delete(&mut self, slot: FileSlot) -> Result<(), FileIoError> {
        match slot {
            FileSlot::Main => self.reader = None,
            FileSlot::Temp => self.writer = None,
        }
        fs::remove_file(self.path_for(slot)).map_err(|e| FileIoError::io("delete", slot, e))
    }

    #[instrument(skip_all, fields(path = %self.paths.main.display()))]
    fn commit_temp(&mut self) -> Result<(), CommitError> {
        // Never rename a file that still has an open writer.
        self.writer = None;
        let start = commit::commit_temp(&StdFs, &self.paths)?;
        debug!(?start, "temp file committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_io() -> (tempfile::TempDir, FsFileIo) {
        let dir = tempfile::tempdir().expect("tempdir");
        let io = FsFileIo::new(dir.path().join("nested").join("cards.store"));
        (dir, io)
    }

    fn write_and_commit(io: &mut FsFileIo, bytes: &[u8]) {
        io.open_write_temp().expect("open temp");
        io.write_temp(bytes).expect("write");
        io.close_write_temp().expect("close");
        io.commit_temp().expect("commit");
    }

    #[test]
    fn write_commit_then_read_back() {
        let (_dir, mut io) = file_io();
        assert!(!io.exists(FileSlot::Main));

        io.open_write_temp().expect("open temp creates parent dirs");
        io.write_temp(b"header").expect("write");
        assert_eq!(io.position_write_temp().expect("pos"), 6);
        io.write_temp(b"body").expect("write");
        io.close_write_temp().expect("close");

        assert!(io.exists(FileSlot::Temp));
        assert!(!io.exists(FileSlot::Main), "temp must not be visible yet");
        io.commit_temp().expect("commit");
        assert!(!io.exists(FileSlot::Temp));
        assert_eq!(io.size(FileSlot::Main).expect("size"), 10);

        io.open_read().expect("open read");
        assert_eq!(io.position_read().expect("pos"), 0);
        let mut buf = [0u8; 6];
        io.read(&mut buf).expect("read");
        assert_eq!(&buf, b"header");
        assert_eq!(io.position_read().expect("pos"), 6);
        io.close_read();
    }

    #[test]
    fn second_commit_replaces_container() {
        let (_dir, mut io) = file_io();
        write_and_commit(&mut io, b"first");
        write_and_commit(&mut io, b"second!");

        assert_eq!(fs::read(io.path()).expect("read"), b"second!");
        assert!(!io.paths().backup.exists());
    }

    #[test]
    fn short_read_is_an_error() {
        let (_dir, mut io) = file_io();
        write_and_commit(&mut io, b"abc");

        io.open_read().expect("open");
        let mut buf = [0u8; 8];
        let err = io.read(&mut buf).expect_err("short read");
        assert!(matches!(err, FileIoError::Io { op: "read", .. }));
    }

    #[test]
    fn missing_container_reports_not_found() {
        let (_dir, mut io) = file_io();
        let err = io.open_read().expect_err("nothing to open");
        assert!(err.is_not_found());
        assert!(io.size(FileSlot::Main).expect_err("no size").is_not_found());
    }

    #[test]
    fn handles_must_be_open() {
        let (_dir, mut io) = file_io();
        assert!(matches!(
            io.write_temp(b"x"),
            Err(FileIoError::NotOpen {
                slot: FileSlot::Temp
            })
        ));
        let mut buf = [0u8; 1];
        assert!(matches!(
            io.read(&mut buf),
            Err(FileIoError::NotOpen {
                slot: FileSlot::Main
            })
        ));
        io.close_write_temp().expect("closing nothing is fine");
    }

    #[test]
    fn delete_removes_each_slot() {
        let (_dir, mut io) = file_io();
        write_and_commit(&mut io, b"data");
        io.open_write_temp().expect("open temp");
        io.close_write_temp().expect("close");

        io.delete(FileSlot::Temp).expect("delete temp");
        assert!(!io.exists(FileSlot::Temp));
        io.delete(FileSlot::Main).expect("delete main");
        assert!(!io.exists(FileSlot::Main));
        assert!(io.delete(FileSlot::Main).expect_err("already gone").is_not_found());
    }

    #[cfg(unix)]
    #[test]
    fn temp_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let (_dir, mut io) = file_io();
        io.open_write_temp().expect("open temp");
        io.close_write_temp().expect("close");
        let mode = fs::metadata(&io.paths().temp)
            .expect("stat")
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
