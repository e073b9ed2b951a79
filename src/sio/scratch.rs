//! The scratch file holding sorted runs.
//!
//! Runs form a chain. Each begins with a 16-byte header (two little-endian
//! `u64`: offset of the next run, byte count of this run's records) and
//! starts on a 4 KiB boundary.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::debug;
use tempfile::TempPath;

use super::error::{Result, SioError};

/// Bytes in a run header.
pub const RUN_HEADER_SIZE: usize = 16;
/// Runs start on multiples of this.
pub const BLOCK_ALIGN: u64 = 0x1000;

/// Extension given to scratch file names that have none.
const SCRATCH_EXT: &str = "wrk";

/// Round `pos` up to the next run boundary.
#[inline]
pub fn align_block(pos: u64) -> u64 {
    (pos + BLOCK_ALIGN - 1) & !(BLOCK_ALIGN - 1)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunHeader {
    /// Offset of the next run in the chain.
    pub next: u64,
    /// Record bytes in this run, header excluded.
    pub size: u64,
}

impl RunHeader {
    pub fn to_bytes(self) -> [u8; RUN_HEADER_SIZE] {
        let mut out = [0u8; RUN_HEADER_SIZE];
        out[..8].copy_from_slice(&self.next.to_le_bytes());
        out[8..].copy_from_slice(&self.size.to_le_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8; RUN_HEADER_SIZE]) -> Self {
        let mut next = [0u8; 8];
        let mut size = [0u8; 8];
        next.copy_from_slice(&bytes[..8]);
        size.copy_from_slice(&bytes[8..]);
        RunHeader {
            next: u64::from_le_bytes(next),
            size: u64::from_le_bytes(size),
        }
    }
}

/// Resolve the scratch path for an explicit file name: a bare name is placed
/// in `dir` and a missing extension becomes `.wrk`.
pub fn scratch_path(dir: &Path, name: &Path) -> PathBuf {
    let mut path = if name.parent().is_some_and(|p| !p.as_os_str().is_empty()) {
        name.to_path_buf()
    } else {
        dir.join(name)
    };
    if path.extension().is_none() {
        path.set_extension(SCRATCH_EXT);
    }
    path
}

/// The open scratch file. Runs, and so reads and writes, exist only once it
/// has been created.
pub(crate) fn opened(file: &mut Option<ScratchFile>) -> Result<&mut ScratchFile> {
    file.as_mut().ok_or_else(|| {
        SioError::ScratchFileReadFailed(io::Error::new(
            io::ErrorKind::NotFound,
            "work file not open",
        ))
    })
}

#[derive(Debug)]
pub(crate) struct ScratchFile {
    file: File,
    path: PathBuf,
    /// Set for generated names; removes the file when closed or dropped.
    temp: Option<TempPath>,
}

impl ScratchFile {
    /// Create the scratch file: `name` resolved against `dir` when given,
    /// otherwise a unique `srt*.wrk` file in `dir`.
    pub(crate) fn create(dir: &Path, name: Option<&Path>) -> Result<ScratchFile> {
        match name {
            Some(name) => {
                let path = scratch_path(dir, name);
                let file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(&path)
                    .map_err(|source| SioError::ScratchFileCreateFailed {
                        path: path.clone(),
                        source,
                    })?;
                debug!("created scratch file {}", path.display());
                Ok(ScratchFile {
                    file,
                    path,
                    temp: None,
                })
            }
            None => {
                let named = tempfile::Builder::new()
                    .prefix("srt")
                    .suffix(&format!(".{}", SCRATCH_EXT))
                    .tempfile_in(dir)
                    .map_err(|source| SioError::ScratchFileCreateFailed {
                        path: dir.join(format!("srt*.{}", SCRATCH_EXT)),
                        source,
                    })?;
                let (file, temp) = named.into_parts();
                let path = temp.to_path_buf();
                debug!("created scratch file {}", path.display());
                Ok(ScratchFile {
                    file,
                    path,
                    temp: Some(temp),
                })
            }
        }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn write_at(&mut self, pos: u64, buf: &[u8]) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(pos))?;
        self.file.write_all(buf)
    }

    /// Fill `buf` from `pos`. A short file is an error.
    pub(crate) fn read_at(&mut self, pos: u64, buf: &mut [u8]) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(pos))?;
        self.file.read_exact(buf)
    }

    pub(crate) fn write_header(&mut self, pos: u64, header: RunHeader) -> Result<()> {
        self.write_at(pos, &header.to_bytes())
            .map_err(SioError::ScratchFileWriteFailed)
    }

    pub(crate) fn read_header(&mut self, pos: u64) -> Result<RunHeader> {
        let mut bytes = [0u8; RUN_HEADER_SIZE];
        self.read_at(pos, &mut bytes)
            .map_err(SioError::ScratchFileReadFailed)?;
        Ok(RunHeader::from_bytes(&bytes))
    }

    /// Close and delete the file.
    pub(crate) fn close(self) -> io::Result<()> {
        let ScratchFile { file, path, temp } = self;
        drop(file);
        match temp {
            Some(temp) => temp.close(),
            None => fs::remove_file(&path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_block() {
        assert_eq!(align_block(0), 0);
        assert_eq!(align_block(1), 4096);
        assert_eq!(align_block(4096), 4096);
        assert_eq!(align_block(4097), 8192);
    }

    #[test]
    fn test_header_layout() {
        let h = RunHeader {
            next: 0x1000,
            size: 5,
        };
        let bytes = h.to_bytes();
        assert_eq!(&bytes[..8], &[0, 0x10, 0, 0, 0, 0, 0, 0]);
        assert_eq!(bytes[8], 5);
        assert_eq!(RunHeader::from_bytes(&bytes), h);
    }

    #[test]
    fn test_scratch_path_rules() {
        let dir = Path::new("/tmp/work");
        assert_eq!(
            scratch_path(dir, Path::new("sort")),
            PathBuf::from("/tmp/work/sort.wrk")
        );
        assert_eq!(
            scratch_path(dir, Path::new("sort.tmp")),
            PathBuf::from("/tmp/work/sort.tmp")
        );
        assert_eq!(
            scratch_path(dir, Path::new("/var/x/run")),
            PathBuf::from("/var/x/run.wrk")
        );
    }

    #[test]
    fn test_named_file_created_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let mut f = ScratchFile::create(dir.path(), Some(Path::new("runs"))).unwrap();
        let path = f.path().to_path_buf();
        assert_eq!(path, dir.path().join("runs.wrk"));
        f.write_at(4096, b"abc").unwrap();
        let mut buf = [0u8; 3];
        f.read_at(4096, &mut buf).unwrap();
        assert_eq!(&buf, b"abc");
        f.close().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_generated_name() {
        let dir = tempfile::tempdir().unwrap();
        let f = ScratchFile::create(dir.path(), None).unwrap();
        let path = f.path().to_path_buf();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("srt") && name.ends_with(".wrk"), "{name}");
        assert!(path.exists());
        f.close().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_create_in_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent");
        let err = ScratchFile::create(&missing, Some(Path::new("x"))).unwrap_err();
        assert!(matches!(err, SioError::ScratchFileCreateFailed { .. }));
        assert!(err.to_string().contains("absent"));
    }

    #[test]
    fn test_short_read_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut f = ScratchFile::create(dir.path(), None).unwrap();
        f.write_at(0, b"12345678").unwrap();
        assert!(f.read_header(0).is_err());
    }
}
