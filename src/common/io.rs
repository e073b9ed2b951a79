use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::ops::Deref;
use std::path::Path;
use std::slice::ChunksExact;

#[cfg(target_os = "linux")]
use std::sync::atomic::{AtomicBool, Ordering};

use memmap2::{Mmap, MmapOptions};

/// Whole input, either mapped or read into memory.
pub enum InputData {
    Mmap(Mmap),
    Owned(Vec<u8>),
}

impl Deref for InputData {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            InputData::Mmap(m) => m,
            InputData::Owned(v) => v,
        }
    }
}

/// Files smaller than this are read; larger ones are mapped.
const MMAP_THRESHOLD: u64 = 1024 * 1024;

#[cfg(target_os = "linux")]
static NOATIME_SUPPORTED: AtomicBool = AtomicBool::new(true);

/// Open read-only with O_NOATIME where the kernel lets us.
#[cfg(target_os = "linux")]
fn open_noatime(path: &Path) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    if NOATIME_SUPPORTED.load(Ordering::Relaxed) {
        match OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NOATIME)
            .open(path)
        {
            Ok(f) => return Ok(f),
            // Only the owner may set O_NOATIME.
            Err(ref e) if e.raw_os_error() == Some(libc::EPERM) => {
                NOATIME_SUPPORTED.store(false, Ordering::Relaxed);
            }
            Err(e) => return Err(e),
        }
    }
    File::open(path)
}

#[cfg(not(target_os = "linux"))]
fn open_noatime(path: &Path) -> io::Result<File> {
    OpenOptions::new().read(true).open(path)
}

/// Read a record file. Large regular files are mapped with a sequential
/// access hint since the sorter walks them once front to back.
pub fn read_file(path: &Path) -> io::Result<InputData> {
    let file = open_noatime(path)?;
    let metadata = file.metadata()?;
    let len = metadata.len();

    if !metadata.file_type().is_file() || len < MMAP_THRESHOLD {
        let mut buf = Vec::with_capacity(len as usize);
        let mut reader = file;
        reader.read_to_end(&mut buf)?;
        return Ok(InputData::Owned(buf));
    }

    // SAFETY: read-only mapping; the input is not modified while we hold it.
    match unsafe { MmapOptions::new().map(&file) } {
        Ok(mmap) => {
            #[cfg(unix)]
            {
                let _ = mmap.advise(memmap2::Advice::Sequential);
            }
            Ok(InputData::Mmap(mmap))
        }
        Err(_) => {
            let mut buf = Vec::with_capacity(len as usize);
            let mut reader = file;
            reader.read_to_end(&mut buf)?;
            Ok(InputData::Owned(buf))
        }
    }
}

/// Read all of stdin.
pub fn read_stdin() -> io::Result<InputData> {
    const PREALLOC: usize = 4 * 1024 * 1024;
    let mut buf = Vec::with_capacity(PREALLOC);
    io::stdin().lock().read_to_end(&mut buf)?;
    Ok(InputData::Owned(buf))
}

/// Split input into records of `record_length` bytes. A trailing partial
/// record is `InvalidData`.
pub fn split_records(data: &[u8], record_length: usize) -> io::Result<ChunksExact<'_, u8>> {
    if record_length == 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "record length must be positive",
        ));
    }
    let partial = data.len() % record_length;
    if partial != 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "input ends with a partial record ({} of {} bytes)",
                partial, record_length
            ),
        ));
    }
    Ok(data.chunks_exact(record_length))
}
