//! Error kinds reported by a sort session.
//!
//! Every variant is fatal to the session: the engine never retries, and the
//! on-disk run chain has no redundancy to resume from. The `Display` text is
//! the fully formatted message exposed through `Session::last_error_string`.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::common::io_error_msg;

/// Result type alias for sort session operations.
pub type Result<T> = std::result::Result<T, SioError>;

/// Errors produced by the sort engine.
#[derive(Error, Debug)]
pub enum SioError {
    /// The session was interrupted or already torn down.
    #[error("HALTED - user interrupt")]
    Interrupted,

    /// No buffer at or above the hard minimum could be allocated.
    #[error("Unable to allocate memory for sort buffers")]
    OutOfMemory,

    /// The scratch file could not be created.
    #[error("Unable to create work file: {}: {}", io_error_msg(.source), .path.display())]
    ScratchFileCreateFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A read from the scratch file failed or came back short.
    #[error("Unable to read from work file: {}", io_error_msg(.0))]
    ScratchFileReadFailed(#[source] io::Error),

    /// A write to the scratch file failed.
    #[error("Unable to write to work file: {}", io_error_msg(.0))]
    ScratchFileWriteFailed(#[source] io::Error),

    /// The collation table could not be opened, read, or had the wrong size.
    #[error("Error with collate file, unable to open, wrong size, or unable to read: {0}")]
    CollationTableInvalid(String),

    /// The session configuration was rejected before any allocation.
    #[error("Invalid sort configuration: {0}")]
    InvalidConfig(String),

    /// A record callback of the convenience wrapper failed.
    #[error("Record callback failed: {}", io_error_msg(.0))]
    Caller(#[source] io::Error),

    /// Escape hatch for unrecognized internal codes.
    #[error("*** UNKNOWN ERROR {0} ***")]
    Unknown(i32),
}

impl SioError {
    /// True for the scratch-file I/O kinds.
    pub fn is_scratch_io(&self) -> bool {
        matches!(
            self,
            SioError::ScratchFileCreateFailed { .. }
                | SioError::ScratchFileReadFailed(_)
                | SioError::ScratchFileWriteFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_messages() {
        assert_eq!(SioError::Interrupted.to_string(), "HALTED - user interrupt");
        assert_eq!(
            SioError::OutOfMemory.to_string(),
            "Unable to allocate memory for sort buffers"
        );
        assert_eq!(SioError::Unknown(42).to_string(), "*** UNKNOWN ERROR 42 ***");
    }

    #[test]
    fn test_create_message_has_os_text_and_name() {
        let err = SioError::ScratchFileCreateFailed {
            path: PathBuf::from("/nowhere/sort.wrk"),
            source: io::Error::from_raw_os_error(2),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("Unable to create work file: "), "got: {msg}");
        assert!(msg.ends_with(": /nowhere/sort.wrk"), "got: {msg}");
        assert!(!msg.contains("os error"), "got: {msg}");
        assert!(err.is_scratch_io());
    }

    #[test]
    fn test_read_failure_message() {
        let err = SioError::ScratchFileReadFailed(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "short read",
        ));
        assert_eq!(err.to_string(), "Unable to read from work file: short read");
    }
}
