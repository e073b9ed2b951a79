//! Caller-supplied collation: a 256-entry byte-to-priority map used in place
//! of raw byte order for character keys.

use std::fs;
use std::path::Path;

use super::error::SioError;

/// Number of entries in a collation table.
pub const COLLATION_SIZE: usize = 256;

/// Byte-to-priority lookup table.
#[derive(Clone, PartialEq, Eq)]
pub struct CollationTable {
    priority: [u8; COLLATION_SIZE],
}

impl CollationTable {
    /// The table that reproduces raw byte order.
    pub fn identity() -> Self {
        let mut priority = [0u8; COLLATION_SIZE];
        for (i, p) in priority.iter_mut().enumerate() {
            *p = i as u8;
        }
        CollationTable { priority }
    }

    /// Build a table from exactly 256 priority bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SioError> {
        let priority: [u8; COLLATION_SIZE] = bytes.try_into().map_err(|_| {
            SioError::CollationTableInvalid(format!(
                "expected {} bytes, found {}",
                COLLATION_SIZE,
                bytes.len()
            ))
        })?;
        Ok(CollationTable { priority })
    }

    /// Read a table from a 256-byte file.
    pub fn load(path: &Path) -> Result<Self, SioError> {
        let bytes = fs::read(path).map_err(|e| {
            SioError::CollationTableInvalid(format!(
                "{}: {}",
                crate::common::io_error_msg(&e),
                path.display()
            ))
        })?;
        Self::from_bytes(&bytes)
    }

    /// Case-folding table: lowercase ASCII letters share the priority of their
    /// uppercase counterparts.
    pub fn ascii_case_insensitive() -> Self {
        let mut table = Self::identity();
        for c in b'a'..=b'z' {
            table.priority[c as usize] = c.to_ascii_uppercase();
        }
        table
    }

    #[inline(always)]
    pub fn priority(&self, byte: u8) -> u8 {
        self.priority[byte as usize]
    }
}

impl std::fmt::Debug for CollationTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let remapped = self
            .priority
            .iter()
            .enumerate()
            .filter(|&(i, &p)| i != p as usize)
            .count();
        f.debug_struct("CollationTable")
            .field("remapped", &remapped)
            .finish()
    }
}
