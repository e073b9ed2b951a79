use std::path::PathBuf;

use super::collate::CollationTable;
use super::display::DisplayFlags;
use super::key::SortKey;

/// Budget used when the caller passes 0.
pub const DEFAULT_MEMORY_BUDGET: usize = 2 << 20;

/// Default cap on runs merged at once.
pub const DEFAULT_MAX_MERGE: usize = 34;

/// Configuration for a sort session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub record_length: usize,
    pub keys: Vec<SortKey>,
    /// Directory for the scratch file; `.` when unset.
    pub working_dir: Option<PathBuf>,
    /// Explicit scratch file name. A unique name is generated when unset.
    pub work_filename: Option<PathBuf>,
    /// Bytes for buffers; 0 selects [`DEFAULT_MEMORY_BUDGET`].
    pub memory_budget: usize,
    pub display: DisplayFlags,
    pub collation: Option<CollationTable>,
    /// Fan-in cap of one merge batch. Values below 2 act as 2.
    pub max_merge: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            record_length: 0,
            keys: Vec::new(),
            working_dir: None,
            work_filename: None,
            memory_budget: 0,
            display: DisplayFlags::NONE,
            collation: None,
            max_merge: DEFAULT_MAX_MERGE,
        }
    }
}

impl SessionConfig {
    /// Config with default budget, scratch location and merge cap.
    pub fn new(record_length: usize, keys: Vec<SortKey>) -> Self {
        SessionConfig {
            record_length,
            keys,
            ..Default::default()
        }
    }
}

/// Memory budget from the command line: a byte count optionally followed
/// by one unit letter. `K`, `M`, `G` and `T` scale by powers of 1024 in
/// either case; `b` counts 512-byte blocks.
pub fn parse_buffer_size(s: &str) -> Result<usize, String> {
    let arg = s.trim();
    let split = arg
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(arg.len());
    let (digits, unit) = arg.split_at(split);
    if digits.is_empty() {
        return Err(format!("'{}' does not start with a byte count", arg));
    }
    let shift = match unit {
        "" => 0,
        "b" => 9,
        "K" | "k" => 10,
        "M" | "m" => 20,
        "G" | "g" => 30,
        "T" | "t" => 40,
        _ => return Err(format!("unknown unit '{}' in '{}'", unit, arg)),
    };
    digits
        .parse::<u64>()
        .ok()
        .and_then(|count| count.checked_mul(1u64 << shift))
        .and_then(|bytes| usize::try_from(bytes).ok())
        .ok_or_else(|| format!("'{}' does not fit in memory", arg))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_size_units() {
        assert_eq!(parse_buffer_size("4096"), Ok(4096));
        assert_eq!(parse_buffer_size(" 64K "), Ok(64 << 10));
        assert_eq!(parse_buffer_size("3m"), Ok(3 << 20));
        assert_eq!(parse_buffer_size("1G"), Ok(1 << 30));
        assert_eq!(parse_buffer_size("10b"), Ok(5120));
    }

    #[test]
    fn test_buffer_size_rejects_garbage() {
        assert!(parse_buffer_size("").is_err());
        assert!(parse_buffer_size("K").is_err());
        assert!(parse_buffer_size("12X").is_err());
        assert!(parse_buffer_size("12KB").is_err());
        assert!(parse_buffer_size("-5").is_err());
        assert!(parse_buffer_size("99999999999999999999").is_err());
        assert!(parse_buffer_size("20000000T").is_err());
    }

    #[test]
    fn test_default_config() {
        let cfg = SessionConfig::new(80, vec![SortKey::ascending(0, 10)]);
        assert_eq!(cfg.memory_budget, 0);
        assert_eq!(cfg.max_merge, DEFAULT_MAX_MERGE);
        assert!(cfg.working_dir.is_none());
        assert!(cfg.display.is_empty());
    }
}
