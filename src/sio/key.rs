//! Sort key definitions: a byte range `[start, end)` of a fixed-length record
//! plus type flags.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use super::error::SioError;

/// Maximum number of keys a session accepts.
pub const MAX_KEYS: usize = 32;

/// Type flags of a sort key. `ASCEND` and `DESCEND` are mutually exclusive;
/// a key with neither is ascending.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct KeyFlags(u8);

impl KeyFlags {
    pub const ASCEND: KeyFlags = KeyFlags(0x01);
    pub const DESCEND: KeyFlags = KeyFlags(0x02);
    /// Compare raw bytes even when a collation table is installed.
    pub const POSITION: KeyFlags = KeyFlags(0x04);
    /// Compare as right-justified text numbers.
    pub const NUMERIC: KeyFlags = KeyFlags(0x08);

    const ALL: u8 = 0x0F;

    #[inline]
    pub const fn empty() -> Self {
        KeyFlags(0)
    }

    #[inline]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Build flags from raw bits, dropping unknown ones.
    #[inline]
    pub const fn from_bits_truncate(bits: u8) -> Self {
        KeyFlags(bits & Self::ALL)
    }

    #[inline]
    pub const fn contains(self, other: KeyFlags) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn is_descending(self) -> bool {
        self.contains(Self::DESCEND)
    }

    #[inline]
    pub fn is_numeric(self) -> bool {
        self.contains(Self::NUMERIC)
    }

    #[inline]
    pub fn is_position(self) -> bool {
        self.contains(Self::POSITION)
    }

    /// Parse single-letter flags: `a` ascend, `d` descend, `p` position,
    /// `n` numeric.
    pub fn parse_flags(flags: &str) -> Result<KeyFlags, String> {
        let mut out = KeyFlags::empty();
        for c in flags.chars() {
            match c {
                'a' => out |= KeyFlags::ASCEND,
                'd' => out |= KeyFlags::DESCEND,
                'p' => out |= KeyFlags::POSITION,
                'n' => out |= KeyFlags::NUMERIC,
                _ => return Err(format!("invalid key flag '{}'", c)),
            }
        }
        Ok(out)
    }
}

impl BitOr for KeyFlags {
    type Output = KeyFlags;

    fn bitor(self, rhs: KeyFlags) -> KeyFlags {
        KeyFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for KeyFlags {
    fn bitor_assign(&mut self, rhs: KeyFlags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for KeyFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (flag, c) in [
            (KeyFlags::ASCEND, 'a'),
            (KeyFlags::DESCEND, 'd'),
            (KeyFlags::POSITION, 'p'),
            (KeyFlags::NUMERIC, 'n'),
        ] {
            if self.contains(flag) {
                write!(f, "{}", c)?;
            }
        }
        Ok(())
    }
}

/// One sort key. Keys are evaluated in list order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SortKey {
    pub start: usize,
    pub end: usize,
    pub flags: KeyFlags,
}

impl SortKey {
    pub fn new(start: usize, end: usize, flags: KeyFlags) -> Self {
        SortKey { start, end, flags }
    }

    /// Ascending character key over `[start, end)`.
    pub fn ascending(start: usize, end: usize) -> Self {
        Self::new(start, end, KeyFlags::ASCEND)
    }

    /// Descending character key over `[start, end)`.
    pub fn descending(start: usize, end: usize) -> Self {
        Self::new(start, end, KeyFlags::DESCEND)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Parse a key spec like "0,5", "10,14n" or "3,8dp".
    /// Offsets are 0-based and the end is exclusive.
    pub fn parse(spec: &str) -> Result<SortKey, String> {
        let (start_str, rest) = spec
            .split_once(',')
            .ok_or_else(|| format!("missing ',' in key spec '{}'", spec))?;
        let split = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        let (end_str, flag_str) = rest.split_at(split);

        let start = start_str
            .trim()
            .parse::<usize>()
            .map_err(|_| format!("invalid key start '{}'", start_str))?;
        let end = end_str
            .parse::<usize>()
            .map_err(|_| format!("invalid key end '{}'", end_str))?;
        let flags = KeyFlags::parse_flags(flag_str)?;

        let key = SortKey { start, end, flags };
        key.check_shape().map_err(|e| format!("{}: '{}'", e, spec))?;
        Ok(key)
    }

    /// Shape checks that do not depend on the record length.
    fn check_shape(&self) -> Result<(), String> {
        if self.start >= self.end {
            return Err("key start must be before key end".to_string());
        }
        if self.flags.contains(KeyFlags::ASCEND) && self.flags.contains(KeyFlags::DESCEND) {
            return Err("key cannot be both ascending and descending".to_string());
        }
        Ok(())
    }

    pub(crate) fn validate(&self, record_length: usize) -> Result<(), SioError> {
        self.check_shape().map_err(SioError::InvalidConfig)?;
        if self.end > record_length {
            return Err(SioError::InvalidConfig(format!(
                "key [{}, {}) extends past record length {}",
                self.start, self.end, record_length
            )));
        }
        Ok(())
    }
}

/// Validate a key list against the record geometry.
pub(crate) fn validate_keys(keys: &[SortKey], record_length: usize) -> Result<(), SioError> {
    if record_length == 0 {
        return Err(SioError::InvalidConfig(
            "record length must be positive".to_string(),
        ));
    }
    if keys.len() > MAX_KEYS {
        return Err(SioError::InvalidConfig(format!(
            "{} keys given, at most {} supported",
            keys.len(),
            MAX_KEYS
        )));
    }
    keys.iter().try_for_each(|k| k.validate(record_length))
}
