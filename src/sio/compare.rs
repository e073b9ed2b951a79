//! Multi-key, type-aware record comparison.
//! Allocation-free; every key is read in place from the record bytes.
use std::cmp::Ordering;

use super::collate::CollationTable;
use super::key::SortKey;

/// Ordinal of a blank, sign or decimal point in a valid numeric field.
/// Digits sit on either side of it: above for positive numbers, below for
/// negative ones, so larger magnitudes of a negative number sort first.
const NUMERIC_BIAS: u8 = 0x0B;
/// Ordinal of every byte of a malformed numeric field.
const NUMERIC_INVALID: u8 = 0x15;
/// Ordinal of every byte of an all-blank numeric field.
const NUMERIC_NULL: u8 = 0x16;

/// Classification of a numeric key range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum NumClass {
    Normal,
    Negative,
    /// Malformed: an embedded blank, a misplaced or trailing sign, a second
    /// decimal point, or any byte that is not a digit.
    Invalid,
    /// All blanks.
    Null,
}

impl NumClass {
    #[inline]
    pub(crate) fn from_u8(v: u8) -> NumClass {
        match v {
            0 => NumClass::Normal,
            1 => NumClass::Negative,
            2 => NumClass::Invalid,
            _ => NumClass::Null,
        }
    }
}

/// Classify a right-justified text number.
pub fn classify_numeric(field: &[u8]) -> NumClass {
    let mut class = NumClass::Null;
    let mut seen_point = false;
    for (i, &b) in field.iter().enumerate() {
        match b {
            b' ' => {
                if class != NumClass::Null {
                    return NumClass::Invalid;
                }
            }
            b'0'..=b'9' => {
                if class == NumClass::Null {
                    class = NumClass::Normal;
                }
            }
            b'.' => {
                if seen_point {
                    return NumClass::Invalid;
                }
                seen_point = true;
                if class == NumClass::Null {
                    class = NumClass::Normal;
                }
            }
            b'-' | b'+' => {
                if class != NumClass::Null || i + 1 == field.len() {
                    return NumClass::Invalid;
                }
                class = if b == b'-' {
                    NumClass::Negative
                } else {
                    NumClass::Normal
                };
            }
            _ => return NumClass::Invalid,
        }
    }
    class
}

/// Remap one byte of a numeric field to its comparison ordinal.
#[inline]
pub fn numeric_ordinal(byte: u8, class: NumClass) -> u8 {
    match class {
        NumClass::Null => NUMERIC_NULL,
        NumClass::Invalid => NUMERIC_INVALID,
        NumClass::Negative if byte.is_ascii_digit() => NUMERIC_BIAS - (byte - b'0'),
        NumClass::Normal if byte.is_ascii_digit() => NUMERIC_BIAS + (byte - b'0'),
        _ => NUMERIC_BIAS,
    }
}

/// Compares records across an ordered key list.
#[derive(Clone, Debug)]
pub struct Comparator {
    keys: Vec<SortKey>,
    collation: Option<CollationTable>,
}

impl Comparator {
    pub fn new(keys: Vec<SortKey>, collation: Option<CollationTable>) -> Self {
        Comparator { keys, collation }
    }

    #[inline]
    pub fn keys(&self) -> &[SortKey] {
        &self.keys
    }

    /// True when any key compares as a text number.
    pub fn has_numeric_key(&self) -> bool {
        self.keys.iter().any(|k| k.flags.is_numeric())
    }

    /// Compare two whole records. `Equal` only when every key ties; with no
    /// keys every pair ties.
    #[inline]
    pub fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        match self.keys.first() {
            Some(first) => self.compare_from(a, b, 0, first.start),
            None => Ordering::Equal,
        }
    }

    /// Compare starting at key `key_index`, byte `offset` within the record.
    /// Bytes of that key before `offset` are assumed equal already.
    pub fn compare_from(&self, a: &[u8], b: &[u8], key_index: usize, offset: usize) -> Ordering {
        let mut pos = offset;
        for key in &self.keys[key_index..] {
            let ord = self.compare_key(a, b, key, pos.max(key.start));
            if ord != Ordering::Equal {
                return if key.flags.is_descending() {
                    ord.reverse()
                } else {
                    ord
                };
            }
            pos = 0;
        }
        Ordering::Equal
    }

    fn compare_key(&self, a: &[u8], b: &[u8], key: &SortKey, from: usize) -> Ordering {
        let end = key.end;
        if key.flags.is_numeric() {
            let class_a = classify_numeric(&a[key.start..end]);
            let class_b = classify_numeric(&b[key.start..end]);
            for p in from..end {
                let ord = numeric_ordinal(a[p], class_a).cmp(&numeric_ordinal(b[p], class_b));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            return Ordering::Equal;
        }
        match self.table_for(key) {
            None => a[from..end].cmp(&b[from..end]),
            Some(table) => {
                for p in from..end {
                    if a[p] != b[p] {
                        let ord = table.priority(a[p]).cmp(&table.priority(b[p]));
                        if ord != Ordering::Equal {
                            return ord;
                        }
                    }
                }
                Ordering::Equal
            }
        }
    }

    /// The collation table that applies to `key`, if any.
    #[inline]
    fn table_for(&self, key: &SortKey) -> Option<&CollationTable> {
        if key.flags.is_position() {
            None
        } else {
            self.collation.as_ref()
        }
    }

    /// Distribution ordinal (0-255) of record byte `pos` under key
    /// `key_index`. Descending keys are flipped so buckets always ascend.
    #[inline]
    pub(crate) fn bucket(&self, key_index: usize, byte: u8, class: NumClass) -> usize {
        let key = &self.keys[key_index];
        let v = if key.flags.is_numeric() {
            numeric_ordinal(byte, class)
        } else {
            match self.table_for(key) {
                None => byte,
                Some(table) => table.priority(byte),
            }
        };
        if key.flags.is_descending() {
            (u8::MAX - v) as usize
        } else {
            v as usize
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sio::key::KeyFlags;

    #[test]
    fn test_classify() {
        assert_eq!(classify_numeric(b"00012"), NumClass::Normal);
        assert_eq!(classify_numeric(b"  -12"), NumClass::Negative);
        assert_eq!(classify_numeric(b"  +12"), NumClass::Normal);
        assert_eq!(classify_numeric(b"     "), NumClass::Null);
        assert_eq!(classify_numeric(b"1.2.3"), NumClass::Invalid);
        assert_eq!(classify_numeric(b" 1 2 "), NumClass::Invalid);
        assert_eq!(classify_numeric(b"    -"), NumClass::Invalid);
        assert_eq!(classify_numeric(b" 1-23"), NumClass::Invalid);
        assert_eq!(classify_numeric(b" 12a "), NumClass::Invalid);
        assert_eq!(classify_numeric(b"  1.5"), NumClass::Normal);
    }

    #[test]
    fn test_ordinals_bracket_digits() {
        assert_eq!(numeric_ordinal(b'0', NumClass::Normal), 0x0B);
        assert_eq!(numeric_ordinal(b'9', NumClass::Normal), 0x14);
        assert_eq!(numeric_ordinal(b'9', NumClass::Negative), 0x02);
        assert_eq!(numeric_ordinal(b' ', NumClass::Normal), 0x0B);
        assert!(numeric_ordinal(b'1', NumClass::Invalid) > numeric_ordinal(b'9', NumClass::Normal));
        assert!(numeric_ordinal(b' ', NumClass::Null) > numeric_ordinal(b'1', NumClass::Invalid));
    }

    #[test]
    fn test_numeric_key_order() {
        let cmp = Comparator::new(vec![SortKey::new(0, 5, KeyFlags::NUMERIC)], None);
        let mut recs: Vec<&[u8]> = vec![&b"   12"[..], b"  -12", b"     ", b"  -03", b"00007", b"1.2.3"];
        recs.sort_by(|a, b| cmp.compare(a, b));
        assert_eq!(
            recs,
            vec![&b"  -12"[..], b"  -03", b"00007", b"   12", b"1.2.3", b"     "]
        );
    }

    #[test]
    fn test_descending_and_secondary_key() {
        let cmp = Comparator::new(
            vec![SortKey::descending(0, 1), SortKey::ascending(1, 3)],
            None,
        );
        assert_eq!(cmp.compare(b"a10", b"b05"), Ordering::Greater);
        assert_eq!(cmp.compare(b"a10", b"a05"), Ordering::Greater);
        assert_eq!(cmp.compare(b"a05", b"a05"), Ordering::Equal);
    }

    #[test]
    fn test_collation_and_position_keys() {
        let fold = CollationTable::ascii_case_insensitive();
        let collated = Comparator::new(vec![SortKey::ascending(0, 3)], Some(fold.clone()));
        assert_eq!(collated.compare(b"abc", b"ABC"), Ordering::Equal);
        assert_eq!(collated.compare(b"abd", b"ABC"), Ordering::Greater);

        let raw = Comparator::new(
            vec![SortKey::new(0, 3, KeyFlags::ASCEND | KeyFlags::POSITION)],
            Some(fold),
        );
        assert_eq!(raw.compare(b"abc", b"ABC"), Ordering::Greater);
    }

    #[test]
    fn test_compare_from_skips_settled_prefix() {
        let cmp = Comparator::new(vec![SortKey::ascending(0, 4)], None);
        // Byte 0 differs but is skipped when resuming at byte 1.
        assert_eq!(cmp.compare_from(b"b123", b"a123", 0, 1), Ordering::Equal);
        assert_eq!(cmp.compare_from(b"b124", b"a123", 0, 1), Ordering::Greater);
    }

    #[test]
    fn test_no_keys_all_equal() {
        let cmp = Comparator::new(Vec::new(), None);
        assert_eq!(cmp.compare(b"zz", b"aa"), Ordering::Equal);
    }
}
