//! Entries of the permutation table.
//!
//! A slot is a record index tagged with a boundary bit. During internal
//! sorting the bit marks the last position of a group whose order is settled
//! for the bytes examined so far. Packing the tag into the index halves the
//! addressable record count: a buffer holds at most [`MAX_BUFFER_RECORDS`]
//! records.

/// Largest number of records one buffer can address (31 index bits).
pub const MAX_BUFFER_RECORDS: usize = (1 << 31) - 1;

const BOUNDARY: u32 = 1 << 31;

#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct Slot(u32);

impl Slot {
    /// Vacated position during a scatter pass. Tagged so that a cycle walk
    /// stops when it reaches it.
    pub(crate) const HOLE: Slot = Slot(BOUNDARY);

    #[inline(always)]
    pub fn new(index: usize) -> Slot {
        debug_assert!(index <= MAX_BUFFER_RECORDS);
        Slot(index as u32)
    }

    #[inline(always)]
    pub fn index(self) -> usize {
        (self.0 & !BOUNDARY) as usize
    }

    #[inline(always)]
    pub fn is_boundary(self) -> bool {
        self.0 & BOUNDARY != 0
    }

    #[inline(always)]
    pub fn with_boundary(self) -> Slot {
        Slot(self.0 | BOUNDARY)
    }

    #[inline(always)]
    pub fn without_boundary(self) -> Slot {
        Slot(self.0 & !BOUNDARY)
    }
}

impl std::fmt::Debug for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_boundary() {
            write!(f, "{}|", self.index())
        } else {
            write!(f, "{}", self.index())
        }
    }
}
