//! The packed extent word stored in every ring slot.
//!
//! ```text
//!  63                                           20 19                 0
//! +-----------------------------------------------+--------------------+
//! |          base address >> 12 (frame)           |   page count - 1   |
//! +-----------------------------------------------+--------------------+
//! ```
//!
//! Storing the frame number at bit 20 is the same as storing the page-aligned
//! base address shifted left by [`ADDR_SHIFT`]; the 12 low address bits that
//! are always zero plus the shift give the count field its 20 bits.

use bitfield_struct::bitfield;
use core::fmt;
use kernel_info::memory::PAGE_SIZE;

/// Extra left shift applied to the page-aligned base address.
pub const ADDR_SHIFT: u32 = 8;

/// Width of the count field.
pub const COUNT_BITS: u32 = 12 + ADDR_SHIFT;

/// Largest run a single extent can describe, in pages.
pub const MAX_PAGES: u64 = 1 << COUNT_BITS;

/// A contiguous run of free physical pages.
#[bitfield(u64, order = Lsb, debug = false)]
#[derive(PartialEq, Eq)]
pub struct Extent {
    #[bits(20)]
    pages_minus_one: u32,

    #[bits(44)]
    frame: u64,
}

const _: () = assert!(COUNT_BITS == 20);

impl Extent {
    /// Packs `(base, pages)`.
    ///
    /// `base` must be page-aligned and `pages` must be in `1..=MAX_PAGES`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from_parts(base: u64, pages: u64) -> Self {
        debug_assert!(base.is_multiple_of(PAGE_SIZE));
        debug_assert!(pages >= 1 && pages <= MAX_PAGES);
        Self::new()
            .with_frame(base / PAGE_SIZE)
            .with_pages_minus_one((pages - 1) as u32)
    }

    /// Physical base address.
    #[must_use]
    pub const fn base(&self) -> u64 {
        self.frame() * PAGE_SIZE
    }

    /// Number of pages, `1..=MAX_PAGES`.
    #[must_use]
    pub const fn pages(&self) -> u64 {
        self.pages_minus_one() as u64 + 1
    }

    #[must_use]
    pub const fn bytes(&self) -> u64 {
        self.pages() * PAGE_SIZE
    }

    /// Exclusive end address.
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.base() + self.bytes()
    }

    /// Joins `self` with the run directly above it, if the sum still fits.
    #[must_use]
    pub const fn merged(self, upper: Self) -> Option<Self> {
        if self.end() == upper.base() && self.pages() + upper.pages() <= MAX_PAGES {
            Some(Self::from_parts(self.base(), self.pages() + upper.pages()))
        } else {
            None
        }
    }

    /// Splits off the first `pages` pages. The remainder is `None` on an exact fit.
    #[must_use]
    pub const fn split(self, pages: u64) -> (Self, Option<Self>) {
        debug_assert!(pages >= 1 && pages <= self.pages());
        let taken = Self::from_parts(self.base(), pages);
        if pages == self.pages() {
            (taken, None)
        } else {
            let rest = Self::from_parts(taken.end(), self.pages() - pages);
            (taken, Some(rest))
        }
    }
}

impl fmt::Debug for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Extent({:#x}..{:#x}, {} pages)", self.base(), self.end(), self.pages())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_address_high_and_count_low() {
        let e = Extent::from_parts(0x1234_5000, 3);
        assert_eq!(e.into_bits(), (0x1234_5000 << ADDR_SHIFT) | 2);
        assert_eq!(e.base(), 0x1234_5000);
        assert_eq!(e.pages(), 3);
    }

    #[test]
    fn max_run_uses_all_count_bits() {
        let e = Extent::from_parts(0, MAX_PAGES);
        assert_eq!(e.into_bits(), MAX_PAGES - 1);
        assert_eq!(e.pages(), MAX_PAGES);
        assert_eq!(e.end(), MAX_PAGES * PAGE_SIZE);
    }

    #[test]
    fn merge_requires_adjacency_and_fit() {
        let lo = Extent::from_parts(0x10000, 2);
        let hi = Extent::from_parts(0x12000, 3);
        assert_eq!(lo.merged(hi), Some(Extent::from_parts(0x10000, 5)));
        assert_eq!(hi.merged(lo), None);

        let gap = Extent::from_parts(0x13000, 1);
        assert_eq!(lo.merged(gap), None);

        let big = Extent::from_parts(0, MAX_PAGES);
        let next = Extent::from_parts(big.end(), 1);
        assert_eq!(big.merged(next), None);
    }

    #[test]
    fn split_front() {
        let e = Extent::from_parts(0x10000, 4);
        assert_eq!(
            e.split(1),
            (Extent::from_parts(0x10000, 1), Some(Extent::from_parts(0x11000, 3)))
        );
        assert_eq!(e.split(4), (e, None));
    }
}
