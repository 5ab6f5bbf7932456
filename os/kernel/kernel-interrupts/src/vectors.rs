//! Vector reservation.
//!
//! A vector is either free, or blocked by an exclusive allocation. Handler
//! registration is tracked separately, so a blocked vector can still carry
//! the handlers of whoever blocked it.

use crate::error::InterruptError;
use log::debug;

pub const VECTOR_COUNT: usize = 256;

/// Vectors below this are CPU exceptions and never handed out by a scan.
pub const FIRST_DYNAMIC_VECTOR: u8 = 32;

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct VectorFlags {
    /// Only `[base, base + count)` is acceptable.
    pub fixed: bool,
    /// Block the range so that later allocations skip it.
    pub exclusive: bool,
}

impl VectorFlags {
    pub const SHARED: Self = Self {
        fixed: false,
        exclusive: false,
    };

    pub const EXCLUSIVE: Self = Self {
        fixed: false,
        exclusive: true,
    };

    #[must_use]
    pub const fn fixed(self) -> Self {
        Self {
            fixed: true,
            ..self
        }
    }
}

/// The blocked flag of every vector.
pub struct VectorMap {
    blocked: [bool; VECTOR_COUNT],
}

impl Default for VectorMap {
    fn default() -> Self {
        Self::new()
    }
}

impl VectorMap {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            blocked: [false; VECTOR_COUNT],
        }
    }

    #[must_use]
    pub const fn is_blocked(&self, vector: u8) -> bool {
        self.blocked[vector as usize]
    }

    /// Reserves `count` consecutive vectors and returns the first.
    ///
    /// With `flags.fixed` only `[base, base + count)` is tried. Otherwise a
    /// non-zero `base` is tried first, then the first free run at or above
    /// [`FIRST_DYNAMIC_VECTOR`].
    ///
    /// # Errors
    /// [`InterruptError::VectorUnavailable`] if no acceptable run is free.
    pub fn allocate(
        &mut self,
        count: usize,
        flags: VectorFlags,
        base: u8,
    ) -> Result<u8, InterruptError> {
        let unavailable = InterruptError::VectorUnavailable { base, count };
        if count == 0 || count > VECTOR_COUNT {
            return Err(unavailable);
        }

        let start = if flags.fixed || base != 0 {
            match (self.range_free(base, count), flags.fixed) {
                (true, _) => Some(base),
                (false, true) => return Err(unavailable),
                (false, false) => self.scan(count),
            }
        } else {
            self.scan(count)
        }
        .ok_or(unavailable)?;

        if flags.exclusive {
            self.set_blocked(start, count, true);
        }
        debug!(
            "Allocated vectors {start:#x}..{:#x} ({})",
            usize::from(start) + count,
            if flags.exclusive { "exclusive" } else { "shared" }
        );
        Ok(start)
    }

    /// Clears the blocked flag of `[base, base + count)`. Out-of-range
    /// vectors are ignored.
    pub fn release(&mut self, base: u8, count: usize) {
        let end = usize::from(base).saturating_add(count).min(VECTOR_COUNT);
        self.blocked[usize::from(base)..end].fill(false);
    }

    fn range_free(&self, base: u8, count: usize) -> bool {
        let start = usize::from(base);
        start + count <= VECTOR_COUNT && !self.blocked[start..start + count].contains(&true)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn scan(&self, count: usize) -> Option<u8> {
        let mut run = 0;
        for v in usize::from(FIRST_DYNAMIC_VECTOR)..VECTOR_COUNT {
            if self.blocked[v] {
                run = 0;
                continue;
            }
            run += 1;
            if run == count {
                return Some((v + 1 - count) as u8);
            }
        }
        None
    }

    fn set_blocked(&mut self, base: u8, count: usize, blocked: bool) {
        let start = usize::from(base);
        self.blocked[start..start + count].fill(blocked);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_exclusive_blocks_the_range() {
        let mut map = VectorMap::new();
        let flags = VectorFlags::EXCLUSIVE.fixed();
        assert_eq!(map.allocate(2, flags, 0x40), Ok(0x40));
        assert!(map.is_blocked(0x40) && map.is_blocked(0x41) && !map.is_blocked(0x42));

        assert_eq!(
            map.allocate(1, flags, 0x41),
            Err(InterruptError::VectorUnavailable {
                base: 0x41,
                count: 1
            })
        );
        // Shared allocations may overlap each other but not blocked vectors.
        assert!(map.allocate(1, VectorFlags::SHARED.fixed(), 0x40).is_err());
        assert_eq!(map.allocate(1, VectorFlags::SHARED.fixed(), 0x42), Ok(0x42));
        assert_eq!(map.allocate(1, VectorFlags::SHARED.fixed(), 0x42), Ok(0x42));
    }

    #[test]
    fn fixed_range_must_fit() {
        let mut map = VectorMap::new();
        assert!(map.allocate(2, VectorFlags::SHARED.fixed(), 0xFF).is_err());
        assert_eq!(map.allocate(1, VectorFlags::SHARED.fixed(), 0xFF), Ok(0xFF));
        assert!(map.allocate(0, VectorFlags::SHARED, 0).is_err());
        assert!(map.allocate(257, VectorFlags::SHARED, 0).is_err());
    }

    #[test]
    fn scan_starts_above_exceptions_and_skips_blocked() {
        let mut map = VectorMap::new();
        assert_eq!(map.allocate(4, VectorFlags::EXCLUSIVE, 0), Ok(32));
        assert_eq!(map.allocate(1, VectorFlags::EXCLUSIVE, 0), Ok(36));
        map.release(33, 1);
        assert_eq!(map.allocate(1, VectorFlags::EXCLUSIVE, 0), Ok(33));
        assert_eq!(map.allocate(2, VectorFlags::EXCLUSIVE, 0), Ok(37));
    }

    #[test]
    fn preferred_base_falls_back_to_scan() {
        let mut map = VectorMap::new();
        map.allocate(1, VectorFlags::EXCLUSIVE.fixed(), 0x50).unwrap();
        assert_eq!(map.allocate(1, VectorFlags::EXCLUSIVE, 0x50), Ok(32));
        assert_eq!(map.allocate(1, VectorFlags::EXCLUSIVE, 0x60), Ok(0x60));
    }

    #[test]
    fn run_may_end_at_the_last_vector() {
        let mut map = VectorMap::new();
        map.allocate(
            usize::from(0xF0 - FIRST_DYNAMIC_VECTOR),
            VectorFlags::EXCLUSIVE,
            0,
        )
        .unwrap();
        assert_eq!(map.allocate(16, VectorFlags::EXCLUSIVE, 0), Ok(0xF0));
        assert!(map.allocate(1, VectorFlags::EXCLUSIVE, 0).is_err());

        map.release(0, 256);
        assert_eq!(map.allocate(224, VectorFlags::SHARED, 0), Ok(32));
    }

    #[test]
    fn release_clamps_oversized_counts() {
        let mut map = VectorMap::new();
        map.allocate(2, VectorFlags::EXCLUSIVE.fixed(), 0xFE).unwrap();
        map.allocate(1, VectorFlags::EXCLUSIVE.fixed(), 0x40).unwrap();

        map.release(0xFE, usize::MAX);
        assert!(!map.is_blocked(0xFE) && !map.is_blocked(0xFF));
        assert!(map.is_blocked(0x40));
    }
}
