//! The coalescing physical page allocator.
//!
//! Free memory is a queue of [`Extent`]s. Allocation takes from the head and
//! puts any unused remainder back at the head, so consecutive allocations
//! carve one extent front to back. Freed runs go to the tail. When the queue
//! fills up (or a scan comes up empty) it is compacted: sorted by address and
//! merged.

use crate::error::FrameAllocError;
use crate::extent::{Extent, MAX_PAGES};
use crate::ring::ExtentRing;
use core::ops::Range;
use kernel_info::boot::{MemoryRegion, MemoryRegionKind};
use kernel_info::memory::PAGE_SIZE;
use log::{debug, info, trace};

/// Upper bound for 32-bit DMA allocations.
pub const DMA32_LIMIT: u64 = 1 << 32;

/// How many full passes [`PhysicalMemory::allocate`] makes over the queue.
///
/// Each pass is followed by a compaction. Two passes find any extent that
/// already fits plus any that fits after one merge round; this is a heuristic
/// bound, not a complete search.
pub const SCAN_PASSES: usize = 2;

/// Placement constraints for [`PhysicalMemory::allocate`].
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct AllocFlags {
    /// The whole allocation must end at or below 4 GiB.
    pub below_4g: bool,
}

impl AllocFlags {
    pub const ANY: Self = Self { below_4g: false };
    pub const DMA32: Self = Self { below_4g: true };

    const fn admits(self, extent: Extent, pages: u64) -> bool {
        !self.below_4g || extent.base() + pages * PAGE_SIZE <= DMA32_LIMIT
    }
}

/// Ring slots needed to track `total_bytes` of RAM in the worst case
/// (every other page free).
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub const fn ring_slots_for(total_bytes: u64) -> usize {
    (total_bytes.div_ceil(PAGE_SIZE) / 2 + 1) as usize
}

/// Physical page allocator over a fixed extent ring.
///
/// # Invariants
/// - Every queued extent is page-aligned, non-empty and at most
///   [`MAX_PAGES`] long.
/// - Queued extents do not overlap (callers never free memory twice).
/// - `free_bytes` equals the sum of all queued extent sizes.
pub struct PhysicalMemory<'a> {
    ring: ExtentRing<'a>,
    free_bytes: u64,
}

impl<'a> PhysicalMemory<'a> {
    /// An allocator with no free memory, tracking at most `storage.len()` extents.
    pub const fn new(storage: &'a mut [Extent]) -> Self {
        Self {
            ring: ExtentRing::new(storage),
            free_bytes: 0,
        }
    }

    /// Seeds an allocator from the boot memory map.
    ///
    /// Only [`MemoryRegionKind::Usable`] regions are taken. Region starts are
    /// rounded up and ends rounded down to whole pages, and every `reserved`
    /// range (the memory backing `storage`, the AP trampoline, ...) is cut out.
    pub fn from_memory_map(
        storage: &'a mut [Extent],
        regions: &[MemoryRegion],
        reserved: &[Range<u64>],
    ) -> Self {
        let mut mem = Self::new(storage);
        for region in regions.iter().filter(|r| r.kind == MemoryRegionKind::Usable) {
            if let Some(span) = page_span(region) {
                mem.free_outside(span, reserved);
            }
        }

        info!(
            "Physical allocator ready: {} MiB free in {} extents ({} slots)",
            mem.free_bytes / 1024 / 1024,
            mem.extent_count(),
            mem.ring.capacity()
        );
        mem
    }

    fn free_outside(&mut self, span: Range<u64>, holes: &[Range<u64>]) {
        let Some((hole, rest)) = holes.split_first() else {
            debug!(
                "Freeing {:#x}..{:#x} ({} KiB)",
                span.start,
                span.end,
                (span.end - span.start) / 1024
            );
            self.free(span.start, span.end - span.start);
            return;
        };
        let (below, above) = carve(span, hole);
        for part in [below, above].into_iter().flatten() {
            self.free_outside(part, rest);
        }
    }

    /// Finds `bytes` of page-aligned usable memory at or above 1 MiB to hold
    /// the extent ring itself. First fit.
    #[must_use]
    pub fn place_ring(regions: &[MemoryRegion], bytes: u64) -> Option<Range<u64>> {
        const LOW_MEMORY: u64 = 0x10_0000;
        let bytes = bytes.div_ceil(PAGE_SIZE) * PAGE_SIZE;
        regions
            .iter()
            .filter(|r| r.kind == MemoryRegionKind::Usable)
            .filter_map(page_span)
            .find_map(|span| {
                let start = span.start.max(LOW_MEMORY);
                (start < span.end && span.end - start >= bytes).then(|| start..start + bytes)
            })
    }

    #[must_use]
    pub const fn free_bytes(&self) -> u64 {
        self.free_bytes
    }

    #[must_use]
    pub const fn extent_count(&self) -> usize {
        self.ring.len()
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Queued extents in the order the next allocations will see them.
    pub fn extents(&self) -> impl Iterator<Item = Extent> + '_ {
        self.ring.iter()
    }

    /// Returns `[addr, addr + size)` to the pool.
    ///
    /// # Panics
    /// - If `addr` or `size` is not a multiple of the page size.
    /// - If the ring is still full after compaction.
    pub fn free(&mut self, addr: u64, size: u64) {
        assert!(
            addr.is_multiple_of(PAGE_SIZE),
            "free: address {addr:#x} is not page-aligned"
        );
        assert!(
            size.is_multiple_of(PAGE_SIZE),
            "free: size {size:#x} is not a multiple of the page size"
        );

        let mut base = addr;
        let mut pages = size / PAGE_SIZE;
        while pages > 0 {
            let run = pages.min(MAX_PAGES);
            self.enqueue_back(Extent::from_parts(base, run));
            base += run * PAGE_SIZE;
            pages -= run;
        }
        self.free_bytes += size;
    }

    /// Takes `size` bytes (rounded up to whole pages) of contiguous memory.
    ///
    /// Requests larger than [`MAX_PAGES`] pages can never be satisfied.
    ///
    /// # Errors
    /// - [`FrameAllocError::ZeroSized`] for `size == 0`.
    /// - [`FrameAllocError::OutOfMemory`] when no queued extent fits after
    ///   [`SCAN_PASSES`] passes.
    pub fn allocate(&mut self, size: u64, flags: AllocFlags) -> Result<u64, FrameAllocError> {
        if size == 0 {
            return Err(FrameAllocError::ZeroSized);
        }
        let pages = size.div_ceil(PAGE_SIZE);

        for pass in 0..SCAN_PASSES {
            for _ in 0..self.ring.len() {
                let Some(extent) = self.ring.pop_front() else {
                    break;
                };

                if extent.pages() >= pages && flags.admits(extent, pages) {
                    let (taken, rest) = extent.split(pages);
                    if let Some(rest) = rest {
                        self.enqueue_front(rest);
                    }
                    self.free_bytes -= taken.bytes();
                    return Ok(taken.base());
                }

                self.enqueue_back(extent);
            }

            let merged = self.ring.compact();
            trace!("Allocation pass {pass} missed {pages} pages; compaction merged {merged}");
        }

        Err(FrameAllocError::OutOfMemory { requested: size })
    }

    /// Sorts and merges the queue. Returns the number of extents merged away.
    pub fn compact(&mut self) -> usize {
        self.ring.compact()
    }

    fn enqueue_back(&mut self, e: Extent) {
        if self.ring.push_back(e).is_ok() {
            return;
        }
        self.ring.compact();
        assert!(
            self.ring.push_back(e).is_ok(),
            "physical extent ring exhausted ({} slots)",
            self.ring.capacity()
        );
    }

    fn enqueue_front(&mut self, e: Extent) {
        if self.ring.push_front(e).is_ok() {
            return;
        }
        self.ring.compact();
        assert!(
            self.ring.push_front(e).is_ok(),
            "physical extent ring exhausted ({} slots)",
            self.ring.capacity()
        );
    }
}

/// Whole pages inside `region`, if any.
fn page_span(region: &MemoryRegion) -> Option<Range<u64>> {
    let start = region.base.checked_next_multiple_of(PAGE_SIZE)?;
    let end = region.end() / PAGE_SIZE * PAGE_SIZE;
    (start < end).then_some(start..end)
}

/// `span` minus `hole`, as the parts below and above it.
fn carve(span: Range<u64>, hole: &Range<u64>) -> (Option<Range<u64>>, Option<Range<u64>>) {
    if hole.start >= span.end || hole.end <= span.start || hole.is_empty() {
        return (Some(span), None);
    }
    let below = (span.start < hole.start).then(|| span.start..hole.start);
    let above = (hole.end < span.end).then(|| hole.end..span.end);
    (below, above)
}
