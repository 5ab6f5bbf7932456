//! The kernel-wide physical frame allocator.
//!
//! One [`PhysicalMemory`] instance behind a spin lock. Every entry point takes
//! the lock with interrupts masked, so handlers may allocate too.

use crate::error::FrameAllocError;
use crate::extent::Extent;
use crate::phys::{AllocFlags, PhysicalMemory};
use kernel_info::boot::MemoryRegion;
use kernel_sync::SpinMutex;
use log::warn;

static PHYSICAL_MEMORY: SpinMutex<Option<PhysicalMemory<'static>>> = SpinMutex::new(None);

/// Installs the global allocator, seeded from the boot memory map.
///
/// `storage` is the extent ring backing store. `reserved` lists physical
/// ranges kept out of the pool and must include the memory behind `storage`.
/// A second call replaces the previous allocator and leaks whatever it
/// tracked.
pub fn init_frame_allocator(
    storage: &'static mut [Extent],
    regions: &[MemoryRegion],
    reserved: &[core::ops::Range<u64>],
) {
    let mem = PhysicalMemory::from_memory_map(storage, regions, reserved);
    PHYSICAL_MEMORY.with_lock_irq(|slot| {
        if slot.replace(mem).is_some() {
            warn!("Physical frame allocator re-initialized");
        }
    });
}

/// Allocates `size` bytes of physically contiguous memory.
///
/// # Errors
/// See [`PhysicalMemory::allocate`]; additionally
/// [`FrameAllocError::Uninitialized`] before [`init_frame_allocator`].
pub fn allocate_frame(size: u64, flags: AllocFlags) -> Result<u64, FrameAllocError> {
    PHYSICAL_MEMORY.with_lock_irq(|slot| {
        slot.as_mut()
            .ok_or(FrameAllocError::Uninitialized)?
            .allocate(size, flags)
    })
}

/// Allocates memory that ends at or below 4 GiB.
///
/// # Errors
/// As [`allocate_frame`].
pub fn allocate_dma_frame(size: u64) -> Result<u64, FrameAllocError> {
    allocate_frame(size, AllocFlags::DMA32)
}

/// Returns memory to the global pool.
///
/// # Errors
/// [`FrameAllocError::Uninitialized`] before [`init_frame_allocator`].
///
/// # Panics
/// As [`PhysicalMemory::free`].
pub fn free_frame(addr: u64, size: u64) -> Result<(), FrameAllocError> {
    PHYSICAL_MEMORY.with_lock_irq(|slot| {
        slot.as_mut()
            .ok_or(FrameAllocError::Uninitialized)?
            .free(addr, size);
        Ok(())
    })
}

/// Forces a sort-and-merge pass. Returns the number of extents merged away.
pub fn compact_frames() -> usize {
    PHYSICAL_MEMORY.with_lock_irq(|slot| slot.as_mut().map_or(0, PhysicalMemory::compact))
}

/// Bytes currently free; zero before initialization.
pub fn free_frame_bytes() -> u64 {
    PHYSICAL_MEMORY.with_lock_irq(|slot| slot.as_ref().map_or(0, PhysicalMemory::free_bytes))
}
