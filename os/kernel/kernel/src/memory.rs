//! Physical memory bring-up.

use crate::platform::memory_regions;
use kernel_alloc::PhysicalMemory;
use kernel_alloc::extent::Extent;
use kernel_alloc::frame_alloc::{free_frame_bytes, init_frame_allocator};
use kernel_alloc::phys::ring_slots_for;
use kernel_info::boot::{KernelBootInfo, MemoryRegionKind};
use kernel_info::memory::{AP_TRAMPOLINE_PHYS, PAGE_SIZE, phys_to_virt};
use log::info;

/// Seeds the global frame allocator from the boot memory map.
///
/// The extent ring is carved from the first usable memory above 1 MiB. It,
/// the real-mode IVT page and the AP trampoline page are kept out of the
/// pool.
///
/// # Safety
/// Runs once on the BSP; the memory map must be accurate and reachable
/// through the HHDM.
pub unsafe fn init_physical_memory(bi: &KernelBootInfo) {
    let regions = unsafe { memory_regions(bi) };
    let usable: u64 = regions
        .iter()
        .filter(|r| r.kind == MemoryRegionKind::Usable)
        .map(|r| r.length)
        .sum();

    let slots = ring_slots_for(usable);
    let bytes = (slots * size_of::<Extent>()) as u64;
    let Some(ring) = PhysicalMemory::place_ring(regions, bytes) else {
        panic!("no usable memory for a {bytes} byte extent ring");
    };
    info!(
        "{} MiB usable in {} regions; extent ring of {slots} slots at {:#x}",
        usable / 1024 / 1024,
        regions.len(),
        ring.start
    );

    #[allow(clippy::cast_possible_truncation)]
    let storage = unsafe {
        let ptr = phys_to_virt(ring.start) as usize as *mut Extent;
        core::ptr::write_bytes(ptr, 0, slots);
        core::slice::from_raw_parts_mut(ptr, slots)
    };

    let reserved = [
        ring,
        0..PAGE_SIZE,
        AP_TRAMPOLINE_PHYS..AP_TRAMPOLINE_PHYS + PAGE_SIZE,
    ];
    init_frame_allocator(storage, regions, &reserved);
    info!("{} KiB free for frame allocation", free_frame_bytes() / 1024);
}
