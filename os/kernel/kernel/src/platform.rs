//! Hardware implementations of the traits the core crates consume.

use crate::cpuid;
use kernel_acpi::PhysMapRo;
use kernel_apic::CpuPlatform;
use kernel_info::boot::{KernelBootInfo, MemoryRegion};
use kernel_info::memory::phys_to_virt;
use kernel_registers::msr::Msr;

/// The executing CPU, with device memory reached through the HHDM.
///
/// The loader maps all of physical memory, including the APIC register
/// pages, at [`HHDM_BASE`](kernel_info::memory::HHDM_BASE) with caching
/// disabled for MMIO ranges.
pub struct HardwarePlatform;

impl CpuPlatform for HardwarePlatform {
    fn has_x2apic(&self) -> bool {
        cpuid::features().x2apic()
    }

    unsafe fn read_msr(&self, msr: Msr) -> u64 {
        unsafe { msr.load_raw() }
    }

    unsafe fn write_msr(&self, msr: Msr, value: u64) {
        unsafe { msr.store_raw(value) }
    }

    #[allow(clippy::cast_possible_truncation)]
    unsafe fn map_mmio(&self, phys: u64, _len: usize) -> usize {
        phys_to_virt(phys) as usize
    }
}

/// Read-only firmware memory through the HHDM.
pub struct HhdmMap;

impl PhysMapRo for HhdmMap {
    unsafe fn map_ro<'a>(&self, paddr: u64, len: usize) -> &'a [u8] {
        #[allow(clippy::cast_possible_truncation)]
        let ptr = phys_to_virt(paddr) as usize as *const u8;
        unsafe { core::slice::from_raw_parts(ptr, len) }
    }
}

/// The loader's memory map.
///
/// # Safety
/// `bi.mmap` must describe a valid region array that stays untouched for the
/// lifetime of the kernel.
#[must_use]
pub unsafe fn memory_regions(bi: &KernelBootInfo) -> &'static [MemoryRegion] {
    #[allow(clippy::cast_possible_truncation)]
    let ptr = phys_to_virt(bi.mmap.regions_ptr) as usize as *const MemoryRegion;
    #[allow(clippy::cast_possible_truncation)]
    let len = bi.mmap.region_count as usize;
    unsafe { core::slice::from_raw_parts(ptr, len) }
}
