//! # Kernel Tracing helpers

use kernel_info::boot::{KernelBootInfo, MemoryRegion};
use log::{debug, info};

pub fn trace_boot_info(boot_info: &KernelBootInfo) {
    info!(
        concat!(
            "Boot Info in Kernel:\n",
            "  BI ptr   = {bi:#018x}\n",
            "  MMAP ptr = {mmap_ptr:#018x}, regions = {regions}, total = {total_mib} MiB\n",
            "  RSDP     = {rsdp:#x}"
        ),
        bi = core::ptr::from_ref(boot_info) as usize,
        mmap_ptr = boot_info.mmap.regions_ptr,
        regions = boot_info.mmap.region_count,
        total_mib = boot_info.mmap.total_bytes / 1024 / 1024,
        rsdp = boot_info.rsdp_addr,
    );
}

pub fn trace_memory_map(regions: &[MemoryRegion]) {
    for r in regions {
        debug!(
            "  {:#014x}..{:#014x} {:?}",
            r.base,
            r.end(),
            r.kind
        );
    }
}
