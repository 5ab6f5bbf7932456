//! # Kernel Boot Information

/// Kernel function pointer.
///
/// # ABI
/// System V (`extern "C"`): the loader passes the boot info pointer in `RDI`.
pub type KernelEntryFn = extern "C" fn(*const KernelBootInfo) -> !;

/// Information the kernel needs right after the loader hands over control.
/// Keep this `#[repr(C)]` and prefer fixed-size integers at the ABI boundary.
#[repr(C)]
#[derive(Clone)]
pub struct KernelBootInfo {
    /// Memory map information.
    pub mmap: MemoryMapInfo,

    /// RSDP physical address, or 0 if not provided.
    pub rsdp_addr: u64,
}

#[repr(C)]
#[derive(Clone)]
pub struct MemoryMapInfo {
    /// Physical address of a packed array of [`MemoryRegion`] records.
    pub regions_ptr: u64,

    /// Number of [`MemoryRegion`] records at `regions_ptr`.
    pub region_count: u64,

    /// Total installed RAM in bytes, as reported by firmware.
    pub total_bytes: u64,
}

/// One entry of the flat physical memory map.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MemoryRegion {
    /// Physical start address. Not necessarily page-aligned.
    pub base: u64,

    /// Length in bytes. Not necessarily a multiple of the page size.
    pub length: u64,

    /// What the region may be used for.
    pub kind: MemoryRegionKind,
}

impl MemoryRegion {
    #[must_use]
    pub const fn usable(base: u64, length: u64) -> Self {
        Self {
            base,
            length,
            kind: MemoryRegionKind::Usable,
        }
    }

    /// Exclusive end address (saturating).
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.base.saturating_add(self.length)
    }
}

/// Region type tag. Only [`MemoryRegionKind::Usable`] is handed to the frame allocator.
#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MemoryRegionKind {
    /// Free RAM.
    Usable = 1,
    /// Firmware or device reserved.
    Reserved = 2,
    /// ACPI tables; reclaimable once parsed.
    AcpiReclaimable = 3,
    /// ACPI non-volatile storage.
    AcpiNvs = 4,
    /// Defective RAM.
    BadMemory = 5,
    /// Kernel image, boot stack and boot info, as loaded.
    KernelAndModules = 6,
}
