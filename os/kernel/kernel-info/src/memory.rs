//! # Memory Layout

/// Page-table leaf granularity used by the physical allocator.
pub const PAGE_SIZE: u64 = 4096;

/// A simple Higher Half Direct Map (HHDM) base.
/// Anything mapped at [`HHDM_BASE`] + `pa` lets the kernel
/// access physical memory via a fixed offset.
pub const HHDM_BASE: u64 = 0xffff_8880_0000_0000;

/// Where the kernel executes (VMA), matches the linker script.
///
/// # Kernel Build
/// This information is sourced in the kernel's `build.rs` to configure
/// the linker.
pub const KERNEL_BASE: u64 = 0xffff_ffff_8000_0000;

/// Where the image bytes are placed in *physical* memory (LMA).
///
/// # Kernel Build
/// This information is sourced in the kernel's `build.rs` to configure
/// the linker.
pub const PHYS_LOAD: u64 = 0x0010_0000; // 1 MiB

/// Physical page the application-processor trampoline is copied to.
///
/// The STARTUP IPI vector is this address shifted right by 12.
pub const AP_TRAMPOLINE_PHYS: u64 = 0x0000_F000;

/// Per-core kernel stack size.
pub const KERNEL_STACK_SIZE: usize = 32 * 1024;

/// Translates a physical address into its HHDM alias.
#[inline]
#[must_use]
pub const fn phys_to_virt(pa: u64) -> u64 {
    HHDM_BASE + pa
}

const _: () = {
    assert!(KERNEL_STACK_SIZE.is_multiple_of(4096));
    assert!(KERNEL_BASE > HHDM_BASE);
    assert!(AP_TRAMPOLINE_PHYS.is_multiple_of(PAGE_SIZE));
    assert!(AP_TRAMPOLINE_PHYS < 0x10_0000);
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trampoline_vector_fits_startup_ipi() {
        assert_eq!(AP_TRAMPOLINE_PHYS >> 12, 0x0F);
    }

    #[test]
    fn hhdm_translation_is_offset() {
        assert_eq!(phys_to_virt(0xFEE0_0000), 0xffff_8880_FEE0_0000);
    }
}
