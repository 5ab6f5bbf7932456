//! # Model-Specific Registers (MSR) utilities
//!
//! This module provides low-level access to CPU **Model-Specific Registers (MSRs)**,
//! limited to the ones the local APIC needs:
//!
//! - `IA32_APIC_BASE` (`0x1B`): APIC physical base, global enable and x2APIC enable.
//! - The x2APIC register block (`0x800..=0x8FF`): every xAPIC MMIO register at
//!   offset `off` is mirrored at MSR `0x800 + off / 16` once x2APIC mode is on.
//!
//! ## References
//! - Intel SDM Vol. 3, §11.4.4 "Local APIC Status and Location"
//! - Intel SDM Vol. 3, §11.12.1 "Detecting and Enabling x2APIC Mode"

mod ia32_apic_base;

pub use ia32_apic_base::Ia32ApicBase;

/// Identifies a **Model-Specific Register (MSR)** by its architectural index.
///
/// MSR indices are 32-bit identifiers used by the `rdmsr` and `wrmsr`
/// instructions to select which internal CPU register to access.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Msr(pub u32);

/// First MSR of the x2APIC register block.
pub const X2APIC_MSR_BASE: u32 = 0x800;

impl Msr {
    /// Creates a new `Msr` from a raw index.
    #[inline(always)]
    #[allow(clippy::inline_always)]
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// The x2APIC MSR that mirrors the xAPIC MMIO register at byte `offset`.
    ///
    /// ```
    /// # use kernel_registers::msr::Msr;
    /// assert_eq!(Msr::x2apic(0x0B0), Msr(0x80B)); // EOI
    /// assert_eq!(Msr::x2apic(0x300), Msr(0x830)); // ICR
    /// ```
    #[inline]
    #[must_use]
    pub const fn x2apic(offset: u32) -> Self {
        Self(X2APIC_MSR_BASE + offset / 16)
    }

    /// Returns the underlying raw MSR index.
    #[inline(always)]
    #[allow(clippy::inline_always)]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Write a 64-bit value to the given **Model-Specific Register (MSR)**.
    ///
    /// # Safety
    /// - This executes the privileged `WRMSR` instruction, which is only
    ///   valid at **CPL=0**. Executing this in user mode raises **#GP(0)**.
    /// - The target MSR must be **valid and writable** on the current CPU.
    ///   x2APIC MSRs are only valid after x2APIC mode has been enabled.
    #[cfg(feature = "asm")]
    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    #[doc(alias = "write_model_specific_register")]
    pub unsafe fn store_raw(self, val: u64) {
        let lo = (val & 0xFFFF_FFFF) as u32;
        let hi = (val >> 32) as u32;
        let msr = self.raw();
        unsafe {
            core::arch::asm!(
            "wrmsr",
            in("ecx") msr,
            in("eax") lo,
            in("edx") hi,
            options(nostack, preserves_flags)
            );
        }
    }

    /// Reads the 64-bit value from the given **Model-Specific Register (MSR)**.
    ///
    /// # Safety
    /// Same requirements as [`store_raw`](Self::store_raw).
    #[cfg(feature = "asm")]
    #[inline(always)]
    #[allow(clippy::inline_always)]
    #[doc(alias = "read_model_specific_register")]
    pub unsafe fn load_raw(self) -> u64 {
        let lo: u32;
        let hi: u32;
        let ecx = self.raw();
        unsafe {
            core::arch::asm!(
            "rdmsr",
            in("ecx") ecx,
            out("eax") lo,
            out("edx") hi,
            options(nomem, nostack, preserves_flags)
            );
        }
        (u64::from(hi) << 32) | u64::from(lo)
    }
}
