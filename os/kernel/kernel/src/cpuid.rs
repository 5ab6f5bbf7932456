//! # CPUID
//!
//! The few leaves the boot path reads: the x2APIC capability bit for the
//! APIC mode decision, and the TSC frequency leaves for the busy-wait delay.

use bitfield_struct::bitfield;

const LEAF_00H: u32 = 0x00;
const LEAF_01H: u32 = 0x01;
const LEAF_15H: u32 = 0x15;
const LEAF_16H: u32 = 0x16;

#[derive(Debug, Copy, Clone)]
#[repr(C)]
pub struct CpuidResult {
    pub eax: u32,
    pub ebx: u32,
    pub ecx: u32,
    pub edx: u32,
}

/// Execute CPUID with the given leaf and subleaf.
///
/// `rbx` is reserved by LLVM, so it is saved around the instruction and the
/// result moved out through a scratch register.
#[inline]
#[must_use]
#[allow(unused_assignments)]
pub fn cpuid(leaf: u32, subleaf: u32) -> CpuidResult {
    let (mut eax, mut ebx, mut ecx, mut edx) = (leaf, 0u32, subleaf, 0u32);
    unsafe {
        core::arch::asm!(
            "push rbx",
            "cpuid",
            "mov {ebx_out:e}, ebx",
            "pop rbx",
            ebx_out = lateout(reg) ebx,
            inlateout("eax") eax,
            inlateout("ecx") ecx,
            lateout("edx") edx,
            options(nomem, preserves_flags),
        );
    }
    CpuidResult { eax, ebx, ecx, edx }
}

/// Highest supported basic leaf.
#[must_use]
pub fn max_basic_leaf() -> u32 {
    cpuid(LEAF_00H, 0).eax
}

/// CPUID.01H:ECX, the feature bits the kernel looks at.
#[bitfield(u32)]
pub struct Leaf01hEcx {
    #[bits(21)]
    __low: u32,
    /// Bit 21.
    pub x2apic: bool,
    #[bits(2)]
    __mid: u8,
    /// Bit 24: the LAPIC timer supports TSC-deadline mode.
    pub tsc_deadline: bool,
    #[bits(6)]
    __high: u8,
    /// Bit 31: running under a hypervisor.
    pub hypervisor: bool,
}

#[must_use]
pub fn features() -> Leaf01hEcx {
    Leaf01hEcx::from_bits(cpuid(LEAF_01H, 0).ecx)
}

/// TSC frequency from CPUID.15H (crystal ratio) or, failing that,
/// CPUID.16H (base MHz). `None` when neither leaf reports one.
#[must_use]
pub fn tsc_hz() -> Option<u64> {
    let max = max_basic_leaf();
    if max >= LEAF_15H {
        let r = cpuid(LEAF_15H, 0);
        let (denom, numer, crystal_hz) = (r.eax, r.ebx, r.ecx);
        // Many VMs leave the crystal frequency at zero.
        if denom != 0 && numer != 0 && crystal_hz != 0 {
            return Some(u64::from(crystal_hz) * u64::from(numer) / u64::from(denom));
        }
    }
    if max >= LEAF_16H {
        let base_mhz = cpuid(LEAF_16H, 0).eax & 0xFFFF;
        if base_mhz != 0 {
            return Some(u64::from(base_mhz) * 1_000_000);
        }
    }
    None
}
