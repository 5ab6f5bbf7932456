//! Provides the [`Ia32ApicBase`] type.

use crate::msr::Msr;
use bitfield_struct::bitfield;

/// Model-Specific Register: **local APIC base and mode**.
///
/// ```text
///  63        52 51                       12 11  10  9  8  7    0
/// +------------+---------------------------+---+---+---+---+------+
/// |  reserved  |   APIC base frame (4K)    | EN|EXT| - |BSP|  -   |
/// +------------+---------------------------+---+---+---+---+------+
/// ```
///
/// - `EN` (bit 11) globally enables the local APIC.
/// - `EXTD` (bit 10) switches it into x2APIC mode; requires `EN`.
/// - `BSP` (bit 8) is read-only and set on the bootstrap processor.
#[bitfield(u64, order = Lsb)]
#[derive(PartialEq, Eq)]
pub struct Ia32ApicBase {
    #[bits(8)]
    __reserved0: u8,

    /// Set by hardware on the bootstrap processor.
    #[bits(1)]
    pub bsp: bool,

    #[bits(1)]
    __reserved1: bool,

    /// x2APIC mode enable.
    #[bits(1)]
    pub x2apic_enable: bool,

    /// Local APIC global enable.
    #[bits(1)]
    pub apic_enable: bool,

    /// Physical frame number of the xAPIC MMIO page.
    #[bits(40)]
    pub base_frame: u64,

    #[bits(12)]
    __reserved2: u16,
}

impl Ia32ApicBase {
    pub const IA32_APIC_BASE: u32 = 0x1B;
    pub const MSR: Msr = Msr::new(Self::IA32_APIC_BASE);

    /// Physical address of the xAPIC MMIO window (`base & !0xfff`).
    #[inline]
    #[must_use]
    pub const fn base_address(&self) -> u64 {
        self.base_frame() << 12
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_typical_bsp_value() {
        // QEMU default: base 0xFEE00000, enabled, BSP.
        let v = Ia32ApicBase::from_bits(0xFEE0_0900);
        assert!(v.bsp());
        assert!(v.apic_enable());
        assert!(!v.x2apic_enable());
        assert_eq!(v.base_address(), 0xFEE0_0000);
    }

    #[test]
    fn enabling_x2apic_sets_bit_10_only() {
        let v = Ia32ApicBase::from_bits(0xFEE0_0900).with_x2apic_enable(true);
        assert_eq!(v.into_bits(), 0xFEE0_0D00);
    }
}
