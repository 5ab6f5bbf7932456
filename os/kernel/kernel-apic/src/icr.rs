//! Interrupt Command Register encoding.
//!
//! The low 32 bits are the same in both APIC modes. The destination lives in
//! bits 56..64 of the xAPIC ICR (written separately to ICR-high) and in bits
//! 32..64 of the single 64-bit x2APIC ICR MSR.

use bitfield_struct::bitfield;

/// ICR / redirection entry delivery mode (3 bits).
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DeliveryMode {
    Fixed = 0,
    LowestPriority = 1,
    Smi = 2,
    Nmi = 4,
    Init = 5,
    Startup = 6,
}

impl DeliveryMode {
    #[must_use]
    pub const fn bits(self) -> u8 {
        self as u8 & 0b111
    }
}

/// Low doubleword of the ICR.
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct IcrLow {
    pub vector: u8,
    /// A [`DeliveryMode`] encoding.
    #[bits(3)]
    pub delivery_mode: u8,
    /// 0 = physical, 1 = logical destination.
    pub dest_logical: bool,
    /// Read-only in xAPIC mode: the previous IPI is still being sent.
    pub delivery_pending: bool,
    #[bits(1)]
    __reserved0: u8,
    /// Must be set for everything but INIT de-assert.
    pub level_assert: bool,
    pub trigger_level: bool,
    #[bits(2)]
    __reserved1: u8,
    /// 0 = use destination field, 1 = self, 2 = all, 3 = all but self.
    #[bits(2)]
    pub shorthand: u8,
    #[bits(12)]
    __reserved2: u16,
}

impl IcrLow {
    /// A physical-destination IPI with the level bit asserted.
    #[must_use]
    pub const fn ipi(vector: u8, mode: DeliveryMode) -> Self {
        Self::new()
            .with_vector(vector)
            .with_delivery_mode(mode.bits())
            .with_level_assert(true)
    }
}

/// The full 64-bit x2APIC ICR value.
#[must_use]
pub const fn x2apic_icr(dest: u32, low: IcrLow) -> u64 {
    (dest as u64) << 32 | low.into_bits() as u64
}

/// The xAPIC ICR-high value for `dest`.
#[must_use]
pub const fn xapic_icr_high(dest: u32) -> u32 {
    dest << 24
}
