//! # I/O APIC
//!
//! Two MMIO registers: an index at `+0x00` selects an internal register, the
//! window at `+0x10` reads or writes it. Redirection entry `pin` is the
//! register pair `0x10 + 2 * pin` (low) and `0x11 + 2 * pin` (high).

use bitfield_struct::bitfield;

pub const IOAPIC_ID: u8 = 0x00;
pub const IOAPIC_VERSION: u8 = 0x01;
pub const IOAPIC_REDIRECTION_BASE: u8 = 0x10;

/// Access to the indirect register file.
pub trait IoApicRegisters {
    fn read(&self, reg: u8) -> u32;
    fn write(&self, reg: u8, value: u32);
}

/// The memory-mapped register window.
pub struct MmioIoApic {
    base: usize,
}

impl MmioIoApic {
    /// # Safety
    /// `base` must be the virtual address of a mapped I/O APIC register block,
    /// and nothing else may use it concurrently.
    #[must_use]
    pub const unsafe fn new(base: usize) -> Self {
        Self { base }
    }
}

impl IoApicRegisters for MmioIoApic {
    fn read(&self, reg: u8) -> u32 {
        unsafe {
            core::ptr::write_volatile(self.base as *mut u32, u32::from(reg));
            core::ptr::read_volatile((self.base + 0x10) as *const u32)
        }
    }

    fn write(&self, reg: u8, value: u32) {
        unsafe {
            core::ptr::write_volatile(self.base as *mut u32, u32::from(reg));
            core::ptr::write_volatile((self.base + 0x10) as *mut u32, value);
        }
    }
}

/// One 64-bit redirection table entry.
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct RedirectionEntry {
    /// Bits 0..8.
    pub vector: u8,
    /// Bits 8..11, a [`DeliveryMode`](crate::icr::DeliveryMode) encoding.
    #[bits(3)]
    pub delivery_mode: u8,
    /// Bit 11: 0 = physical, 1 = logical destination.
    pub dest_logical: bool,
    /// Bit 12, read-only.
    pub delivery_pending: bool,
    /// Bit 13.
    pub active_low: bool,
    /// Bit 14, read-only.
    pub remote_irr: bool,
    /// Bit 15.
    pub level_triggered: bool,
    /// Bit 16.
    pub masked: bool,
    #[bits(39)]
    __reserved: u64,
    /// Bits 56..64: APIC ID in physical mode.
    pub destination: u8,
}

/// A single I/O APIC and the GSIs it serves.
pub struct IoApic<R> {
    regs: R,
    id: u8,
    gsi_base: u32,
    pins: u32,
}

impl<R: IoApicRegisters> IoApic<R> {
    /// Reads the pin count from the version register.
    pub fn new(regs: R, id: u8, gsi_base: u32) -> Self {
        let pins = ((regs.read(IOAPIC_VERSION) >> 16) & 0xFF) + 1;
        Self {
            regs,
            id,
            gsi_base,
            pins,
        }
    }

    #[must_use]
    pub const fn id(&self) -> u8 {
        self.id
    }

    #[must_use]
    pub const fn gsi_base(&self) -> u32 {
        self.gsi_base
    }

    /// Number of redirection entries.
    #[must_use]
    pub const fn pins(&self) -> u32 {
        self.pins
    }

    #[must_use]
    pub const fn serves(&self, gsi: u32) -> bool {
        gsi >= self.gsi_base && gsi - self.gsi_base < self.pins
    }

    #[allow(clippy::cast_possible_truncation)]
    const fn entry_reg(pin: u32) -> u8 {
        IOAPIC_REDIRECTION_BASE + (2 * pin) as u8
    }

    #[must_use]
    pub fn read_entry(&self, pin: u32) -> RedirectionEntry {
        let reg = Self::entry_reg(pin);
        let low = self.regs.read(reg);
        let high = self.regs.read(reg + 1);
        RedirectionEntry::from_bits(u64::from(high) << 32 | u64::from(low))
    }

    /// High half first, so the entry never points at a stale destination
    /// while its low half is live.
    #[allow(clippy::cast_possible_truncation)]
    pub fn write_entry(&self, pin: u32, entry: RedirectionEntry) {
        let reg = Self::entry_reg(pin);
        let bits = entry.into_bits();
        self.regs.write(reg + 1, (bits >> 32) as u32);
        self.regs.write(reg, bits as u32);
    }
}
