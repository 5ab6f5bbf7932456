//! # Local APIC
//!
//! One driver for both register interfaces. The mode is picked once from the
//! x2APIC capability bit and applies to every core:
//!
//! | Mode   | Register at xAPIC offset `off`        | ICR                          |
//! |--------|---------------------------------------|------------------------------|
//! | xAPIC  | MMIO `base + off`                     | high (dest << 24), then low  |
//! | x2APIC | MSR `0x800 + off / 16`                | one 64-bit write             |

use crate::icr::{DeliveryMode, IcrLow, x2apic_icr, xapic_icr_high};
use crate::platform::CpuPlatform;
use kernel_interrupts::InterruptController;
use kernel_registers::msr::{Ia32ApicBase, Msr};
use log::{info, warn};

/// Vector the APIC delivers for spurious interrupts.
pub const SPURIOUS_VECTOR: u8 = 0xFF;

/// Register offsets in the xAPIC MMIO page.
pub mod reg {
    pub const ID: u32 = 0x020;
    pub const VERSION: u32 = 0x030;
    pub const TPR: u32 = 0x080;
    pub const EOI: u32 = 0x0B0;
    pub const DFR: u32 = 0x0E0;
    pub const SVR: u32 = 0x0F0;
    /// First of eight 32-bit in-service registers, 0x10 apart.
    pub const ISR: u32 = 0x100;
    pub const ICR_LOW: u32 = 0x300;
    pub const ICR_HIGH: u32 = 0x310;
    pub const LVT_TIMER: u32 = 0x320;
    pub const TIMER_INITIAL_COUNT: u32 = 0x380;
    pub const TIMER_CURRENT_COUNT: u32 = 0x390;
    pub const TIMER_DIVIDE: u32 = 0x3E0;
}

/// SVR bit 8: APIC software enable.
const SVR_ENABLE: u32 = 1 << 8;

/// DFR flat model.
const DFR_FLAT: u32 = 0xF000_0000;

/// Polls of the delivery-status bit before an xAPIC IPI is given up on.
const ICR_SPIN_LIMIT: usize = 100_000;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ApicMode {
    X2Apic,
    XApic { mmio: usize },
}

pub struct LocalApic<P> {
    platform: P,
    mode: ApicMode,
}

impl<P: CpuPlatform> LocalApic<P> {
    /// Chooses the access mode. In xAPIC mode the register page named by
    /// `IA32_APIC_BASE` is mapped through the platform.
    ///
    /// # Safety
    /// Must run at CPL0 on an x86-64 CPU with a local APIC.
    pub unsafe fn new(platform: P) -> Self {
        let mode = if platform.has_x2apic() {
            ApicMode::X2Apic
        } else {
            let base = Ia32ApicBase::from_bits(unsafe { platform.read_msr(Ia32ApicBase::MSR) });
            let mmio = unsafe { platform.map_mmio(base.base_address(), 0x1000) };
            ApicMode::XApic { mmio }
        };
        info!("Local APIC mode: {mode:?}");
        Self { platform, mode }
    }

    #[must_use]
    pub const fn mode(&self) -> ApicMode {
        self.mode
    }

    #[must_use]
    pub const fn platform(&self) -> &P {
        &self.platform
    }

    /// Enables the APIC on the executing core and returns its ID.
    ///
    /// The global enable bit is set before the ID is read; with the APIC
    /// disabled the ID register is not valid in x2APIC mode.
    ///
    /// # Safety
    /// Each core calls this once, before enabling interrupts.
    pub unsafe fn init_current_core(&self) -> u32 {
        unsafe {
            if matches!(self.mode, ApicMode::XApic { .. }) {
                self.write(reg::DFR, DFR_FLAT);
            }

            let mut base = Ia32ApicBase::from_bits(self.platform.read_msr(Ia32ApicBase::MSR));
            base.set_apic_enable(true);
            if self.mode == ApicMode::X2Apic {
                base.set_x2apic_enable(true);
            }
            self.platform.write_msr(Ia32ApicBase::MSR, base.into_bits());

            let id = self.current_apic_id();
            self.write(reg::TPR, 0);
            self.write(reg::SVR, SVR_ENABLE | u32::from(SPURIOUS_VECTOR));
            info!(
                "LAPIC enabled on APIC ID {id} (bsp={}, version {:#x})",
                base.bsp(),
                self.read(reg::VERSION) & 0xFF
            );
            id
        }
    }

    /// The executing core's APIC ID.
    #[must_use]
    pub fn current_apic_id(&self) -> u32 {
        let raw = unsafe { self.read(reg::ID) };
        match self.mode {
            ApicMode::X2Apic => raw,
            ApicMode::XApic { .. } => raw >> 24,
        }
    }

    /// Signals end-of-interrupt if `vector` is actually in service.
    ///
    /// Spurious interrupts never set their ISR bit and must not be
    /// acknowledged.
    pub fn send_eoi(&self, vector: u8) {
        let isr = reg::ISR + u32::from(vector / 32) * 0x10;
        unsafe {
            if self.read(isr) & (1 << (vector % 32)) != 0 {
                self.write(reg::EOI, 0);
            }
        }
    }

    /// Sends an IPI to the core with APIC ID `dest`.
    pub fn send_ipi(&self, dest: u32, vector: u8, mode: DeliveryMode) {
        let low = IcrLow::ipi(vector, mode);
        unsafe {
            match self.mode {
                ApicMode::X2Apic => self
                    .platform
                    .write_msr(Msr::x2apic(reg::ICR_LOW), x2apic_icr(dest, low)),
                ApicMode::XApic { .. } => {
                    self.write(reg::ICR_HIGH, xapic_icr_high(dest));
                    self.write(reg::ICR_LOW, low.into_bits());
                    self.wait_for_delivery(dest);
                }
            }
        }
    }

    unsafe fn wait_for_delivery(&self, dest: u32) {
        for _ in 0..ICR_SPIN_LIMIT {
            if !IcrLow::from_bits(unsafe { self.read(reg::ICR_LOW) }).delivery_pending() {
                return;
            }
            core::hint::spin_loop();
        }
        warn!("IPI to APIC ID {dest} still pending after {ICR_SPIN_LIMIT} polls");
    }

    #[allow(clippy::cast_possible_truncation)]
    pub(crate) unsafe fn read(&self, offset: u32) -> u32 {
        match self.mode {
            ApicMode::X2Apic => unsafe { self.platform.read_msr(Msr::x2apic(offset)) as u32 },
            ApicMode::XApic { mmio } => unsafe {
                core::ptr::read_volatile((mmio + offset as usize) as *const u32)
            },
        }
    }

    pub(crate) unsafe fn write(&self, offset: u32, value: u32) {
        match self.mode {
            ApicMode::X2Apic => unsafe {
                self.platform
                    .write_msr(Msr::x2apic(offset), u64::from(value));
            },
            ApicMode::XApic { mmio } => unsafe {
                core::ptr::write_volatile((mmio + offset as usize) as *mut u32, value);
            },
        }
    }
}

impl<P: CpuPlatform> InterruptController for LocalApic<P> {
    fn current_apic_id(&self) -> u32 {
        Self::current_apic_id(self)
    }

    fn end_of_interrupt(&self, vector: u8) {
        self.send_eoi(vector);
    }
}
