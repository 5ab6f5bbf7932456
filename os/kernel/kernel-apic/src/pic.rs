//! The legacy 8259 pair.
//!
//! Firmware may leave it unmasked with IRQs on vectors 0x08..0x10, which
//! collide with CPU exceptions. Remapping first keeps a stray IRQ that slips
//! in before the mask away from the exception vectors.

use crate::platform::PortIo;
use log::debug;

pub const PIC1_COMMAND: u16 = 0x20;
pub const PIC1_DATA: u16 = 0x21;
pub const PIC2_COMMAND: u16 = 0xA0;
pub const PIC2_DATA: u16 = 0xA1;

/// Vector offsets after remapping.
pub const PIC1_OFFSET: u8 = 0x20;
pub const PIC2_OFFSET: u8 = 0x28;

/// ICW1: initialise, ICW4 follows.
const ICW1_INIT: u8 = 0x11;
/// ICW4: 8086 mode.
const ICW4_8086: u8 = 0x01;

/// Remaps both controllers to 0x20/0x28 and masks every line.
///
/// # Safety
/// `ports` must reach the real 8259 ports; call once, with interrupts
/// disabled.
pub unsafe fn disable_legacy_pic(ports: &impl PortIo) {
    unsafe {
        ports.outb(PIC1_COMMAND, ICW1_INIT);
        ports.outb(PIC2_COMMAND, ICW1_INIT);
        ports.outb(PIC1_DATA, PIC1_OFFSET);
        ports.outb(PIC2_DATA, PIC2_OFFSET);
        // Cascade: slave on IRQ2, slave identity 2.
        ports.outb(PIC1_DATA, 0x04);
        ports.outb(PIC2_DATA, 0x02);
        ports.outb(PIC1_DATA, ICW4_8086);
        ports.outb(PIC2_DATA, ICW4_8086);

        ports.outb(PIC1_DATA, 0xFF);
        ports.outb(PIC2_DATA, 0xFF);
    }
    debug!("Legacy PIC remapped to {PIC1_OFFSET:#x}/{PIC2_OFFSET:#x} and masked");
}
