//! # x86 I/O Port Access
//!
//! `in`/`out` for the legacy devices the boot path still touches: the 8259
//! pair it shuts down and the PIT it calibrates the TSC against.

use kernel_apic::PortIo;

/// Write one byte to an I/O port.
///
/// # Safety
/// Must run at CPL0 (or with I/O permission for `port`), and `port` must
/// belong to a device that expects this write.
#[inline]
pub unsafe fn outb(port: u16, val: u8) {
    unsafe {
        core::arch::asm!("out dx, al", in("dx") port, in("al") val, options(nomem, nostack, preserves_flags));
    }
}

/// Read one byte from an I/O port.
///
/// # Safety
/// As [`outb`]; reads may have device side effects.
#[inline]
pub unsafe fn inb(port: u16) -> u8 {
    let mut v: u8;
    unsafe {
        core::arch::asm!("in al, dx", in("dx") port, out("al") v, options(nomem, nostack, preserves_flags));
    }
    v
}

/// The real port bus.
pub struct LegacyPorts;

impl PortIo for LegacyPorts {
    unsafe fn outb(&self, port: u16, value: u8) {
        unsafe { outb(port, value) }
    }

    unsafe fn inb(&self, port: u16) -> u8 {
        unsafe { inb(port) }
    }
}
