//! # Kernel Entry Point
//!
//! Brings up the bootstrap processor (see [`init`]), starts the application
//! processors and parks every core in [`idle`] with interrupts enabled.

#![no_std]
#![no_main]
#![allow(unsafe_code)]

mod cpuid;
mod init;
mod interrupts;
mod keyboard;
mod memory;
mod platform;
mod ports;
mod smp;
mod timer;
mod trampoline;
mod tracing;
mod tsc;

use kernel_qemu::qemu_trace;
use kernel_sync::irq::cli_stop_interrupts;
use log::info;

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    cli_stop_interrupts();
    // Bypass the logger; its line lock may be held by this very core.
    qemu_trace!("PANIC: {info}\n");
    loop {
        halt();
    }
}

/// Halts until the next interrupt, forever.
pub fn idle() -> ! {
    loop {
        halt();
    }
}

fn halt() {
    unsafe {
        core::arch::asm!("hlt", options(nomem, nostack, preserves_flags));
    }
}

/// Runs on the BSP once all cores are up and interrupts are enabled.
fn kernel_main() -> ! {
    info!("Boot complete, {} ticks so far", timer::ticks());
    unsafe {
        core::arch::asm!("int3", options(nomem, nostack));
    }
    idle()
}
