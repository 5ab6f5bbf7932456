//! # QEMU Debug Console
//!
//! The kernel's only diagnostic output: a line-oriented sink on QEMU's debug
//! port and a [`log::Log`] backend on top of it.
//!
//! ## Output Mechanism
//! ```text
//! log::info!(..) / qemu_trace!(..)
//!     ↓
//! QemuLogger (level filter, core tag, line lock)
//!     ↓
//! QemuSink (fmt::Write)
//!     ↓
//! dbg_putc() → I/O port 0x402
//!     ↓
//! qemu-system-x86_64 -debugcon stdio
//! ```
//!
//! ## Lines, not bytes
//! Every core may log. [`QemuLogger`] formats one record per line and holds a
//! spin lock (interrupts masked) for the duration of the line, so output from
//! different cores never interleaves mid-line. [`qemu_trace!`] bypasses the
//! lock and is meant for the few places that run before the logger exists.
//!
//! ## Feature System
//! With the `enabled` feature off (or on a hosted target) the port writes
//! compile to nothing; formatting still happens so tests can capture it.
//!
//! ## Usage
//! ```rust,no_run
//! use kernel_qemu::QemuLogger;
//! use log::{LevelFilter, info};
//!
//! QemuLogger::new(LevelFilter::Debug).init().expect("logger initialization");
//! info!("Kernel subsystem initialized");
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod logger;

pub use logger::{CoreIdFn, QemuLogger};

#[doc(hidden)]
pub mod qemu_fmt {
    use core::fmt::{self, Write};

    /// The port number for QEMU's debug port.
    #[cfg(all(feature = "enabled", target_os = "none"))]
    const QEMU_DEBUG_PORT: u16 = 0x402;

    /// Write a single byte to QEMU's debug port.
    #[allow(clippy::inline_always)]
    #[inline(always)]
    pub fn dbg_putc(c: u8) {
        #[cfg(all(feature = "enabled", target_os = "none"))]
        unsafe {
            core::arch::asm!(
            "out dx, al",
            in("dx") QEMU_DEBUG_PORT,
            in("al") c,
            options(nomem, nostack, preserves_flags)
            );
        }
        #[cfg(not(all(feature = "enabled", target_os = "none")))]
        let _ = c;
    }

    /// `fmt::Write` adapter over [`dbg_putc`].
    pub struct QemuSink;

    impl Write for QemuSink {
        #[inline]
        fn write_str(&mut self, s: &str) -> fmt::Result {
            for b in s.bytes() {
                dbg_putc(b);
            }
            Ok(())
        }
    }

    #[doc(hidden)]
    #[inline]
    pub fn qemu_write(args: fmt::Arguments) {
        // Best-effort debug output.
        let _ = fmt::write(&mut QemuSink, args);
    }
}

/// Unlocked, unfiltered write to the debug port. For use before the logger is up.
#[macro_export]
macro_rules! qemu_trace {
    ($($arg:tt)*) => {{
        // No allocation: `format_args!` builds a lightweight `Arguments`.
        $crate::qemu_fmt::qemu_write(core::format_args!($($arg)*));
    }};
}
