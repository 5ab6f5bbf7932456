//! # Time Stamp Counter
//!
//! A TSC-based busy wait for the AP start-up sequence, also the time base
//! of the TSC-deadline tick. The frequency comes from CPUID when the CPU
//! reports it, otherwise it is measured against one PIT channel-0 period.

use crate::cpuid;
use crate::ports::{inb, outb};
use kernel_apic::Delay;
use log::info;

const PIT_CH0_DATA: u16 = 0x40;
const PIT_CMD: u16 = 0x43;
const PIT_INPUT_HZ: u64 = 1_193_182;

/// PIT measurement window.
const CALIBRATION_WINDOW_US: u64 = 50_000;

#[inline]
#[must_use]
pub fn rdtsc() -> u64 {
    let lo: u32;
    let hi: u32;
    unsafe {
        core::arch::asm!(
            "lfence",
            "rdtsc",
            out("eax") lo,
            out("edx") hi,
            options(nomem, nostack, preserves_flags),
        );
    }
    (u64::from(hi) << 32) | u64::from(lo)
}

/// Busy-waits on the TSC.
#[derive(Debug, Copy, Clone)]
pub struct TscDelay {
    hz: u64,
}

impl TscDelay {
    /// Determines the TSC frequency.
    ///
    /// # Safety
    /// Reprograms PIT channel 0 if CPUID has no frequency. Call with
    /// interrupts masked, before anything else uses the PIT.
    pub unsafe fn calibrate() -> Self {
        let (hz, source) = match cpuid::tsc_hz() {
            Some(hz) => (hz, "CPUID"),
            None => (unsafe { pit_measure_tsc_hz(CALIBRATION_WINDOW_US) }, "PIT"),
        };
        info!("TSC frequency {} MHz ({source})", hz / 1_000_000);
        Self { hz: hz.max(1_000_000) }
    }

    #[must_use]
    pub const fn hz(&self) -> u64 {
        self.hz
    }
}

impl Delay for TscDelay {
    fn delay_us(&self, micros: u64) {
        let ticks = micros.saturating_mul(self.hz) / 1_000_000;
        let start = rdtsc();
        while rdtsc().wrapping_sub(start) < ticks {
            core::hint::spin_loop();
        }
    }
}

/// TSC ticks over one PIT mode-2 period of `window_us`, scaled to Hz.
#[allow(clippy::cast_possible_truncation)]
unsafe fn pit_measure_tsc_hz(window_us: u64) -> u64 {
    let reload = (PIT_INPUT_HZ * window_us).div_ceil(1_000_000).clamp(3, 0xFFFF) as u16;
    let actual_us = u64::from(reload) * 1_000_000 / PIT_INPUT_HZ;

    unsafe {
        // Channel 0, lobyte/hibyte, mode 2, binary.
        outb(PIT_CMD, 0b0011_0100);
        outb(PIT_CH0_DATA, (reload & 0xFF) as u8);
        outb(PIT_CH0_DATA, (reload >> 8) as u8);
    }

    let t0 = rdtsc();
    let mut last = unsafe { read_pit_counter() };
    loop {
        let cur = unsafe { read_pit_counter() };
        // The count reloads once it reaches terminal count.
        if cur > last {
            break;
        }
        last = cur;
        core::hint::spin_loop();
    }
    let t1 = rdtsc();

    t1.saturating_sub(t0).saturating_mul(1_000_000) / actual_us.max(1)
}

unsafe fn read_pit_counter() -> u16 {
    unsafe {
        // Latch channel 0.
        outb(PIT_CMD, 0b0000_0000);
        let lo = u16::from(inb(PIT_CH0_DATA));
        let hi = u16::from(inb(PIT_CH0_DATA));
        (hi << 8) | lo
    }
}
