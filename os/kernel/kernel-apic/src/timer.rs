//! # LAPIC timer
//!
//! Each core's local APIC carries a timer that raises one LVT vector. Two of
//! its modes are used:
//!
//! - periodic: counts down from the initial count at bus clock / 16 and
//!   reloads when it reaches zero;
//! - TSC-deadline: fires once the TSC passes `IA32_TSC_DEADLINE`, then waits
//!   to be re-armed.
//!
//! The LVT, count and divide registers sit at the same xAPIC offsets in both
//! register interfaces; the deadline is always an MSR.

use crate::lapic::{LocalApic, reg};
use crate::platform::{CpuPlatform, Delay};
use bitfield_struct::bitfield;
use kernel_registers::msr::Msr;
use log::{debug, info};

/// Absolute TSC value at which the timer fires in deadline mode. Zero
/// disarms it.
pub const IA32_TSC_DEADLINE: Msr = Msr::new(0x6E0);

/// Divide configuration encoding for bus clock / 16.
pub const TIMER_DIVIDE_BY_16: u32 = 0b0011;

/// The timer's local vector table entry.
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct LvtTimer {
    pub vector: u8,
    #[bits(4)]
    __reserved0: u8,
    pub delivery_pending: bool,
    #[bits(3)]
    __reserved1: u8,
    pub masked: bool,
    /// 0 = one-shot, 1 = periodic, 2 = TSC-deadline.
    #[bits(2)]
    pub mode: u8,
    #[bits(13)]
    __reserved2: u16,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TimerMode {
    OneShot,
    /// Reloads `initial_count` ticks of bus clock / 16.
    Periodic { initial_count: u32 },
    /// Fires at the TSC value last passed to
    /// [`arm_deadline`](LocalApic::arm_deadline).
    TscDeadline,
}

impl TimerMode {
    #[must_use]
    pub const fn bits(self) -> u8 {
        match self {
            Self::OneShot => 0,
            Self::Periodic { .. } => 1,
            Self::TscDeadline => 2,
        }
    }
}

/// Initial count for `tick_hz` interrupts per second from a timer counting
/// at `timer_hz`. Never zero, since a zero count stops the timer.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn periodic_count(timer_hz: u64, tick_hz: u64) -> u32 {
    (timer_hz / tick_hz.max(1)).clamp(1, u64::from(u32::MAX)) as u32
}

impl<P: CpuPlatform> LocalApic<P> {
    /// Measures how fast the timer counts at divide-by-16: the count is
    /// started at its maximum with the LVT masked, `window_us` pass on
    /// `delay`, and the elapsed ticks are scaled to Hz. The timer is left
    /// stopped.
    ///
    /// # Safety
    /// Reprograms this core's timer; nothing else may be using it.
    #[must_use]
    pub unsafe fn calibrate_timer(&self, delay: &impl Delay, window_us: u64) -> u64 {
        let lvt = LvtTimer::new()
            .with_vector(0xFF)
            .with_masked(true)
            .with_mode(TimerMode::OneShot.bits());
        let elapsed = unsafe {
            self.write(reg::TIMER_DIVIDE, TIMER_DIVIDE_BY_16);
            self.write(reg::LVT_TIMER, lvt.into_bits());
            self.write(reg::TIMER_INITIAL_COUNT, u32::MAX);
            delay.delay_us(window_us);
            let remaining = self.read(reg::TIMER_CURRENT_COUNT);
            self.write(reg::TIMER_INITIAL_COUNT, 0);
            u32::MAX - remaining
        };
        let hz = u64::from(elapsed) * 1_000_000 / window_us.max(1);
        info!("LAPIC timer runs at {} kHz (bus / 16)", hz / 1000);
        hz
    }

    /// Points the timer at `vector` in `mode` and unmasks it.
    ///
    /// The LVT is read back and only its vector, mask and mode fields are
    /// replaced. In periodic mode the divider goes first and the initial
    /// count last, since writing the count starts the timer. Deadline mode
    /// stays idle until [`arm_deadline`](Self::arm_deadline).
    ///
    /// # Safety
    /// A handler must be registered for `vector`. Deadline mode requires
    /// CPUID.01H:ECX\[24\].
    pub unsafe fn start_timer(&self, vector: u8, mode: TimerMode) {
        unsafe {
            let lvt = LvtTimer::from_bits(self.read(reg::LVT_TIMER))
                .with_vector(vector)
                .with_masked(false)
                .with_mode(mode.bits());
            if let TimerMode::Periodic { .. } = mode {
                self.write(reg::TIMER_DIVIDE, TIMER_DIVIDE_BY_16);
            }
            self.write(reg::LVT_TIMER, lvt.into_bits());
            if let TimerMode::Periodic { initial_count } = mode {
                self.write(reg::TIMER_INITIAL_COUNT, initial_count);
            }
        }
        debug!("LAPIC timer on vector {vector:#x}: {mode:?}");
    }

    /// Schedules the next deadline-mode interrupt at TSC value `tsc`.
    ///
    /// # Safety
    /// The timer must be in [`TimerMode::TscDeadline`].
    pub unsafe fn arm_deadline(&self, tsc: u64) {
        unsafe { self.platform().write_msr(IA32_TSC_DEADLINE, tsc) };
    }

    /// Masks the timer and clears both the count and the deadline.
    ///
    /// # Safety
    /// Runs on the core that owns the timer.
    pub unsafe fn stop_timer(&self, deadline_capable: bool) {
        unsafe {
            let lvt = LvtTimer::from_bits(self.read(reg::LVT_TIMER)).with_masked(true);
            self.write(reg::LVT_TIMER, lvt.into_bits());
            self.write(reg::TIMER_INITIAL_COUNT, 0);
            if deadline_capable {
                self.arm_deadline(0);
            }
        }
    }

    /// Ticks left in the current period.
    #[must_use]
    pub fn timer_current_count(&self) -> u32 {
        unsafe { self.read(reg::TIMER_CURRENT_COUNT) }
    }

    #[must_use]
    pub fn timer_lvt(&self) -> LvtTimer {
        LvtTimer::from_bits(unsafe { self.read(reg::LVT_TIMER) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lvt_layout() {
        let lvt = LvtTimer::new()
            .with_vector(0x32)
            .with_masked(true)
            .with_mode(TimerMode::TscDeadline.bits());
        assert_eq!(lvt.into_bits(), 0x0005_0032);
        assert_eq!(
            LvtTimer::from_bits(0x0002_0040).mode(),
            TimerMode::Periodic { initial_count: 0 }.bits()
        );
    }

    #[test]
    fn periodic_counts_are_never_zero() {
        assert_eq!(periodic_count(6_250_000, 100), 62_500);
        assert_eq!(periodic_count(50, 100), 1);
        assert_eq!(periodic_count(u64::MAX, 1), u32::MAX);
        assert_eq!(periodic_count(1000, 0), 1000);
    }
}
