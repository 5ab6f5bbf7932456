//! Per-core tick on the LAPIC timer.
//!
//! The BSP picks the vector and the mode once; every core then starts its
//! own timer with the same setup. TSC-deadline mode is used when CPUID
//! offers it, the periodic mode otherwise.

use crate::cpuid;
use crate::init::LAPIC;
use crate::tsc::{TscDelay, rdtsc};
use core::sync::atomic::{AtomicU64, Ordering};
use kernel_apic::TimerMode;
use kernel_apic::timer::periodic_count;
use kernel_interrupts::{
    FnHandler, InterruptContext, InterruptError, VectorFlags, allocate_vectors, register_handler,
};
use kernel_sync::SyncOnceCell;
use log::{debug, info, warn};

/// Vector tried first for the tick.
const PREFERRED_TIMER_VECTOR: u8 = 50;

const TICK_HZ: u64 = 100;

/// LAPIC timer calibration window.
const CALIBRATION_WINDOW_US: u64 = 10_000;

#[derive(Debug, Copy, Clone)]
struct TickSetup {
    vector: u8,
    mode: TimerMode,
    /// TSC ticks between deadlines; unused in periodic mode.
    deadline_step: u64,
}

static SETUP: SyncOnceCell<TickSetup> = SyncOnceCell::new();
static TICKS: AtomicU64 = AtomicU64::new(0);
static TICK: FnHandler = FnHandler(on_tick);

/// Ticks seen by all cores together.
#[must_use]
pub fn ticks() -> u64 {
    TICKS.load(Ordering::Relaxed)
}

fn on_tick(_ctx: &mut InterruptContext<'_>) {
    TICKS.fetch_add(1, Ordering::Relaxed);
    let (Some(setup), Some(lapic)) = (SETUP.get(), LAPIC.get()) else {
        return;
    };
    if setup.mode == TimerMode::TscDeadline {
        unsafe { lapic.arm_deadline(rdtsc().wrapping_add(setup.deadline_step)) };
    }
}

/// Claims the tick vector and settles the timer mode. BSP only, after
/// [`LAPIC`] is up; the periodic count is calibrated on the BSP's timer.
///
/// # Errors
/// An [`InterruptError`] if no vector is free or the handler cannot be
/// registered.
///
/// # Safety
/// Reprograms the BSP's LAPIC timer while calibrating.
pub unsafe fn install_tick(delay: &TscDelay) -> Result<(), InterruptError> {
    let Some(lapic) = LAPIC.get() else {
        warn!("No local APIC; running without a tick");
        return Ok(());
    };
    let vector = allocate_vectors(1, VectorFlags::EXCLUSIVE, PREFERRED_TIMER_VECTOR)?;
    register_handler(vector, &TICK)?;

    let (mode, deadline_step) = if cpuid::features().tsc_deadline() {
        (TimerMode::TscDeadline, delay.hz() / TICK_HZ)
    } else {
        let timer_hz = unsafe { lapic.calibrate_timer(delay, CALIBRATION_WINDOW_US) };
        let initial_count = periodic_count(timer_hz, TICK_HZ);
        (TimerMode::Periodic { initial_count }, 0)
    };
    let setup = TickSetup {
        vector,
        mode,
        deadline_step,
    };
    if SETUP.try_init(setup).is_err() {
        warn!("Tick already installed; keeping the first setup");
    }
    info!("{TICK_HZ} Hz tick on vector {vector:#x}, {mode:?}");
    Ok(())
}

/// Starts the executing core's timer.
///
/// # Safety
/// Runs on the core itself, after its LAPIC is enabled and its IDT loaded.
pub unsafe fn start_core_tick() {
    let (Some(setup), Some(lapic)) = (SETUP.get(), LAPIC.get()) else {
        debug!("No tick configured");
        return;
    };
    unsafe {
        lapic.start_timer(setup.vector, setup.mode);
        if setup.mode == TimerMode::TscDeadline {
            lapic.arm_deadline(rdtsc().wrapping_add(setup.deadline_step));
        }
    }
}
