//! # Application processor start-up
//!
//! INIT-SIPI-SIPI against every enabled LAPIC in the topology. The AP runs
//! real-mode code at the trampoline page named by the STARTUP vector and
//! reports in through an [`ApReady`] flag once it reaches the kernel.

use crate::error::SmpError;
use crate::icr::DeliveryMode;
use crate::lapic::LocalApic;
use crate::platform::{CpuPlatform, Delay};
use core::sync::atomic::{AtomicBool, Ordering};
use kernel_acpi::topology::{AcpiTopology, LapicInfo};
use log::{debug, info, warn};

/// Wait between INIT and the first STARTUP.
pub const INIT_DELAY_US: u64 = 10_000;

/// Ready-flag polls after each STARTUP, [`POLL_INTERVAL_US`] apart.
pub const STARTUP_POLLS: usize = 1_000;

pub const POLL_INTERVAL_US: u64 = 100;

/// Set by an AP once it has left the trampoline.
#[derive(Debug)]
pub struct ApReady(AtomicBool);

impl ApReady {
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Called from the AP.
    pub fn signal(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::Release);
    }

    #[must_use]
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

impl Default for ApReady {
    fn default() -> Self {
        Self::new()
    }
}

/// The STARTUP vector for a trampoline at `phys`: its page number.
///
/// `None` unless `phys` is page-aligned and below 1 MiB.
#[must_use]
pub const fn startup_vector(phys: u64) -> Option<u8> {
    if phys & 0xFFF != 0 || phys >= 0x10_0000 {
        return None;
    }
    #[allow(clippy::cast_possible_truncation)]
    Some((phys >> 12) as u8)
}

fn wait_ready(ready: &ApReady, delay: &impl Delay) -> bool {
    for _ in 0..STARTUP_POLLS {
        if ready.is_set() {
            return true;
        }
        delay.delay_us(POLL_INTERVAL_US);
    }
    ready.is_set()
}

/// Starts the AP with APIC ID `apic_id`.
///
/// # Errors
/// [`SmpError::StartupTimeout`] if the AP has not signalled `ready` after
/// the second STARTUP. The AP is sent a final INIT first, which parks it in
/// wait-for-STARTUP so that it cannot run on resources the caller reclaims.
pub fn start_ap<P: CpuPlatform>(
    lapic: &LocalApic<P>,
    apic_id: u32,
    startup_vector: u8,
    ready: &ApReady,
    delay: &impl Delay,
) -> Result<(), SmpError> {
    ready.clear();

    lapic.send_ipi(apic_id, 0, DeliveryMode::Init);
    delay.delay_us(INIT_DELAY_US);

    lapic.send_ipi(apic_id, startup_vector, DeliveryMode::Startup);
    if wait_ready(ready, delay) {
        return Ok(());
    }

    debug!("AP {apic_id} silent after STARTUP, resending");
    lapic.send_ipi(apic_id, startup_vector, DeliveryMode::Startup);
    if wait_ready(ready, delay) {
        return Ok(());
    }

    lapic.send_ipi(apic_id, 0, DeliveryMode::Init);
    Err(SmpError::StartupTimeout { apic_id })
}

/// Starts every enabled AP in `topology`, one at a time. Failures are
/// logged and skipped. Returns the number of APs that came up.
///
/// `prepare` runs before each AP is kicked, e.g. to hand it a stack through
/// the trampoline, and returns whatever it set aside for that AP; `None`
/// skips the AP. If the AP then fails to start, `abandon` gets those
/// resources back.
pub fn start_application_processors<P: CpuPlatform, T>(
    lapic: &LocalApic<P>,
    topology: &AcpiTopology,
    startup_vector: u8,
    ready: &ApReady,
    delay: &impl Delay,
    mut prepare: impl FnMut(&LapicInfo) -> Option<T>,
    mut abandon: impl FnMut(&LapicInfo, T),
) -> usize {
    let bsp = lapic.current_apic_id();
    let mut started = 0;

    for cpu in topology.lapics() {
        if cpu.apic_id == bsp {
            continue;
        }
        if !cpu.enabled {
            debug!("Skipping disabled APIC ID {}", cpu.apic_id);
            continue;
        }
        let Some(resources) = prepare(cpu) else {
            warn!("Skipping APIC ID {}: not prepared", cpu.apic_id);
            continue;
        };

        match start_ap(lapic, cpu.apic_id, startup_vector, ready, delay) {
            Ok(()) => {
                info!("AP {} (APIC ID {}) online", cpu.processor_id, cpu.apic_id);
                started += 1;
            }
            Err(e) => {
                warn!("{e}");
                abandon(cpu, resources);
            }
        }
    }

    info!("{started} application processor(s) started");
    started
}
