//! Application processor bring-up and entry.

use crate::init::{LAPIC, init_core_interrupts};
use crate::timer::start_core_tick;
use crate::trampoline::Trampoline;
use crate::tsc::TscDelay;
use kernel_acpi::topology::AcpiTopology;
use kernel_alloc::AllocFlags;
use kernel_alloc::frame_alloc::{allocate_frame, free_frame};
use kernel_apic::smp::{start_application_processors, startup_vector};
use kernel_apic::ApReady;
use kernel_info::memory::{AP_TRAMPOLINE_PHYS, KERNEL_STACK_SIZE, phys_to_virt};
use kernel_sync::irq::sti_enable_interrupts;
use log::{debug, error, info};

const AP_STACK_BYTES: u64 = KERNEL_STACK_SIZE as u64;

/// Raised by each AP once its LAPIC and IDT are up.
static AP_READY: ApReady = ApReady::new();

/// Starts every other enabled core. Returns how many came up.
///
/// # Safety
/// BSP only, after [`LAPIC`] and the interrupt subsystem are initialized.
pub unsafe fn start_aps(topology: &AcpiTopology, delay: &TscDelay) -> usize {
    let Some(lapic) = LAPIC.get() else {
        error!("SMP start-up without a local APIC");
        return 0;
    };
    let Some(vector) = startup_vector(AP_TRAMPOLINE_PHYS) else {
        error!("AP trampoline at {AP_TRAMPOLINE_PHYS:#x} is not reachable by STARTUP");
        return 0;
    };

    let mut trampoline = unsafe { Trampoline::install(ap_entry) };
    start_application_processors(
        lapic,
        topology,
        vector,
        &AP_READY,
        delay,
        |cpu| match allocate_frame(AP_STACK_BYTES, AllocFlags::ANY) {
            Ok(stack) => {
                trampoline.set_stack(phys_to_virt(stack + AP_STACK_BYTES));
                Some(stack)
            }
            Err(e) => {
                error!("No stack for APIC ID {}: {e}", cpu.apic_id);
                None
            }
        },
        |cpu, stack| {
            debug!("Reclaiming the stack of APIC ID {} at {stack:#x}", cpu.apic_id);
            if let Err(e) = free_frame(stack, AP_STACK_BYTES) {
                error!("Leaking the stack of APIC ID {}: {e}", cpu.apic_id);
            }
        },
    )
}

/// Where the trampoline leaves an AP, on its own stack with interrupts off.
extern "C" fn ap_entry() -> ! {
    let Some(lapic) = LAPIC.get() else {
        panic!("AP started before the local APIC driver");
    };
    let apic_id = unsafe { lapic.init_current_core() };
    let core = unsafe { init_core_interrupts(apic_id) };
    unsafe { start_core_tick() };

    AP_READY.signal();
    info!("Core {core} (APIC ID {apic_id}) entering idle loop");
    sti_enable_interrupts();
    crate::idle()
}
