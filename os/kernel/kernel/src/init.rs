//! Bootstrap processor bring-up.
//!
//! The loader jumps to [`_start_kernel`] with the boot info pointer in `RDI`.
//! From there the BSP walks the fixed order every later stage depends on:
//!
//! ```text
//! logger ─► physical memory ─► ACPI topology ─► LAPIC ─► IDT + dispatch
//!        ─► legacy PIC off ─► IOAPIC routes ─► tick ─► APs ─► sti ─► kernel_main
//! ```

use crate::cpuid;
use crate::interrupts::install_kernel_handlers;
use crate::keyboard::enable_keyboard;
use crate::kernel_main;
use crate::memory::init_physical_memory;
use crate::platform::{HardwarePlatform, HhdmMap, memory_regions};
use crate::ports::LegacyPorts;
use crate::smp::start_aps;
use crate::timer::{install_tick, start_core_tick};
use crate::tracing::{trace_boot_info, trace_memory_map};
use crate::tsc::TscDelay;
use kernel_acpi::topology::{AcpiTopology, install_topology};
use kernel_apic::ioapic::MmioIoApic;
use kernel_apic::pic::disable_legacy_pic;
use kernel_apic::{CpuPlatform, InterruptRouter, LocalApic, SharedRouter};
use kernel_info::boot::KernelBootInfo;
use kernel_interrupts::INTERRUPTS;
use kernel_interrupts::idt::current_cs;
use kernel_interrupts::stubs::stub_addresses;
use kernel_qemu::{QemuLogger, qemu_trace};
use kernel_sync::irq::sti_enable_interrupts;
use kernel_sync::SyncOnceCell;
use log::{LevelFilter, info, warn};

/// Size of the stack the BSP runs on until it idles.
pub const BOOT_STACK_SIZE: usize = 64 * 1024;

/// IOAPIC register window.
const IOAPIC_MMIO_LEN: usize = 0x20;

#[repr(align(16))]
struct Aligned16<const N: usize>([u8; N]);

/// BSP stack. Referenced by name from [`_start_kernel`].
#[unsafe(link_section = ".bss.boot")]
#[unsafe(no_mangle)]
static mut BOOT_STACK: Aligned16<BOOT_STACK_SIZE> = Aligned16([0; BOOT_STACK_SIZE]);

const _: () = assert!(
    BOOT_STACK_SIZE.is_multiple_of(16),
    "BOOT_STACK_SIZE should be 16-byte aligned"
);

/// Local APIC driver shared by all cores. Every core programs its own LAPIC
/// through the same instance.
pub static LAPIC: SyncOnceCell<LocalApic<HardwarePlatform>> = SyncOnceCell::new();

/// IOAPIC routes. The BSP installs the default layout; drivers map and
/// unmask their lines through it afterwards.
pub static ROUTER: SharedRouter<MmioIoApic> = SharedRouter::new();

/// The kernel entry point.
///
/// # ABI
/// `extern "C"` (sysv64): `boot_info` arrives in `RDI`. The function is naked
/// so that it can switch to [`BOOT_STACK`] before any Rust code touches the
/// loader's stack.
#[unsafe(no_mangle)]
#[unsafe(naked)]
pub extern "C" fn _start_kernel(_boot_info: *const KernelBootInfo) {
    core::arch::naked_asm!(
        "cli",
        "mov r12, rdi",
        "lea rax, [rip + {stack_sym}]",
        "add rax, {stack_size}",
        "and rax, -16",
        "mov rsp, rax",
        // Emulate a CALL so that RSP % 16 == 8 at entry.
        "push 0",
        "xor rbp, rbp",
        "mov rdi, r12",
        "jmp {rust_entry}",
        stack_sym = sym BOOT_STACK,
        stack_size = const BOOT_STACK_SIZE,
        rust_entry = sym kernel_entry_on_boot_stack,
    );
}

/// Kernel entry running on [`BOOT_STACK`].
#[unsafe(no_mangle)]
pub extern "C" fn kernel_entry_on_boot_stack(boot_info: *const KernelBootInfo) -> ! {
    if QemuLogger::new(LevelFilter::Debug)
        .with_core_id(current_core_id)
        .init()
        .is_err()
    {
        qemu_trace!("logger was already installed\n");
    }
    info!("Kernel reporting to QEMU! Initializing bootstrap processor now.");
    let features = cpuid::features();
    info!(
        "CPU features: x2APIC={}, TSC-deadline={}, hypervisor={}",
        features.x2apic(),
        features.tsc_deadline(),
        features.hypervisor()
    );

    let bi = unsafe { &*boot_info };
    trace_boot_info(bi);
    trace_memory_map(unsafe { memory_regions(bi) });

    unsafe { init_physical_memory(bi) };
    let topology = discover_topology(bi);

    let lapic = LAPIC.get_or_init(|| unsafe { LocalApic::new(HardwarePlatform) });
    let apic_id = unsafe { lapic.init_current_core() };
    unsafe { init_core_interrupts(apic_id) };
    INTERRUPTS.install_controller(lapic);
    if let Err(e) = install_kernel_handlers() {
        panic!("Failed to install kernel interrupt handlers: {e}");
    }

    if topology.pc_at_compat() {
        unsafe { disable_legacy_pic(&LegacyPorts) };
        info!("Legacy 8259 PICs remapped and masked");
    }
    route_device_interrupts(topology, apic_id);
    enable_keyboard(topology);

    let delay = unsafe { TscDelay::calibrate() };
    if let Err(e) = unsafe { install_tick(&delay) } {
        panic!("Failed to install the timer tick: {e}");
    }
    unsafe { start_core_tick() };
    let started = unsafe { start_aps(topology, &delay) };
    info!(
        "{} of {} cores online",
        started + 1,
        topology.lapics().iter().filter(|l| l.enabled).count()
    );

    sti_enable_interrupts();
    kernel_main()
}

/// Claims a core slot, fills its IDT with the shared stubs and loads it.
/// Returns the core index.
///
/// # Safety
/// Must run on the core identified by `apic_id`, once.
pub unsafe fn init_core_interrupts(apic_id: u32) -> usize {
    let core = match unsafe { INTERRUPTS.init_core(apic_id, &stub_addresses(), current_cs()) } {
        Ok(core) => core,
        Err(e) => panic!("Failed to set up interrupts for APIC ID {apic_id}: {e}"),
    };
    let Some(slot) = INTERRUPTS.cores().slot(core) else {
        panic!("Core slot {core} vanished after claiming it");
    };
    unsafe { slot.idt().load() };
    core
}

fn discover_topology(bi: &KernelBootInfo) -> &'static AcpiTopology {
    assert!(bi.rsdp_addr != 0, "Loader did not provide an RSDP");
    match unsafe { AcpiTopology::discover(&HhdmMap, bi.rsdp_addr) } {
        Ok(topology) => install_topology(topology),
        Err(e) => panic!("ACPI topology discovery failed: {e}"),
    }
}

/// Programs the default IOAPIC layout. All lines start masked; drivers
/// unmask what they own.
fn route_device_interrupts(topology: &AcpiTopology, destination: u32) {
    let router = InterruptRouter::init(topology, destination, |io| unsafe {
        MmioIoApic::new(HardwarePlatform.map_mmio(io.base_addr, IOAPIC_MMIO_LEN))
    });
    info!(
        "{} IOAPIC(s) routed to APIC ID {destination}",
        router.controllers().count()
    );
    if ROUTER.install(router).is_err() {
        warn!("IOAPIC routes were already installed");
    }
}

/// Logger prefix: the core index of the calling CPU, once interrupts are up.
fn current_core_id() -> Option<u32> {
    let apic_id = LAPIC.get()?.current_apic_id();
    INTERRUPTS
        .cores()
        .index_of(apic_id)
        .and_then(|core| u32::try_from(core).ok())
}
