//! Kernel-owned interrupt handlers.

use kernel_apic::SPURIOUS_VECTOR;
use kernel_interrupts::{
    FnHandler, INTERRUPTS, InterruptContext, InterruptError, VectorFlags, allocate_vectors,
    register_handler, register_state,
};
use log::{debug, info};

/// `#BP`.
const BREAKPOINT_VECTOR: u8 = 3;

static SPURIOUS: FnHandler = FnHandler(on_spurious);
static BREAKPOINT: FnHandler = FnHandler(on_breakpoint);

fn on_spurious(ctx: &mut InterruptContext<'_>) {
    debug!("Spurious interrupt on core {}", ctx.core_index());
}

/// Logs and resumes after the `int3`.
fn on_breakpoint(ctx: &mut InterruptContext<'_>) {
    if let Ok(state) = register_state() {
        info!(
            "#BP on core {} at {:#x} (rsp={:#x})",
            ctx.core_index(),
            state.rip,
            state.rsp
        );
    }
}

/// Reserves the spurious vector and installs the kernel's own handlers.
/// Everything else stays unhandled until a driver claims it.
///
/// # Errors
/// Any [`InterruptError`] from the registry; the boot path treats these as
/// fatal.
pub fn install_kernel_handlers() -> Result<(), InterruptError> {
    let spurious = allocate_vectors(1, VectorFlags::EXCLUSIVE.fixed(), SPURIOUS_VECTOR)?;
    register_handler(spurious, &SPURIOUS)?;
    register_handler(BREAKPOINT_VECTOR, &BREAKPOINT)?;
    debug!(
        "Kernel handlers installed ({} on {spurious:#x})",
        INTERRUPTS.handler_count(spurious)
    );
    Ok(())
}
