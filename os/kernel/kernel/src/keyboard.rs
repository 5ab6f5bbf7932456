//! PS/2 keyboard on ISA IRQ 1. Scancodes are only logged.

use crate::init::ROUTER;
use crate::ports::inb;
use kernel_acpi::topology::AcpiTopology;
use kernel_apic::isa_line;
use kernel_interrupts::{
    FnHandler, InterruptContext, VectorFlags, allocate_vectors, register_handler,
    release_vectors, unregister_handler,
};
use log::{debug, info, warn};

const KEYBOARD_IRQ: u8 = 1;

/// Vector tried first, the identity-layout vector of IRQ 1.
const PREFERRED_VECTOR: u8 = 0x21;

const PS2_DATA: u16 = 0x60;

static KEYBOARD: FnHandler = FnHandler(on_key);

fn on_key(ctx: &mut InterruptContext<'_>) {
    // Reading the byte lets the controller raise the next IRQ.
    let scancode = unsafe { inb(PS2_DATA) };
    debug!("Scancode {scancode:#04x} on core {}", ctx.core_index());
}

/// Routes the keyboard's line to a fresh vector and unmasks it. Failures
/// are logged and leave the line masked.
pub fn enable_keyboard(topology: &AcpiTopology) {
    let vector = match allocate_vectors(1, VectorFlags::EXCLUSIVE, PREFERRED_VECTOR) {
        Ok(vector) => vector,
        Err(e) => {
            warn!("Keyboard not enabled: {e}");
            return;
        }
    };
    if let Err(e) = register_handler(vector, &KEYBOARD) {
        warn!("Keyboard not enabled: {e}");
        release_vectors(vector, 1);
        return;
    }

    let (gsi, polarity, trigger) = isa_line(topology, KEYBOARD_IRQ);
    match ROUTER
        .map_line(gsi, vector, polarity, trigger)
        .and_then(|()| ROUTER.set_mask(gsi, false))
    {
        Ok(()) => info!("Keyboard on GSI {gsi}, vector {vector:#x}"),
        Err(e) => {
            warn!("Keyboard not enabled: {e}");
            if let Err(e) = ROUTER.set_mask(gsi, true) {
                debug!("{e}");
            }
            unregister_handler(vector, &KEYBOARD);
            release_vectors(vector, 1);
        }
    }
}
