//! # Kernel Interrupt Dispatch
//!
//! Vector allocation, handler registration and the path from a hardware
//! interrupt to Rust handlers:
//!
//! ```text
//!  CPU ──► IDT gate ──► stub[v] ──► interrupt_common ──► Interrupts::dispatch
//!                     (push err?,   (save GPRs,          (snapshot, run chain,
//!                      push v)       align, call)         EOI for v ≥ 32)
//! ```
//!
//! ## Components
//! - [`idt`]: the 16-byte gate layout and a per-core table.
//! - [`vectors`]: exclusive/shared vector reservations.
//! - [`handlers`]: [`InterruptHandler`] chains of up to
//!   [`HANDLERS_PER_VECTOR`] entries per vector.
//! - [`cores`]: per-core IDT, register snapshot and live frame, indexed by a
//!   dense core index instead of TLS.
//! - [`dispatch`]: [`Interrupts`], which ties the above together.
//! - `stubs` (x86-64 only): the macro-generated naked entry points.
//!
//! The registry lock is always taken with interrupts masked, so registering
//! from a handler or from normal code cannot deadlock against dispatch.
//!
//! ## Usage
//! ```rust
//! use kernel_interrupts::{FnHandler, InterruptContext, VectorFlags, allocate_vectors, register_handler};
//!
//! fn on_tick(ctx: &mut InterruptContext<'_>) {
//!     let _ = ctx.core_index();
//! }
//! static TICK: FnHandler = FnHandler(on_tick);
//!
//! let vector = allocate_vectors(1, VectorFlags::EXCLUSIVE, 0).unwrap();
//! register_handler(vector, &TICK).unwrap();
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod cores;
pub mod dispatch;
pub mod error;
pub mod frame;
pub mod handlers;
pub mod idt;
#[cfg(target_arch = "x86_64")]
pub mod stubs;
pub mod vectors;

pub use cores::MAX_CORES;
pub use dispatch::{InterruptController, Interrupts};
pub use error::InterruptError;
pub use frame::{InterruptFrame, RegisterState};
pub use handlers::{FnHandler, HANDLERS_PER_VECTOR, InterruptContext, InterruptHandler};
pub use vectors::VectorFlags;

/// The kernel's interrupt subsystem. The stubs dispatch into this instance.
pub static INTERRUPTS: Interrupts = Interrupts::new();

/// Reserves vectors in [`INTERRUPTS`]; see [`vectors::VectorMap::allocate`].
///
/// # Errors
/// [`InterruptError::VectorUnavailable`].
pub fn allocate_vectors(count: usize, flags: VectorFlags, base: u8) -> Result<u8, InterruptError> {
    INTERRUPTS.allocate_vectors(count, flags, base)
}

pub fn release_vectors(base: u8, count: usize) {
    INTERRUPTS.release_vectors(base, count);
}

/// # Errors
/// [`InterruptError::VectorOversubscribed`].
pub fn register_handler(
    vector: u8,
    handler: &'static dyn InterruptHandler,
) -> Result<(), InterruptError> {
    INTERRUPTS.register_handler(vector, handler)
}

pub fn unregister_handler(vector: u8, handler: &'static dyn InterruptHandler) {
    INTERRUPTS.unregister_handler(vector, handler);
}

/// Registers of the interrupt the executing core is handling.
///
/// # Errors
/// [`InterruptError::NotInInterrupt`] outside a handler.
pub fn register_state() -> Result<RegisterState, InterruptError> {
    INTERRUPTS.register_state(INTERRUPTS.current_core())
}

/// # Errors
/// [`InterruptError::NotInInterrupt`] outside a handler.
pub fn set_register_state(state: RegisterState) -> Result<(), InterruptError> {
    INTERRUPTS.set_register_state(INTERRUPTS.current_core(), state)
}
