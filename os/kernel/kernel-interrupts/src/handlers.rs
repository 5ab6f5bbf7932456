//! Handler chains.
//!
//! Each vector has [`HANDLERS_PER_VECTOR`] slots. Dispatch runs every
//! occupied slot in slot order, which lets several devices share a line.

use crate::error::InterruptError;
use crate::frame::{InterruptFrame, RegisterState};
use crate::vectors::{VECTOR_COUNT, VectorFlags, VectorMap};
use log::debug;

pub const HANDLERS_PER_VECTOR: usize = 16;

/// Something that wants to run when a vector fires.
///
/// Handlers run with interrupts masked on the current core and must not
/// block. They may register or unregister handlers, including themselves.
pub trait InterruptHandler: Sync {
    fn handle(&self, ctx: &mut InterruptContext<'_>);
}

/// Adapts a plain function into an [`InterruptHandler`].
pub struct FnHandler(pub fn(&mut InterruptContext<'_>));

impl InterruptHandler for FnHandler {
    fn handle(&self, ctx: &mut InterruptContext<'_>) {
        (self.0)(ctx);
    }
}

/// What a handler gets to see of the interrupt it is handling.
pub struct InterruptContext<'a> {
    vector: u8,
    core: usize,
    frame: &'a mut InterruptFrame,
}

impl<'a> InterruptContext<'a> {
    pub(crate) const fn new(vector: u8, core: usize, frame: &'a mut InterruptFrame) -> Self {
        Self {
            vector,
            core,
            frame,
        }
    }

    #[must_use]
    pub const fn vector(&self) -> u8 {
        self.vector
    }

    /// Dense index of the core the interrupt arrived on.
    #[must_use]
    pub const fn core_index(&self) -> usize {
        self.core
    }

    #[must_use]
    pub const fn error_code(&self) -> u64 {
        self.frame.error_code
    }

    /// The trapped registers, including changes made by earlier handlers.
    #[must_use]
    pub const fn register_state(&self) -> RegisterState {
        *self.frame
    }

    /// Replaces the registers restored by `iretq`. `vector` and `error_code`
    /// are ignored by the return path.
    pub const fn set_register_state(&mut self, state: RegisterState) {
        *self.frame = state;
    }
}

pub type HandlerChain = [Option<&'static dyn InterruptHandler>; HANDLERS_PER_VECTOR];

/// Vector reservations plus handler chains; guarded as one unit.
pub struct Registry {
    vectors: VectorMap,
    chains: [HandlerChain; VECTOR_COUNT],
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            vectors: VectorMap::new(),
            chains: [[None; HANDLERS_PER_VECTOR]; VECTOR_COUNT],
        }
    }

    /// See [`VectorMap::allocate`].
    ///
    /// # Errors
    /// [`InterruptError::VectorUnavailable`].
    pub fn allocate_vectors(
        &mut self,
        count: usize,
        flags: VectorFlags,
        base: u8,
    ) -> Result<u8, InterruptError> {
        self.vectors.allocate(count, flags, base)
    }

    pub fn release_vectors(&mut self, base: u8, count: usize) {
        self.vectors.release(base, count);
    }

    #[must_use]
    pub const fn is_blocked(&self, vector: u8) -> bool {
        self.vectors.is_blocked(vector)
    }

    /// Puts `handler` into the first free slot of `vector`.
    ///
    /// # Errors
    /// [`InterruptError::VectorOversubscribed`] if all slots are taken.
    pub fn register(
        &mut self,
        vector: u8,
        handler: &'static dyn InterruptHandler,
    ) -> Result<(), InterruptError> {
        let chain = &mut self.chains[usize::from(vector)];
        let (slot_idx, slot) = chain
            .iter_mut()
            .enumerate()
            .find(|(_, s)| s.is_none())
            .ok_or(InterruptError::VectorOversubscribed { vector })?;
        *slot = Some(handler);
        debug!("Registered handler in slot {slot_idx} of vector {vector:#x}");
        Ok(())
    }

    /// Clears every slot of `vector` that holds `handler` (same object, by
    /// address). Unknown handlers are ignored.
    pub fn unregister(&mut self, vector: u8, handler: &'static dyn InterruptHandler) {
        for slot in &mut self.chains[usize::from(vector)] {
            if slot.is_some_and(|h| core::ptr::addr_eq(h, handler)) {
                *slot = None;
            }
        }
    }

    /// A copy of the chain, so it can run after the lock is released.
    #[must_use]
    pub const fn chain(&self, vector: u8) -> HandlerChain {
        self.chains[vector as usize]
    }

    #[must_use]
    pub fn handler_count(&self, vector: u8) -> usize {
        self.chains[usize::from(vector)].iter().flatten().count()
    }
}
