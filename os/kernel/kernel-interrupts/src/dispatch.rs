//! The interrupt subsystem: registry, per-core state and dispatch.

use crate::cores::{CoreTable, MAX_CORES};
use crate::error::InterruptError;
use crate::frame::{InterruptFrame, RegisterState};
use crate::handlers::{InterruptContext, InterruptHandler, Registry};
use crate::vectors::{FIRST_DYNAMIC_VECTOR, VectorFlags};
use kernel_sync::{SpinMutex, SyncOnceCell};
use log::{error, info, warn};

/// The local interrupt controller as dispatch sees it.
pub trait InterruptController: Sync {
    /// APIC ID of the executing core.
    fn current_apic_id(&self) -> u32;

    /// Acknowledges `vector` on the executing core.
    fn end_of_interrupt(&self, vector: u8);
}

pub struct Interrupts<const CORES: usize = MAX_CORES> {
    registry: SpinMutex<Registry>,
    cores: CoreTable<CORES>,
    controller: SyncOnceCell<&'static dyn InterruptController>,
}

impl<const CORES: usize> Default for Interrupts<CORES> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const CORES: usize> Interrupts<CORES> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            registry: SpinMutex::new(Registry::new()),
            cores: CoreTable::new(),
            controller: SyncOnceCell::new(),
        }
    }

    /// Sets the controller used for core lookup and EOI. Only the first call
    /// has an effect.
    pub fn install_controller(&self, controller: &'static dyn InterruptController) {
        if self.controller.try_init(controller).is_err() {
            warn!("Interrupt controller already installed");
        }
    }

    pub const fn cores(&self) -> &CoreTable<CORES> {
        &self.cores
    }

    /// Claims a core slot for `apic_id` and points its IDT at `stubs`.
    /// Returns the core index. The caller loads the IDT.
    ///
    /// # Errors
    /// [`InterruptError::CoreTableFull`] when all slots are claimed.
    ///
    /// # Safety
    /// Must run on the core identified by `apic_id`, before that core loads
    /// its IDT.
    pub unsafe fn init_core(
        &self,
        apic_id: u32,
        stubs: &[u64; 256],
        selector: u16,
    ) -> Result<usize, InterruptError> {
        let index = self
            .cores
            .claim(apic_id)
            .ok_or(InterruptError::CoreTableFull { apic_id })?;
        let slot = self
            .cores
            .slot(index)
            .ok_or(InterruptError::NoSuchCore { core: index })?;
        unsafe { slot.idt_mut() }.fill(stubs, selector);
        info!("Interrupts ready on core {index} (APIC ID {apic_id})");
        Ok(index)
    }

    /// # Errors
    /// [`InterruptError::VectorUnavailable`] if no acceptable range is free.
    pub fn allocate_vectors(
        &self,
        count: usize,
        flags: VectorFlags,
        base: u8,
    ) -> Result<u8, InterruptError> {
        self.registry
            .with_lock_irq(|r| r.allocate_vectors(count, flags, base))
    }

    pub fn release_vectors(&self, base: u8, count: usize) {
        self.registry.with_lock_irq(|r| r.release_vectors(base, count));
    }

    /// # Errors
    /// [`InterruptError::VectorOversubscribed`] if the vector's slots are full.
    pub fn register_handler(
        &self,
        vector: u8,
        handler: &'static dyn InterruptHandler,
    ) -> Result<(), InterruptError> {
        self.registry.with_lock_irq(|r| r.register(vector, handler))
    }

    pub fn unregister_handler(&self, vector: u8, handler: &'static dyn InterruptHandler) {
        self.registry.with_lock_irq(|r| r.unregister(vector, handler));
    }

    pub fn handler_count(&self, vector: u8) -> usize {
        self.registry.with_lock_irq(|r| r.handler_count(vector))
    }

    /// Index of the executing core. Before a controller is installed only
    /// the boot core runs, which is index 0.
    pub fn current_core(&self) -> usize {
        self.controller.get().map_or(0, |c| {
            let apic_id = c.current_apic_id();
            self.cores
                .index_of(apic_id)
                .unwrap_or_else(|| panic!("interrupt on unregistered core (APIC ID {apic_id})"))
        })
    }

    /// Registers of the interrupt `core` is dispatching right now.
    ///
    /// Only meaningful when called from `core` itself, i.e. from a handler.
    ///
    /// # Errors
    /// [`InterruptError::NotInInterrupt`] outside dispatch,
    /// [`InterruptError::NoSuchCore`] for an index past the table.
    pub fn register_state(&self, core: usize) -> Result<RegisterState, InterruptError> {
        let live = self.live_frame(core)?;
        // SAFETY: non-null only while dispatch holds the frame on this core.
        Ok(unsafe { *live })
    }

    /// Replaces the registers that the interrupted code resumes with.
    ///
    /// # Errors
    /// As [`register_state`](Self::register_state).
    pub fn set_register_state(
        &self,
        core: usize,
        state: RegisterState,
    ) -> Result<(), InterruptError> {
        let live = self.live_frame(core)?;
        // SAFETY: as in `register_state`.
        unsafe { *live = state };
        Ok(())
    }

    fn live_frame(&self, core: usize) -> Result<*mut InterruptFrame, InterruptError> {
        let slot = self
            .cores
            .slot(core)
            .ok_or(InterruptError::NoSuchCore { core })?;
        let live = slot.live();
        if live.is_null() {
            Err(InterruptError::NotInInterrupt)
        } else {
            Ok(live)
        }
    }

    /// Runs the handler chain for the interrupt in `frame`.
    ///
    /// The chain is copied out of the registry first, so handlers run
    /// without the registry lock held. Exceptions and IRQs alike must have
    /// at least one handler.
    ///
    /// # Panics
    /// If no handler is registered for the vector.
    pub fn dispatch(&self, frame: &mut InterruptFrame) {
        let vector = frame.vector();
        let core = self.current_core();
        let slot = self
            .cores
            .slot(core)
            .unwrap_or_else(|| panic!("core index {core} out of range"));

        // SAFETY: we are on `core`, and `frame` outlives this call.
        let previous = unsafe { slot.enter(core::ptr::from_mut(frame)) };
        let chain = self.registry.with_lock_irq(|r| r.chain(vector));

        let mut ran = 0;
        for handler in chain.into_iter().flatten() {
            // Handlers reach the frame through the live pointer, so other
            // accessors see their edits.
            let live = slot.live();
            let mut ctx = InterruptContext::new(vector, core, unsafe { &mut *live });
            handler.handle(&mut ctx);
            ran += 1;
        }

        if ran == 0 {
            slot.leave(previous);
            error!(
                "Unhandled interrupt {vector:#x} on core {core} at rip={:#x} err={:#x}",
                frame.rip, frame.error_code
            );
            panic!("[core {core}] unhandled interrupt {vector:#x}");
        }

        slot.leave(previous);
        if vector >= FIRST_DYNAMIC_VECTOR
            && let Some(c) = self.controller.get()
        {
            c.end_of_interrupt(vector);
        }
    }

    /// Registers as they were when the last interrupt on `core` arrived.
    ///
    /// # Errors
    /// [`InterruptError::NoSuchCore`] for an index past the table.
    ///
    /// # Safety
    /// Only `core` itself may call this.
    pub unsafe fn last_snapshot(&self, core: usize) -> Result<RegisterState, InterruptError> {
        let slot = self
            .cores
            .slot(core)
            .ok_or(InterruptError::NoSuchCore { core })?;
        Ok(unsafe { slot.snapshot() })
    }
}
