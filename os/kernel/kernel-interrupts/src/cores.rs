//! Per-core interrupt state.
//!
//! Cores claim a dense index when they bring up interrupts; the index selects
//! a slot holding that core's IDT, its last register snapshot, and the frame
//! it is currently dispatching (if any). A slot is only ever written by the
//! core that claimed it.

use crate::frame::{InterruptFrame, RegisterState};
use crate::idt::Idt;
use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicPtr, AtomicU32, AtomicUsize, Ordering};

pub const MAX_CORES: usize = 64;

const UNCLAIMED: u32 = u32::MAX;

pub struct CoreSlot {
    apic_id: AtomicU32,
    /// Frame under dispatch; null when the core is not in a handler.
    live: AtomicPtr<InterruptFrame>,
    idt: UnsafeCell<Idt>,
    snapshot: UnsafeCell<RegisterState>,
}

impl CoreSlot {
    const EMPTY: Self = Self {
        apic_id: AtomicU32::new(UNCLAIMED),
        live: AtomicPtr::new(core::ptr::null_mut()),
        idt: UnsafeCell::new(Idt::new()),
        snapshot: UnsafeCell::new(InterruptFrame::ZERO),
    };

    /// APIC ID of the owning core, if claimed.
    pub fn apic_id(&self) -> Option<u32> {
        match self.apic_id.load(Ordering::Acquire) {
            UNCLAIMED => None,
            id => Some(id),
        }
    }

    /// The owning core's IDT.
    ///
    /// # Safety
    /// Only the owning core may call this, and not while the table is
    /// borrowed elsewhere.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn idt_mut(&self) -> &mut Idt {
        unsafe { &mut *self.idt.get() }
    }

    /// # Safety
    /// As [`idt_mut`](Self::idt_mut).
    pub unsafe fn idt(&self) -> &Idt {
        unsafe { &*self.idt.get() }
    }

    pub(crate) fn live(&self) -> *mut InterruptFrame {
        self.live.load(Ordering::Acquire)
    }

    /// Publishes `frame` as the one under dispatch and records it as the
    /// snapshot. Returns the previously live frame (non-null when nested).
    ///
    /// # Safety
    /// Owning core only; `frame` must stay valid until [`leave`](Self::leave).
    pub(crate) unsafe fn enter(&self, frame: *mut InterruptFrame) -> *mut InterruptFrame {
        unsafe { *self.snapshot.get() = *frame };
        self.live.swap(frame, Ordering::AcqRel)
    }

    pub(crate) fn leave(&self, previous: *mut InterruptFrame) {
        self.live.store(previous, Ordering::Release);
    }

    /// Registers as they were when the most recent interrupt arrived.
    ///
    /// # Safety
    /// Owning core only.
    pub(crate) unsafe fn snapshot(&self) -> RegisterState {
        unsafe { *self.snapshot.get() }
    }
}

/// Fixed table of [`CoreSlot`]s, no TLS required.
pub struct CoreTable<const N: usize = MAX_CORES> {
    claimed: AtomicUsize,
    slots: [CoreSlot; N],
}

// SAFETY: the UnsafeCells inside a slot are only touched by the core that
// claimed it; everything shared is atomic.
unsafe impl<const N: usize> Sync for CoreTable<N> {}

impl<const N: usize> Default for CoreTable<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> CoreTable<N> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            claimed: AtomicUsize::new(0),
            slots: [const { CoreSlot::EMPTY }; N],
        }
    }

    /// Claims the next free index for `apic_id`. Claiming again with the same
    /// APIC ID returns the existing index.
    pub fn claim(&self, apic_id: u32) -> Option<usize> {
        if let Some(idx) = self.index_of(apic_id) {
            return Some(idx);
        }
        let idx = self.claimed.fetch_add(1, Ordering::AcqRel);
        if idx >= N {
            self.claimed.fetch_sub(1, Ordering::AcqRel);
            return None;
        }
        self.slots[idx].apic_id.store(apic_id, Ordering::Release);
        Some(idx)
    }

    /// Index claimed by `apic_id`.
    pub fn index_of(&self, apic_id: u32) -> Option<usize> {
        let claimed = self.claimed.load(Ordering::Acquire).min(N);
        self.slots[..claimed]
            .iter()
            .position(|s| s.apic_id() == Some(apic_id))
    }

    pub fn slot(&self, index: usize) -> Option<&CoreSlot> {
        self.slots.get(index)
    }

    /// Number of claimed slots.
    pub fn len(&self) -> usize {
        self.claimed.load(Ordering::Acquire).min(N)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claims_are_dense_and_stable() {
        let table: Box<CoreTable<3>> = Box::default();
        assert!(table.is_empty());
        assert_eq!(table.claim(7), Some(0));
        assert_eq!(table.claim(2), Some(1));
        assert_eq!(table.claim(7), Some(0));
        assert_eq!(table.claim(9), Some(2));
        assert_eq!(table.claim(11), None);
        assert_eq!(table.len(), 3);
        assert_eq!(table.index_of(2), Some(1));
        assert_eq!(table.index_of(11), None);
        assert_eq!(table.slot(1).and_then(CoreSlot::apic_id), Some(2));
    }

    #[test]
    fn live_frame_nests() {
        let table: Box<CoreTable<1>> = Box::default();
        let slot = table.slot(0).unwrap();
        let mut outer = InterruptFrame {
            rax: 1,
            ..InterruptFrame::default()
        };
        let mut inner = InterruptFrame {
            rax: 2,
            ..InterruptFrame::default()
        };

        assert!(slot.live().is_null());
        let prev = unsafe { slot.enter(&raw mut outer) };
        assert!(prev.is_null());
        let nested = unsafe { slot.enter(&raw mut inner) };
        assert_eq!(nested, &raw mut outer);
        assert_eq!(unsafe { slot.snapshot() }.rax, 2);

        slot.leave(nested);
        assert_eq!(slot.live(), &raw mut outer);
        slot.leave(prev);
        assert!(slot.live().is_null());
    }
}
