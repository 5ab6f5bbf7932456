//! # Kernel synchronization primitives
//!
//! Everything the early-boot core shares between cores or between a core and
//! its own interrupt handlers goes through the types in here:
//!
//! * [`SpinMutex`] for short critical sections,
//! * [`Mutex::lock_irq`] for critical sections that interrupt handlers may also
//!   enter (interrupts are masked on the local core while the guard lives),
//! * [`SyncOnceCell`] for data that is published once during boot and read-only
//!   afterwards.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod irq;
mod mutex;
mod raw_spin;
mod sync_once_cell;

pub use irq::{IrqGuard, IrqMutex};
pub use mutex::{Mutex, MutexGuard};
pub use raw_spin::RawSpin;
pub use sync_once_cell::SyncOnceCell;

pub type SpinMutex<T> = Mutex<T, RawSpin>;

impl<T> SpinMutex<T> {
    pub const fn new(value: T) -> Self {
        Self::from_raw(RawSpin::new(), value)
    }
}

pub trait RawLock {
    fn raw_lock(&self);
    fn raw_try_lock(&self) -> bool;
}

pub trait RawUnlock {
    unsafe fn raw_unlock(&self);
}
