//! Test-and-test-and-set spinlock backing [`SpinMutex`](crate::SpinMutex).

use crate::{RawLock, RawUnlock};
use core::hint::spin_loop;
use core::sync::atomic::{AtomicBool, Ordering};

/// A one-flag spinlock.
///
/// Waiters spin on a relaxed load and only retry the `swap` once the flag
/// reads clear, so a contended lock keeps its cache line shared. Not fair:
/// a core that just released may win again. Callers that can be preempted
/// by an interrupt handler taking the same lock go through
/// [`Mutex::lock_irq`](crate::Mutex::lock_irq).
pub struct RawSpin {
    held: AtomicBool,
}

impl Default for RawSpin {
    fn default() -> Self {
        Self::new()
    }
}

impl RawSpin {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            held: AtomicBool::new(false),
        }
    }

    /// Spins until the lock is acquired.
    #[inline]
    pub fn lock(&self) {
        while self.held.swap(true, Ordering::Acquire) {
            while self.held.load(Ordering::Relaxed) {
                spin_loop();
            }
        }
    }

    /// Acquires the lock if it is free.
    #[inline]
    pub fn try_lock(&self) -> bool {
        !self.held.swap(true, Ordering::Acquire)
    }

    /// Snapshot of the flag; only meaningful for diagnostics.
    #[inline]
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.held.load(Ordering::Relaxed)
    }

    /// # Safety
    /// The caller must hold the lock.
    #[inline]
    pub unsafe fn unlock(&self) {
        self.held.store(false, Ordering::Release);
    }
}

impl RawLock for RawSpin {
    fn raw_lock(&self) {
        self.lock();
    }

    fn raw_try_lock(&self) -> bool {
        self.try_lock()
    }
}

impl RawUnlock for RawSpin {
    unsafe fn raw_unlock(&self) {
        unsafe { self.unlock() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn try_lock_fails_while_held() {
        let raw = RawSpin::new();
        assert!(raw.try_lock());
        assert!(raw.is_locked());
        assert!(!raw.try_lock());

        unsafe { raw.unlock() };
        assert!(!raw.is_locked());
        assert!(raw.try_lock());
    }

    #[test]
    fn waiter_proceeds_after_release() {
        let raw = Arc::new(RawSpin::new());
        raw.lock();

        let waiter = {
            let raw = Arc::clone(&raw);
            thread::spawn(move || {
                raw.lock();
                unsafe { raw.unlock() };
            })
        };

        thread::sleep(std::time::Duration::from_millis(10));
        assert!(!waiter.is_finished());
        unsafe { raw.unlock() };
        waiter.join().unwrap();
        assert!(!raw.is_locked());
    }
}
