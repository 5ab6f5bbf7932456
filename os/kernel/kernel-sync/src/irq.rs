use crate::{Mutex, MutexGuard, RawLock, RawUnlock};
use core::ops::{Deref, DerefMut};

/// A [`MutexGuard`] paired with an [`IrqGuard`].
///
/// Taken through [`Mutex::lock_irq`]: interrupts go off before the lock is
/// acquired and come back (if they were on) after it is released, so a
/// handler on the same core can never spin on a lock its own core holds.
///
/// ```no_run
/// use kernel_sync::SpinMutex;
///
/// static ROUTES: SpinMutex<[u8; 4]> = SpinMutex::new([0; 4]);
///
/// ROUTES.with_lock_irq(|r| r[1] = 0x21);
/// ```
pub struct IrqMutex<'a, T, R: RawLock + RawUnlock> {
    // Field order matters: the mutex is released before interrupts come back.
    g: MutexGuard<'a, T, R>,
    _irq: IrqGuard,
}

impl<T, R: RawLock + RawUnlock> Mutex<T, R> {
    /// Acquires the mutex with interrupts disabled for the guard's lifetime.
    #[inline]
    pub fn lock_irq(&self) -> IrqMutex<'_, T, R> {
        let ig = IrqGuard::new();
        let g = self.lock();
        IrqMutex { _irq: ig, g }
    }

    /// Runs `f` inside [`lock_irq`](Self::lock_irq) and returns its result.
    #[inline]
    pub fn with_lock_irq<U>(&self, f: impl FnOnce(&mut T) -> U) -> U {
        let mut guard = self.lock_irq();
        f(&mut guard)
    }
}

impl<T, R: RawLock + RawUnlock> Deref for IrqMutex<'_, T, R> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.g
    }
}

impl<T, R: RawLock + RawUnlock> DerefMut for IrqMutex<'_, T, R> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.g
    }
}

/// Bit 9 of `RFLAGS`: maskable interrupts enabled.
pub const RFLAGS_IF: u64 = 1 << 9;

/// Disables hardware interrupts (`cli`).
///
/// # Platform
///
/// `x86/x86_64` on bare metal. Hosted builds (unit tests) flip an emulated
/// flag instead so the guards can be exercised without privilege.
///
/// # Safety & Privilege
///
/// Must only be called in contexts where `cli` is permitted. Misuse can
/// hang the system or violate execution environment rules.
#[inline]
pub fn cli_stop_interrupts() {
    #[cfg(target_os = "none")]
    unsafe {
        core::arch::asm!("cli", options(nomem, nostack, preserves_flags));
    }
    #[cfg(not(target_os = "none"))]
    hosted::set_enabled(false);
}

/// Enables hardware interrupts (`sti`).
///
/// # Platform
///
/// `x86/x86_64` on bare metal; emulated on hosted builds.
///
/// # Safety & Privilege
///
/// Must only be called in contexts where `sti` is permitted. Typically used
/// to restore a previously disabled interrupt state.
#[inline]
pub fn sti_enable_interrupts() {
    #[cfg(target_os = "none")]
    unsafe {
        core::arch::asm!("sti", options(nomem, nostack, preserves_flags));
    }
    #[cfg(not(target_os = "none"))]
    hosted::set_enabled(true);
}

/// Returns the current `RFLAGS` value (via `pushfq/pop`).
///
/// Bit 9 (`IF`) indicates whether interrupts are enabled. On hosted builds
/// only the emulated `IF` bit is reported.
#[inline]
#[must_use]
pub fn rflags() -> u64 {
    #[cfg(target_os = "none")]
    {
        let r: u64;
        unsafe {
            core::arch::asm!("pushfq; pop {}", out(reg) r, options(nostack, preserves_flags));
        }
        r
    }
    #[cfg(not(target_os = "none"))]
    {
        if hosted::enabled() { RFLAGS_IF } else { 0 }
    }
}

/// Whether maskable interrupts are currently enabled on this core.
#[inline]
#[must_use]
pub fn interrupts_enabled() -> bool {
    rflags() & RFLAGS_IF != 0
}

#[cfg(not(target_os = "none"))]
mod hosted {
    use core::sync::atomic::{AtomicBool, Ordering};

    static IF: AtomicBool = AtomicBool::new(true);

    pub fn enabled() -> bool {
        IF.load(Ordering::SeqCst)
    }

    pub fn set_enabled(on: bool) {
        IF.store(on, Ordering::SeqCst);
    }
}

/// Disables interrupts on creation and restores the previous `IF` state on
/// drop. Nests: an inner guard created with interrupts already off is a
/// no-op.
pub struct IrqGuard {
    /// Whether interrupts were enabled (IF=1) when the guard was created.
    were_enabled: bool,
}

impl Default for IrqGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl IrqGuard {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        let enabled = interrupts_enabled();
        if enabled {
            cli_stop_interrupts();
        }
        Self {
            were_enabled: enabled,
        }
    }
}

impl Drop for IrqGuard {
    fn drop(&mut self) {
        if self.were_enabled {
            sti_enable_interrupts();
        }
    }
}
