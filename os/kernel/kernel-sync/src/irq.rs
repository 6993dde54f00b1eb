//! # Local interrupt masking
//!
//! [`save_and_disable`] snapshots the current core's interrupt-enable flag and
//! masks interrupts; [`restore`] puts back exactly the snapshotted state. The
//! pair is wrapped by [`IrqGuard`] (RAII) and by [`Mutex::lock_irq`], which
//! combines it with a lock acquisition.
//!
//! # Platform
//!
//! On bare-metal `x86_64` (`target_os = "none"`) this uses `pushfq/pop`,
//! `cli` and `sti` and must run at CPL0. Every other target operates on an
//! emulated flag, which lets the allocator and its tests exercise the same
//! save/restore discipline in a hosted process.

use crate::{Mutex, MutexGuard, RawLock, RawUnlock};
use core::ops::{Deref, DerefMut};

/// Interrupt-enable state captured by [`save_and_disable`].
///
/// Handing it back to [`restore`] re-enables interrupts only if they were
/// enabled at the time of the snapshot.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[must_use = "dropping the state loses the interrupt flag that must be restored"]
pub struct InterruptState {
    were_enabled: bool,
}

impl InterruptState {
    /// Whether interrupts were enabled (IF=1) when the snapshot was taken.
    #[inline]
    #[must_use]
    pub const fn were_enabled(self) -> bool {
        self.were_enabled
    }
}

/// Returns whether interrupts are currently enabled on this core.
#[inline]
#[must_use]
pub fn interrupts_enabled() -> bool {
    arch::interrupts_enabled()
}

/// Disables interrupts on this core and returns the previous state.
#[inline]
pub fn save_and_disable() -> InterruptState {
    let were_enabled = arch::interrupts_enabled();
    if were_enabled {
        arch::disable();
    }
    InterruptState { were_enabled }
}

/// Restores the interrupt state captured by [`save_and_disable`].
#[inline]
pub fn restore(state: InterruptState) {
    if state.were_enabled {
        arch::enable();
    }
}

#[cfg(all(target_arch = "x86_64", target_os = "none"))]
pub use arch::{cli_stop_interrupts, rflags, sti_enable_interrupts};

#[cfg(all(target_arch = "x86_64", target_os = "none"))]
mod arch {
    /// `RFLAGS.IF`
    const RFLAGS_IF: u64 = 1 << 9;

    /// Disables hardware interrupts (`cli`).
    #[inline]
    pub fn cli_stop_interrupts() {
        unsafe { core::arch::asm!("cli", options(nomem, nostack, preserves_flags)) }
    }

    /// Enables hardware interrupts (`sti`).
    #[inline]
    pub fn sti_enable_interrupts() {
        unsafe { core::arch::asm!("sti", options(nomem, nostack, preserves_flags)) }
    }

    /// Returns the current `RFLAGS` value (via `pushfq/pop`).
    #[inline]
    #[must_use]
    pub fn rflags() -> u64 {
        let r: u64;
        unsafe { core::arch::asm!("pushfq; pop {}", out(reg) r, options(nostack, preserves_flags)) }
        r
    }

    #[inline]
    pub(super) fn interrupts_enabled() -> bool {
        rflags() & RFLAGS_IF != 0
    }

    #[inline]
    pub(super) fn disable() {
        cli_stop_interrupts();
    }

    #[inline]
    pub(super) fn enable() {
        sti_enable_interrupts();
    }
}

#[cfg(not(all(target_arch = "x86_64", target_os = "none")))]
mod arch {
    use core::sync::atomic::{AtomicBool, Ordering};

    /// Emulated interrupt flag for hosted builds. Starts enabled, like a core
    /// that has finished early boot.
    static EMULATED_IF: AtomicBool = AtomicBool::new(true);

    #[inline]
    pub(super) fn interrupts_enabled() -> bool {
        EMULATED_IF.load(Ordering::SeqCst)
    }

    #[inline]
    pub(super) fn disable() {
        EMULATED_IF.store(false, Ordering::SeqCst);
    }

    #[inline]
    pub(super) fn enable() {
        EMULATED_IF.store(true, Ordering::SeqCst);
    }
}

/// RAII guard that disables interrupts on creation and restores them on drop.
///
/// # Examples
///
/// ```
/// use kernel_sync::irq::{IrqGuard, interrupts_enabled};
///
/// let before = interrupts_enabled();
/// {
///     let _g = IrqGuard::new();
///     assert!(!interrupts_enabled());
/// }
/// assert_eq!(interrupts_enabled(), before);
/// ```
#[derive(Debug)]
pub struct IrqGuard {
    state: InterruptState,
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
        Self {
            state: save_and_disable(),
        }
    }

    /// The state that will be restored when this guard is dropped.
    #[inline]
    pub const fn saved(&self) -> InterruptState {
        self.state
    }
}

impl Drop for IrqGuard {
    fn drop(&mut self) {
        restore(self.state);
    }
}

/// A mutex guard that also keeps interrupts disabled while held.
///
/// Created by [`Mutex::lock_irq`]. Interrupts are masked *before* the lock is
/// taken and restored only *after* it is released, so an interrupt handler on
/// this core can never spin on a lock its own core holds.
pub struct IrqMutex<'a, T, R: RawLock + RawUnlock> {
    // Field order is drop order: unlock first, then restore interrupts.
    guard: MutexGuard<'a, T, R>,
    irq: IrqGuard,
}

impl<T, R: RawLock + RawUnlock> IrqMutex<'_, T, R> {
    /// The interrupt state that will be restored on release.
    #[inline]
    pub const fn saved_state(&self) -> InterruptState {
        self.irq.saved()
    }
}

impl<T, R: RawLock + RawUnlock> Deref for IrqMutex<'_, T, R> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T, R: RawLock + RawUnlock> DerefMut for IrqMutex<'_, T, R> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T, R: RawLock + RawUnlock> Mutex<T, R> {
    /// Acquires the mutex with interrupts disabled for the guard's lifetime.
    #[inline]
    pub fn lock_irq(&self) -> IrqMutex<'_, T, R> {
        let irq = IrqGuard::new();
        let guard = self.lock();
        IrqMutex { guard, irq }
    }

    /// Closure convenience over [`lock_irq`](Self::lock_irq).
    #[inline]
    pub fn with_lock_irq<U>(&self, f: impl FnOnce(&mut T) -> U) -> U {
        let mut g = self.lock_irq();
        f(&mut g)
    }
}
