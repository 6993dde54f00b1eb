//! # Kernel synchronization primitives
//!
//! A small set of spin-based primitives shared by every core:
//!
//! * [`Mutex`] over a pluggable raw lock ([`RawSpin`]), with RAII guards.
//! * [`irq`]: save/disable/restore of the local interrupt flag and the
//!   [`IrqMutex`] guard returned by [`Mutex::lock_irq`], which keeps a
//!   critical section atomic with respect to the current core's interrupt
//!   handlers as well as to other cores.
//! * [`SyncOnceCell`] for publishing state built during single-threaded boot.
//!
//! On hosted targets the interrupt flag is emulated so the same code paths
//! can run under `cargo test`.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod irq;
mod mutex;
mod raw_spin;
mod sync_once_cell;

pub use irq::{InterruptState, IrqGuard, IrqMutex};
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
    fn raw_is_locked(&self) -> bool;
}

pub trait RawUnlock {
    /// # Safety
    /// The caller must currently hold the lock.
    unsafe fn raw_unlock(&self);
}
