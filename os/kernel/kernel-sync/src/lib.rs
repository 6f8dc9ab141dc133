//! # Kernel synchronization primitives
//!
//! A spin-based [`Mutex`] and the interrupt-masking guard the physical
//! allocator uses for its critical section. Interrupt control goes through
//! the [`InterruptControl`] seam so the locking discipline can be exercised
//! on the host with a recording implementation.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod irq;
mod mutex;
mod raw_spin;

pub use irq::{InterruptControl, IrqGuard, IrqMutex};
pub use mutex::{Mutex, MutexGuard};
pub use raw_spin::RawSpin;

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub use irq::CpuInterrupts;

/// The lock the memory core uses.
pub type SpinMutex<T> = Mutex<T, RawSpin>;

impl<T> SpinMutex<T> {
    #[must_use]
    pub const fn new(value: T) -> Self {
        Self::with_raw(RawSpin::new(), value)
    }
}

/// A raw mutual-exclusion word without associated data.
///
/// # Safety
/// Implementations must grant the lock to at most one holder at a time, with
/// acquire ordering on `lock`/`try_lock` and release ordering on `unlock`.
pub unsafe trait RawLock {
    /// Blocks until the lock is held.
    fn lock(&self);

    /// Takes the lock if it is free; `true` on success.
    fn try_lock(&self) -> bool;

    /// # Safety
    /// The caller must currently hold the lock.
    unsafe fn unlock(&self);

    /// Whether the lock is currently held by anyone.
    fn is_locked(&self) -> bool;
}
