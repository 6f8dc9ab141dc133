use crate::RawLock;
use core::cell::UnsafeCell;
use core::fmt;
use core::ops::{Deref, DerefMut};

/// A value guarded by a raw lock word `R`.
///
/// The lock itself never touches the interrupt flag; see
/// [`lock_irq`](Mutex::lock_irq) for the interrupt-safe acquisition.
pub struct Mutex<T, R: RawLock> {
    raw: R,
    value: UnsafeCell<T>,
}

// SAFETY: access to `value` is serialized by `raw`.
unsafe impl<T: Send, R: RawLock + Sync> Sync for Mutex<T, R> {}

impl<T, R: RawLock> Mutex<T, R> {
    #[must_use]
    pub const fn with_raw(raw: R, value: T) -> Self {
        Self {
            raw,
            value: UnsafeCell::new(value),
        }
    }

    /// Blocks until the lock is held.
    #[inline]
    pub fn lock(&self) -> MutexGuard<'_, T, R> {
        self.raw.lock();
        // SAFETY: the lock was just taken.
        unsafe { MutexGuard::new(&self.raw, &self.value) }
    }

    #[inline]
    #[must_use]
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T, R>> {
        self.raw
            .try_lock()
            // SAFETY: `try_lock` succeeded.
            .then(|| unsafe { MutexGuard::new(&self.raw, &self.value) })
    }

    /// Snapshot of the lock state; only meaningful for diagnostics.
    #[inline]
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.raw.is_locked()
    }

    /// Exclusive access without locking; `&mut self` rules out contention.
    #[inline]
    pub const fn get_mut(&mut self) -> &mut T {
        self.value.get_mut()
    }
}

impl<T, R: RawLock> fmt::Debug for Mutex<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mutex")
            .field("locked", &self.is_locked())
            .finish_non_exhaustive()
    }
}

/// Exclusive access to the value of a [`Mutex`]; unlocks on drop.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct MutexGuard<'a, T, R: RawLock> {
    raw: &'a R,
    value: &'a mut T,
}

impl<'a, T, R: RawLock> MutexGuard<'a, T, R> {
    /// # Safety
    /// `raw` must be held by the caller, and it must guard `value`.
    unsafe fn new(raw: &'a R, value: &'a UnsafeCell<T>) -> Self {
        Self {
            raw,
            value: unsafe { &mut *value.get() },
        }
    }
}

impl<T, R: RawLock> Deref for MutexGuard<'_, T, R> {
    type Target = T;

    fn deref(&self) -> &T {
        self.value
    }
}

impl<T, R: RawLock> DerefMut for MutexGuard<'_, T, R> {
    fn deref_mut(&mut self) -> &mut T {
        self.value
    }
}

impl<T, R: RawLock> Drop for MutexGuard<'_, T, R> {
    fn drop(&mut self) {
        // SAFETY: a guard exists only while its lock is held.
        unsafe { self.raw.unlock() }
    }
}
