use crate::{Mutex, MutexGuard, RawLock};
use core::ops::{Deref, DerefMut};

/// Bit 9 of `EFLAGS`/`RFLAGS`: maskable interrupts enabled.
const IF_BIT: usize = 1 << 9;

/// Access to the maskable-interrupt flag of the executing CPU.
///
/// The memory core only ever needs two operations: read the current state
/// and switch it. Kernel code uses [`CpuInterrupts`]; tests use a recording
/// implementation.
pub trait InterruptControl {
    /// Returns whether maskable interrupts are currently enabled.
    fn interrupts_enabled(&self) -> bool;

    /// Enables (`true`) or disables (`false`) maskable interrupts.
    fn set_interrupt_state(&self, enabled: bool);
}

impl<T: InterruptControl + ?Sized> InterruptControl for &T {
    #[inline]
    fn interrupts_enabled(&self) -> bool {
        (**self).interrupts_enabled()
    }

    #[inline]
    fn set_interrupt_state(&self, enabled: bool) {
        (**self).set_interrupt_state(enabled);
    }
}

/// The executing CPU's interrupt flag, driven by `cli`/`sti`.
///
/// # Safety & Privilege
///
/// These operations must run in a context where `cli`/`sti` are legal
/// (ring 0). Calling from user space raises `#GP`.
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
#[derive(Copy, Clone, Debug, Default)]
pub struct CpuInterrupts;

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
impl InterruptControl for CpuInterrupts {
    #[inline]
    fn interrupts_enabled(&self) -> bool {
        cpu_flags() & IF_BIT != 0
    }

    #[inline]
    fn set_interrupt_state(&self, enabled: bool) {
        if enabled {
            unsafe { core::arch::asm!("sti", options(nomem, nostack, preserves_flags)) }
        } else {
            unsafe { core::arch::asm!("cli", options(nomem, nostack, preserves_flags)) }
        }
    }
}

/// Returns the current `EFLAGS` value (via `pushfd/pop`).
#[cfg(target_arch = "x86")]
#[inline]
fn cpu_flags() -> usize {
    let r: usize;
    unsafe { core::arch::asm!("pushfd; pop {}", out(reg) r, options(nomem, preserves_flags)) }
    r
}

/// Returns the current `RFLAGS` value (via `pushfq/pop`).
#[cfg(target_arch = "x86_64")]
#[inline]
fn cpu_flags() -> usize {
    let r: usize;
    unsafe { core::arch::asm!("pushfq; pop {}", out(reg) r, options(nomem, preserves_flags)) }
    r
}

/// RAII guard that disables interrupts on creation and restores them on drop.
///
/// `IrqGuard::new()` snapshots the interrupt flag. If interrupts were enabled,
/// it disables them. On drop, it re-enables them **only** if they were
/// previously enabled, so a nested guard never undoes an outer one.
///
/// # Examples
///
/// ```
/// use core::cell::Cell;
/// use kernel_sync::{InterruptControl, IrqGuard};
///
/// struct Flag(Cell<bool>);
/// impl InterruptControl for Flag {
///     fn interrupts_enabled(&self) -> bool { self.0.get() }
///     fn set_interrupt_state(&self, enabled: bool) { self.0.set(enabled) }
/// }
///
/// let irq = Flag(Cell::new(true));
/// {
///     let _g = IrqGuard::new(&irq);
///     assert!(!irq.interrupts_enabled());
/// }
/// assert!(irq.interrupts_enabled());
/// ```
#[must_use = "interrupts are restored as soon as the guard is dropped"]
pub struct IrqGuard<'a, I: InterruptControl> {
    irq: &'a I,
    /// Whether interrupts were enabled when the guard was created.
    were_enabled: bool,
}

impl<'a, I: InterruptControl> IrqGuard<'a, I> {
    /// Disables interrupts if they are currently enabled and remembers the state.
    #[inline]
    pub fn new(irq: &'a I) -> Self {
        let enabled = irq.interrupts_enabled();
        if enabled {
            irq.set_interrupt_state(false);
        }
        Self {
            irq,
            were_enabled: enabled,
        }
    }

    /// Whether interrupts will be re-enabled when this guard drops.
    #[inline]
    #[must_use]
    pub const fn restores_interrupts(&self) -> bool {
        self.were_enabled
    }
}

impl<I: InterruptControl> Drop for IrqGuard<'_, I> {
    fn drop(&mut self) {
        if self.were_enabled {
            self.irq.set_interrupt_state(true);
        }
    }
}

/// A mutex guard that also disables interrupts while held.
///
/// Created via [`Mutex::lock_irq`], it:
///
/// 1. saves the current interrupt state and disables interrupts, and
/// 2. acquires the underlying mutex,
///
/// releasing them in reverse order on drop: the lock first, then the saved
/// interrupt state. An interrupt handler therefore never observes the
/// protected value mid-update on this CPU.
pub struct IrqMutex<'a, T, R: RawLock, I: InterruptControl> {
    // field order is drop order: unlock before restoring interrupts
    guard: MutexGuard<'a, T, R>,
    _irq: IrqGuard<'a, I>,
}

impl<T, R: RawLock> Mutex<T, R> {
    /// Acquires the mutex with interrupts disabled for the guard's lifetime.
    #[inline]
    #[must_use]
    pub fn lock_irq<'a, I: InterruptControl>(&'a self, irq: &'a I) -> IrqMutex<'a, T, R, I> {
        let ig = IrqGuard::new(irq);
        let guard = self.lock();
        IrqMutex { guard, _irq: ig }
    }
}

impl<T, R: RawLock, I: InterruptControl> Deref for IrqMutex<'_, T, R, I> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T, R: RawLock, I: InterruptControl> DerefMut for IrqMutex<'_, T, R, I> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}
