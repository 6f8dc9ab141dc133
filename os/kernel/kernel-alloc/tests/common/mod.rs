#![allow(dead_code)]

use kernel_memory_addresses::{PhysicalAddress, PhysicalPage};
use kernel_sync::InterruptControl;
use kernel_vmem::{PagingControl, PhysMapper};
use std::cell::{Cell, RefCell, UnsafeCell};

/// Start of the simulated physical heap.
pub const HEAP: u32 = 0x0020_0000;

/// A 4 KiB-aligned raw frame.
#[repr(align(4096))]
struct Aligned4K([u8; 4096]);

/// Simulated physical memory covering `[base, base + frames * 4096)`.
///
/// Frames start out filled with `0xA5` so tests notice missing clears.
pub struct TestRam {
    base: u32,
    frames: Box<[UnsafeCell<Aligned4K>]>,
}

impl TestRam {
    pub fn new(base: u32, frames: usize) -> Self {
        let frames = (0..frames)
            .map(|_| UnsafeCell::new(Aligned4K([0xA5; 4096])))
            .collect();
        Self { base, frames }
    }

    fn frame(&self, pa: PhysicalAddress) -> &UnsafeCell<Aligned4K> {
        let index = (pa.as_u32() - self.base) as usize >> 12;
        &self.frames[index]
    }

    /// Copy of the page at `page`.
    pub fn page_bytes(&self, page: PhysicalPage) -> Vec<u8> {
        unsafe { (*self.frame(page.base()).get()).0.to_vec() }
    }
}

impl PhysMapper for TestRam {
    fn phys_to_ptr(&self, pa: PhysicalAddress) -> *mut u8 {
        self.frame(pa)
            .get()
            .cast::<u8>()
            .wrapping_add(pa.offset() as usize)
    }
}

/// Interrupt flag that records every transition.
#[derive(Default)]
pub struct RecordingIrq {
    enabled: Cell<bool>,
    pub transitions: RefCell<Vec<bool>>,
}

impl RecordingIrq {
    pub fn enabled() -> Self {
        let irq = Self::default();
        irq.enabled.set(true);
        irq
    }
}

impl InterruptControl for RecordingIrq {
    fn interrupts_enabled(&self) -> bool {
        self.enabled.get()
    }

    fn set_interrupt_state(&self, enabled: bool) {
        self.enabled.set(enabled);
        self.transitions.borrow_mut().push(enabled);
    }
}

/// Records the roots it is asked to activate.
#[derive(Default)]
pub struct RecordingPaging {
    pub activated: RefCell<Vec<PhysicalPage>>,
}

impl PagingControl for RecordingPaging {
    unsafe fn activate(&self, root: PhysicalPage) {
        self.activated.borrow_mut().push(root);
    }
}
