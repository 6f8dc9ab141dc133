//! # Virtual Memory Support
//!
//! 32-bit x86 two-level paging for the kernel and its processes.
//!
//! ## What you get
//! - An [`AddressSpace`] handle rooted at a [`PageDirectory`].
//! - Bit-exact [`PageEntryBits`] and caller-facing [`PageFlags`].
//! - 4 KiB-aligned [`PageDirectory`] / [`PageTable`] wrappers and index types.
//! - The seams the manager runs through: [`FrameAlloc`] for table frames,
//!   [`PhysMapper`] to reach them, [`PagingControl`] to activate a space.
//!
//! ## Virtual Address → Physical Address Walk
//!
//! ```text
//! | 31‒22     | 21‒12 | 11‒0   |
//! | directory | table | offset |
//! ```
//!
//! ```text
//!  CR3 → Page Directory ─PDE─► Page Table ─PTE─► 4 KiB frame
//! ```
//!
//! Each level holds 1024 entries of 32 bits. An entry's low 12 bits are
//! flags, the high 20 bits the frame number. The presence bit must be checked
//! before the frame is used.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code, clippy::inline_always)]

pub mod address_space;
mod page_entry_bits;
pub mod page_table;

pub use crate::address_space::{AddressSpace, RootPage};
pub use crate::page_entry_bits::{PageEntryBits, PageFlags};
pub use crate::page_table::pd::{DirectoryIndex, PageDirectory, PdEntry};
pub use crate::page_table::pt::{PageTable, PtEntry, TableIndex};

/// Re-export constants as info module.
pub use kernel_info::memory as info;

use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, VirtualAddress};

/// Errors of address-space construction and mapping.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum VmemError {
    /// No physical frame was available for a directory or table.
    #[error("out of physical memory for a paging structure")]
    OutOfMemory,

    /// The requested run of pages wraps past the end of the address space.
    #[error("{pages} pages starting at {start} exceed the 4 GiB address space")]
    RangeOverflow { start: VirtualAddress, pages: u32 },
}

/// Source of **physical** 4 KiB frames for directories and tables.
///
/// Takes `&self`: allocators shared across address spaces lock internally.
/// Frame contents are unspecified; the address space clears what it
/// allocates.
pub trait FrameAlloc {
    /// Allocate one 4 KiB frame, or `None` when memory is exhausted.
    fn alloc_4k(&self) -> Option<PhysicalPage>;

    /// Return a frame obtained from [`alloc_4k`](Self::alloc_4k).
    fn free_4k(&self, page: PhysicalPage);
}

/// Converts physical addresses to usable pointers in the current virtual
/// address space (identity map in this kernel; simulated RAM in tests).
///
/// A physically contiguous range must be virtually contiguous too.
pub trait PhysMapper {
    /// Convert a *physical* address to a pointer usable by the CPU.
    fn phys_to_ptr(&self, pa: PhysicalAddress) -> *mut u8;

    /// Convert a *physical* address to a usable mutable reference.
    ///
    /// # Safety
    /// - `pa` must be mapped writable in the current page tables.
    /// - Type `T` must match the bytes at `pa` and fit in the mapping.
    /// - The caller must not create aliasing mutable references.
    #[inline]
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        unsafe { &mut *self.phys_to_ptr(pa).cast::<T>() }
    }
}

/// The hardware activation primitive.
pub trait PagingControl {
    /// Load `root` as the active page directory and make sure paging is on.
    ///
    /// # Safety
    /// The directory must map the executing code and stack.
    unsafe fn activate(&self, root: RootPage);
}
