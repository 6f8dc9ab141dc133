//! # Virtual and Physical Memory Address Types
//!
//! Strongly typed wrappers for raw 32-bit memory addresses and page bases used
//! in the paging and physical allocation code.
//!
//! ## Overview
//!
//! The types prevent mixing virtual and physical addresses at compile time
//! while remaining zero-cost wrappers around `u32` values:
//!
//! | Type | Meaning |
//! |------|---------|
//! | [`PhysicalAddress`] / [`PhysicalPage`] | Physical memory (page frames, page tables). |
//! | [`VirtualAddress`] / [`VirtualPage`] | Addresses translated through a page directory. |
//!
//! Pages are always [`PAGE_SIZE`] (4 KiB) large; the two-level translation
//! structure has no huge pages.
//!
//! ## Two-level split
//!
//! A 32-bit virtual address is decoded as:
//!
//! ```text
//! | 31‒22     | 21‒12       | 11‒0   |
//! | directory | table       | offset |
//! ```
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let va = VirtualAddress::new(0x0040_3123);
//! assert_eq!(va.directory_index(), 1);
//! assert_eq!(va.table_index(), 3);
//! assert_eq!(va.offset(), 0x123);
//!
//! let (page, off) = va.split();
//! assert_eq!(page.join(off), va);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(clippy::inline_always)]

mod physical_address;
mod physical_page;
mod virtual_address;
mod virtual_page;

pub use physical_address::PhysicalAddress;
pub use physical_page::PhysicalPage;
pub use virtual_address::VirtualAddress;
pub use virtual_page::VirtualPage;

/// Size of one page (and one page frame) in bytes.
pub const PAGE_SIZE: u32 = 4096;

/// `log2(PAGE_SIZE)`; number of low address bits used as the in-page offset.
pub const PAGE_SHIFT: u32 = 12;

/// Mask selecting the in-page offset bits of an address.
pub const PAGE_OFFSET_MASK: u32 = PAGE_SIZE - 1;

/// Number of entries in a page directory or page table.
pub const ENTRIES_PER_TABLE: usize = 1024;

/// Align `x` down to the nearest multiple of `a`.
///
/// `a` must be a non-zero power of two.
///
/// ```rust
/// # use kernel_memory_addresses::align_down;
/// assert_eq!(align_down(4095, 4096), 0);
/// assert_eq!(align_down(8191, 4096), 4096);
/// ```
#[inline(always)]
#[must_use]
pub const fn align_down(x: u32, a: u32) -> u32 {
    x & !(a - 1)
}

/// Align `x` up to the nearest multiple of `a`, or `None` on overflow.
///
/// `a` must be a non-zero power of two.
///
/// ```rust
/// # use kernel_memory_addresses::align_up;
/// assert_eq!(align_up(1, 4096), Some(4096));
/// assert_eq!(align_up(4096, 4096), Some(4096));
/// assert_eq!(align_up(u32::MAX, 4096), None);
/// ```
#[inline(always)]
#[must_use]
pub const fn align_up(x: u32, a: u32) -> Option<u32> {
    match x.checked_add(a - 1) {
        Some(v) => Some(v & !(a - 1)),
        None => None,
    }
}

/// Number of pages needed to hold `bytes` bytes.
#[inline]
#[must_use]
pub const fn pages_for(bytes: u32) -> u32 {
    bytes.div_ceil(PAGE_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_and_join_virtual() {
        let va = VirtualAddress::new(0xFFC0_1ABC);
        assert_eq!(va.directory_index(), 0x3FF);
        assert_eq!(va.table_index(), 1);
        assert_eq!(va.offset(), 0xABC);

        let (page, off) = va.split();
        assert_eq!(page.base().as_u32(), 0xFFC0_1000);
        assert_eq!(page.join(off), va);
    }

    #[test]
    fn physical_page_frame_numbers() {
        let pp = PhysicalAddress::new(0x0012_3456).page();
        assert_eq!(pp.base().as_u32(), 0x0012_3000);
        assert_eq!(pp.frame_number(), 0x123);
        assert_eq!(PhysicalPage::from_frame_number(0x123), pp);
        assert_eq!(pp.join(0x456).as_u32(), 0x0012_3456);
    }

    #[test]
    fn alignment_helpers() {
        assert_eq!(align_down(0x1FFF, PAGE_SIZE), 0x1000);
        assert_eq!(align_up(0x1001, PAGE_SIZE), Some(0x2000));
        assert_eq!(pages_for(0), 0);
        assert_eq!(pages_for(1), 1);
        assert_eq!(pages_for(PAGE_SIZE + 1), 2);
    }

    #[test]
    fn page_base_is_aligned_and_address_is_not() {
        let pa = PhysicalAddress::new(0x2001);
        assert!(!pa.is_page_aligned());
        assert!(pa.page().base().is_page_aligned());
        assert_eq!(pa.offset(), 1);
    }
}
