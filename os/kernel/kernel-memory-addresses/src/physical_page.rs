use crate::{PAGE_OFFSET_MASK, PAGE_SHIFT, PAGE_SIZE, PhysicalAddress};
use core::fmt;

/// Physical page base (a page frame).
///
/// ### Invariants
/// - The low 12 bits of the base are always zero.
///
/// ### Examples
/// ```rust
/// # use kernel_memory_addresses::*;
/// let pa = PhysicalAddress::new(0x0081_2345);
/// let pp = pa.page();
/// assert!(pp.base().is_page_aligned());
/// assert_eq!(pp.join(pa.offset()), pa);
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalPage(PhysicalAddress);

impl PhysicalPage {
    /// Page that contains `pa` (aligns down).
    #[inline]
    #[must_use]
    pub const fn from_addr(pa: PhysicalAddress) -> Self {
        Self(PhysicalAddress(pa.0 & !PAGE_OFFSET_MASK))
    }

    #[inline]
    #[must_use]
    pub const fn from_frame_number(frame: u32) -> Self {
        Self(PhysicalAddress(frame << PAGE_SHIFT))
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> PhysicalAddress {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn frame_number(self) -> u32 {
        self.0.0 >> PAGE_SHIFT
    }

    /// Combine this base with an in-page offset.
    #[inline]
    #[must_use]
    pub const fn join(self, offset: u32) -> PhysicalAddress {
        debug_assert!(offset < PAGE_SIZE, "offset must be < page size");
        PhysicalAddress(self.0.0 | (offset & PAGE_OFFSET_MASK))
    }
}

impl fmt::Display for PhysicalPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for PhysicalPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysicalPage(0x{:08X})", self.0.0)
    }
}
