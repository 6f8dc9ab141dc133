use crate::{PAGE_OFFSET_MASK, PAGE_SHIFT, VirtualPage};
use core::fmt;
use core::ops::{Add, AddAssign};

/// Bit position of the page-directory index in a virtual address.
const DIRECTORY_SHIFT: u32 = 22;

/// Mask of a 10-bit directory/table index.
const INDEX_MASK: u32 = 0x3FF;

/// Virtual memory address.
///
/// Denotes addresses that are translated through a page directory. The
/// translation walk uses [`directory_index`](Self::directory_index) (bits
/// `31..=22`), [`table_index`](Self::table_index) (bits `21..=12`) and the
/// in-page [`offset`](Self::offset) (bits `11..=0`).
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualAddress(pub(crate) u32);

impl VirtualAddress {
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }

    #[inline]
    #[must_use]
    pub const fn new(v: u32) -> Self {
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Index of the page-directory entry covering this address (`0..1024`).
    #[inline]
    #[must_use]
    pub const fn directory_index(self) -> usize {
        ((self.0 >> DIRECTORY_SHIFT) & INDEX_MASK) as usize
    }

    /// Index of the page-table entry covering this address (`0..1024`).
    #[inline]
    #[must_use]
    pub const fn table_index(self) -> usize {
        ((self.0 >> PAGE_SHIFT) & INDEX_MASK) as usize
    }

    /// The offset of this address within its page.
    #[inline]
    #[must_use]
    pub const fn offset(self) -> u32 {
        self.0 & PAGE_OFFSET_MASK
    }

    /// The page containing this address.
    #[inline]
    #[must_use]
    pub const fn page(self) -> VirtualPage {
        VirtualPage::containing_address(self)
    }

    #[inline]
    #[must_use]
    pub const fn split(self) -> (VirtualPage, u32) {
        (self.page(), self.offset())
    }

    #[inline]
    #[must_use]
    pub const fn is_page_aligned(self) -> bool {
        self.offset() == 0
    }

    #[inline]
    #[must_use]
    pub const fn checked_add(self, rhs: u32) -> Option<Self> {
        match self.0.checked_add(rhs) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }
}

impl fmt::Debug for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VA(0x{:08X})", self.0)
    }
}

impl fmt::Display for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

impl From<u32> for VirtualAddress {
    #[inline]
    fn from(v: u32) -> Self {
        Self::new(v)
    }
}

impl From<VirtualPage> for VirtualAddress {
    #[inline]
    fn from(value: VirtualPage) -> Self {
        value.base()
    }
}

impl Add<u32> for VirtualAddress {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u32) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl AddAssign<u32> for VirtualAddress {
    #[inline]
    fn add_assign(&mut self, rhs: u32) {
        self.0 += rhs;
    }
}
