//! # Page Table (second level)
//!
//! - [`TableIndex`]: index type for virtual-address bits `[21:12]`.
//! - [`PtEntry`]: a table entry mapping one 4 KiB page.
//! - [`PageTable`]: a 4 KiB-aligned array of 1024 entries.
//!
//! After modifying active mappings the caller is responsible for any TLB
//! maintenance.

use crate::{PageEntryBits, PageFlags};
use kernel_memory_addresses::{ENTRIES_PER_TABLE, PhysicalPage, VirtualAddress};

/// Index into a page table (VA bits `[21:12]`), range `0..1024`.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TableIndex(u16);

/// A single page-table entry (PTE).
#[doc(alias = "PTE")]
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PtEntry(PageEntryBits);

/// A page table: 1024 entries, 4 KiB-aligned.
#[doc(alias = "PT")]
#[repr(C, align(4096))]
pub struct PageTable {
    entries: [PtEntry; ENTRIES_PER_TABLE],
}

impl TableIndex {
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from(va: VirtualAddress) -> Self {
        Self::new(va.table_index() as u16)
    }

    /// ### Debug assertions
    /// - Asserts `v < 1024` in debug builds.
    #[inline]
    #[must_use]
    pub const fn new(v: u16) -> Self {
        debug_assert!((v as usize) < ENTRIES_PER_TABLE);
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl PtEntry {
    /// Create a zero (non-present) entry.
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self(PageEntryBits::new())
    }

    #[inline]
    #[must_use]
    pub const fn is_present(self) -> bool {
        self.0.present()
    }

    /// Expose the underlying bitfield.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> PageEntryBits {
        self.0
    }

    /// The flag bits of this entry with the frame stripped.
    #[inline]
    #[must_use]
    pub const fn flags(self) -> PageFlags {
        self.0.flags()
    }

    /// If present, the mapped physical page.
    #[inline]
    #[must_use]
    pub const fn page(self) -> Option<PhysicalPage> {
        if self.is_present() {
            Some(self.0.page())
        } else {
            None
        }
    }

    /// Create a present 4 KiB leaf mapping `page` with `flags`.
    #[inline]
    #[must_use]
    pub const fn make(page: PhysicalPage, flags: PageFlags) -> Self {
        Self(
            PageEntryBits::from_flags(flags)
                .with_present(true)
                .with_large_page(false)
                .with_page(page),
        )
    }

    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0.into_bits()
    }

    /// No validation is performed.
    #[inline]
    #[must_use]
    pub const fn from_raw(v: u32) -> Self {
        Self(PageEntryBits::from_bits(v))
    }
}

impl PageTable {
    /// Set all entries to non-present.
    #[inline]
    pub fn zero(&mut self) {
        self.entries.fill(PtEntry::zero());
    }

    #[inline]
    #[must_use]
    pub const fn get(&self, i: TableIndex) -> PtEntry {
        self.entries[i.as_usize()]
    }

    #[inline]
    pub const fn set(&mut self, i: TableIndex, e: PtEntry) {
        self.entries[i.as_usize()] = e;
    }

    /// Overwrite every entry with the corresponding entry of `other`.
    #[inline]
    pub fn copy_from(&mut self, other: &Self) {
        self.entries.copy_from_slice(&other.entries);
    }

    #[inline]
    #[must_use]
    pub fn entries(&self) -> impl Iterator<Item = PtEntry> + '_ {
        self.entries.iter().copied()
    }

    #[inline]
    #[must_use]
    pub const fn index_of(va: VirtualAddress) -> TableIndex {
        TableIndex::from(va)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use kernel_memory_addresses::PhysicalAddress;

    #[test]
    fn pte_4k_leaf() {
        let page = PhysicalPage::from_addr(PhysicalAddress::new(0x5555_0000));
        let e = PtEntry::make(page, PageFlags::USER);
        assert_eq!(e.page(), Some(page));
        assert_eq!(e.raw(), 0x5555_0005);
        assert_eq!(e.flags(), PageFlags::PRESENT | PageFlags::USER);
        assert!(!e.bits().writable());
    }

    #[test]
    fn zero_entry_has_no_page() {
        assert_eq!(PtEntry::zero().page(), None);
        assert_eq!(PtEntry::from_raw(0x1000).page(), None);
    }

    #[test]
    fn table_is_one_page() {
        assert_eq!(size_of::<PageTable>(), 4096);
        assert_eq!(align_of::<PageTable>(), 4096);
    }
}
