//! # Page Directory (first level)
//!
//! - [`DirectoryIndex`]: index type for virtual-address bits `[31:22]`.
//! - [`PdEntry`]: a directory entry pointing to a [`PageTable`](super::pt::PageTable).
//! - [`PageDirectory`]: a 4 KiB-aligned array of 1024 entries, the root of
//!   an address space.
//!
//! Directory entries additionally carry the OS-defined *owned* tag: a set
//! tag means the address space allocated the table and releases it on
//! teardown; a clear tag means the table is borrowed (e.g. from the kernel
//! space) and must outlive this directory.

use crate::{PageEntryBits, PageFlags};
use kernel_memory_addresses::{ENTRIES_PER_TABLE, PhysicalPage, VirtualAddress};

/// Index into the page directory (VA bits `[31:22]`), range `0..1024`.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DirectoryIndex(u16);

/// A single page-directory entry (PDE).
#[doc(alias = "PDE")]
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PdEntry(PageEntryBits);

/// The page directory: 1024 entries, 4 KiB-aligned.
#[doc(alias = "PD")]
#[repr(C, align(4096))]
pub struct PageDirectory {
    entries: [PdEntry; ENTRIES_PER_TABLE],
}

impl DirectoryIndex {
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from(va: VirtualAddress) -> Self {
        Self::new(va.directory_index() as u16)
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

    /// Iterate over every directory slot.
    #[allow(clippy::cast_possible_truncation)]
    #[must_use]
    pub fn all() -> impl Iterator<Item = Self> {
        (0..ENTRIES_PER_TABLE as u16).map(Self)
    }
}

impl PdEntry {
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

    /// Whether this directory allocated the referenced table.
    #[inline]
    #[must_use]
    pub const fn is_owned(self) -> bool {
        self.0.owned()
    }

    #[inline]
    #[must_use]
    pub const fn bits(self) -> PageEntryBits {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn flags(self) -> PageFlags {
        self.0.flags()
    }

    /// If present, the physical page holding the referenced table.
    #[inline]
    #[must_use]
    pub const fn table(self) -> Option<PhysicalPage> {
        if self.is_present() {
            Some(self.0.page())
        } else {
            None
        }
    }

    /// Create a present entry referencing `table`.
    #[inline]
    #[must_use]
    pub const fn make(table: PhysicalPage, flags: PageFlags, owned: bool) -> Self {
        Self(
            PageEntryBits::from_flags(flags)
                .with_present(true)
                .with_large_page(false)
                .with_owned(owned)
                .with_page(table),
        )
    }

    /// Add `flags` to the entry, keeping the table and the owned tag.
    #[inline]
    #[must_use]
    pub const fn with_added_flags(self, flags: PageFlags) -> Self {
        let bits = self.0.into_bits() | flags.bits() | PageFlags::PRESENT.bits();
        Self(PageEntryBits::from_bits(bits))
    }

    /// The same entry with the owned tag cleared, for borrowing the table.
    #[inline]
    #[must_use]
    pub const fn borrowed(self) -> Self {
        Self(self.0.with_owned(false))
    }

    /// The same flags pointing at `table`, tagged as owned.
    #[inline]
    #[must_use]
    pub const fn with_owned_table(self, table: PhysicalPage) -> Self {
        Self(self.0.with_owned(true).with_page(table))
    }

    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0.into_bits()
    }

    #[inline]
    #[must_use]
    pub const fn from_raw(v: u32) -> Self {
        Self(PageEntryBits::from_bits(v))
    }
}

impl PageDirectory {
    /// Set all entries to non-present.
    #[inline]
    pub fn zero(&mut self) {
        self.entries.fill(PdEntry::zero());
    }

    #[inline]
    #[must_use]
    pub const fn get(&self, i: DirectoryIndex) -> PdEntry {
        self.entries[i.as_usize()]
    }

    #[inline]
    pub const fn set(&mut self, i: DirectoryIndex, e: PdEntry) {
        self.entries[i.as_usize()] = e;
    }

    /// Present entries with their slot.
    #[must_use]
    pub fn present(&self) -> impl Iterator<Item = (DirectoryIndex, PdEntry)> + '_ {
        DirectoryIndex::all()
            .map(|i| (i, self.get(i)))
            .filter(|(_, e)| e.is_present())
    }

    #[inline]
    #[must_use]
    pub const fn index_of(va: VirtualAddress) -> DirectoryIndex {
        DirectoryIndex::from(va)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use kernel_memory_addresses::PhysicalAddress;

    #[test]
    fn pde_points_to_table() {
        let table = PhysicalPage::from_addr(PhysicalAddress::new(0x0030_0000));
        let e = PdEntry::make(table, PageFlags::WRITABLE, true);
        assert_eq!(e.table(), Some(table));
        assert!(e.is_owned());
        assert_eq!(e.raw(), 0x0030_0203);
        assert!(!e.borrowed().is_owned());
        assert_eq!(e.borrowed().table(), Some(table));
    }

    #[test]
    fn added_flags_accumulate() {
        let table = PhysicalPage::from_addr(PhysicalAddress::new(0x1000));
        let e = PdEntry::make(table, PageFlags::WRITABLE, true).with_added_flags(PageFlags::USER);
        assert_eq!(
            e.flags(),
            PageFlags::PRESENT | PageFlags::WRITABLE | PageFlags::USER
        );
        assert!(e.is_owned());
        assert_eq!(e.table(), Some(table));
    }

    #[test]
    fn directory_is_one_page() {
        assert_eq!(size_of::<PageDirectory>(), 4096);
    }
}
