use bitfield_struct::bitfield;
use kernel_memory_addresses::PhysicalPage;

/// A single 32-bit directory or table entry in its raw bitfield form.
///
/// Both levels of the two-level structure share this layout: the low 12 bits
/// carry flags and the high 20 bits the frame number of either the next-level
/// table (directory entries) or the mapped page (table entries).
///
/// ### Bit layout
///
/// | Bits  | Name / Mnemonic | Meaning |
/// |-------|-----------------|---------|
/// | 0     | `P`   | Present |
/// | 1     | `RW`  | Writable if set |
/// | 2     | `US`  | User-mode accessible if set |
/// | 3     | `PWT` | Write-through caching |
/// | 4     | `PCD` | Disable caching |
/// | 5     | `A`   | Accessed |
/// | 6     | `D`   | Dirty (table entries only) |
/// | 7     | `PS`  | 4 MiB page (directory) / PAT (table); always 0 here |
/// | 8     | `G`   | Global (table entries only) |
/// | 9     | owned | OS bit: the directory owns the referenced table |
/// | 10–11 | avail | OS bits |
/// | 12–31 | frame | Physical frame number |
///
/// ### Example
/// ```rust
/// # use kernel_memory_addresses::{PhysicalAddress, PhysicalPage};
/// # use kernel_vmem::PageEntryBits;
/// let e = PageEntryBits::new()
///     .with_present(true)
///     .with_writable(true)
///     .with_page(PhysicalPage::from_addr(PhysicalAddress::new(0x0012_3000)));
/// assert_eq!(e.into_bits(), 0x0012_3003);
/// ```
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct PageEntryBits {
    /// Present (P, bit 0).
    ///
    /// Must be checked before the frame field is interpreted as an address.
    pub present: bool,

    /// Writable (RW, bit 1).
    ///
    /// Permissions intersect across both levels: a page is writable only if
    /// its directory entry is writable too.
    pub writable: bool,

    /// User/Supervisor (US, bit 2).
    pub user_access: bool,

    /// Page Write-Through (PWT, bit 3).
    pub write_through: bool,

    /// Page Cache Disable (PCD, bit 4).
    pub cache_disabled: bool,

    /// Accessed (A, bit 5). Set by the CPU.
    pub accessed: bool,

    /// Dirty (D, bit 6). Set by the CPU on the first write through a table entry.
    pub dirty: bool,

    /// Page Size (PS, bit 7).
    ///
    /// 4 MiB pages are not used, so this stays clear in directory entries.
    pub large_page: bool,

    /// Global (G, bit 8).
    pub global: bool,

    /// Owned (bit 9, ignored by hardware).
    ///
    /// Set on a directory entry when the address space allocated the
    /// referenced table and must release it on teardown.
    pub owned: bool,

    /// Remaining OS-available bits (10..=11).
    #[bits(2)]
    pub os_available: u8,

    /// Physical frame number (bits 12..=31).
    #[bits(20)]
    frame_number: u32,
}

impl PageEntryBits {
    /// Entry with exactly the given flag bits and no frame.
    #[inline]
    #[must_use]
    pub const fn from_flags(flags: PageFlags) -> Self {
        Self::from_bits(flags.bits())
    }

    /// The architectural flags of this entry (the owned tag is not a flag).
    #[inline]
    #[must_use]
    pub const fn flags(&self) -> PageFlags {
        PageFlags::from_bits_truncate(self.into_bits())
    }

    #[inline]
    #[must_use]
    pub const fn page(&self) -> PhysicalPage {
        PhysicalPage::from_frame_number(self.frame_number())
    }

    #[inline]
    pub const fn set_page(&mut self, page: PhysicalPage) {
        self.set_frame_number(page.frame_number());
    }

    #[inline]
    #[must_use]
    pub const fn with_page(mut self, page: PhysicalPage) -> Self {
        self.set_page(page);
        self
    }
}

bitflags::bitflags! {
    /// Permission and caching flags for directory and table entries.
    ///
    /// These are the caller-facing flag bits; the frame number and the
    /// OS-owned tag are managed by the address space.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct PageFlags: u32 {
        /// Entry is valid.
        const PRESENT        = 1 << 0;

        /// Writes are allowed.
        ///
        /// If cleared, the page is read-only; supervisor writes still succeed
        /// unless CR0.WP is set.
        const WRITABLE       = 1 << 1;

        /// Accessible from user mode (CPL=3).
        const USER           = 1 << 2;

        /// Write-through caching.
        const WRITE_THROUGH  = 1 << 3;

        /// Caching disabled; used for MMIO.
        const CACHE_DISABLE  = 1 << 4;

        /// Set by the CPU on access.
        const ACCESSED       = 1 << 5;

        /// Set by the CPU on the first write.
        const DIRTY          = 1 << 6;

        /// Not flushed from the TLB on CR3 reload (needs CR4.PGE).
        const GLOBAL         = 1 << 8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_memory_addresses::PhysicalAddress;

    #[test]
    fn owned_tag_is_not_a_flag() {
        let e = PageEntryBits::from_flags(PageFlags::PRESENT | PageFlags::USER).with_owned(true);
        assert_eq!(e.into_bits(), 0x205);
        assert_eq!(e.flags(), PageFlags::PRESENT | PageFlags::USER);
    }

    #[test]
    fn frame_sits_above_the_flags() {
        let page = PhysicalPage::from_addr(PhysicalAddress::new(0xFFFF_F000));
        let e = PageEntryBits::from_flags(PageFlags::all()).with_page(page);
        assert_eq!(e.page(), page);
        assert_eq!(e.into_bits() & 0xFFF, PageFlags::all().bits());
    }
}
