//! # Kernel Boot Information

use kernel_memory_addresses::PhysicalAddress;

/// `SHF_WRITE`: the section is writable at runtime.
pub const SHF_WRITE: u32 = 0x1;

/// Physical memory bounds reported by the loader.
///
/// Keep this `#[repr(C)]`; it crosses the loader/kernel boundary.
#[repr(C)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MemoryInfo {
    /// First byte of the physical heap handed to the buddy allocator.
    pub heap_begin: u32,

    /// End (exclusive) of the physical heap.
    pub heap_end: u32,

    /// End (exclusive) of usable physical memory. The kernel identity map
    /// covers everything below this address except the guard page.
    pub memory_end: u32,
}

impl MemoryInfo {
    #[inline]
    #[must_use]
    pub const fn heap_begin(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.heap_begin)
    }

    #[inline]
    #[must_use]
    pub const fn heap_end(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.heap_end)
    }

    #[inline]
    #[must_use]
    pub const fn memory_end(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.memory_end)
    }

    /// Bytes of physical memory available to the buddy allocator.
    #[inline]
    #[must_use]
    pub const fn available_memory(&self) -> u32 {
        self.heap_end.saturating_sub(self.heap_begin)
    }
}

/// One entry of the kernel image's ELF section header table, reduced to the
/// fields the memory core consumes.
#[repr(C)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ElfSection {
    /// `sh_addr`: load address of the section.
    pub addr: u32,
    /// `sh_size`: size of the section in bytes.
    pub size: u32,
    /// `sh_addralign`: required alignment of the section.
    pub align: u32,
    /// `sh_flags`: section attribute flags (see [`SHF_WRITE`]).
    pub flags: u32,
}

impl ElfSection {
    #[inline]
    #[must_use]
    pub const fn is_writable(&self) -> bool {
        self.flags & SHF_WRITE != 0
    }

    #[inline]
    #[must_use]
    pub const fn start(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.addr)
    }
}
