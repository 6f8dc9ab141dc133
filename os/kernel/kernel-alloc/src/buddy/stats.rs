use core::fmt;
use kernel_memory_addresses::PAGE_SIZE;

/// Snapshot of the allocator's page accounting.
///
/// `Display` renders a `meminfo`-style report:
///
/// ```
/// # use kernel_alloc::buddy::MemoryStats;
/// let stats = MemoryStats { total_pages: 256, allocated_pages: 16 };
/// assert_eq!(
///     stats.to_string(),
///     "MemTotal: 1024 kB\nMemFree: 960 kB\nMemUsed: 64 kB\n"
/// );
/// ```
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct MemoryStats {
    pub total_pages: usize,
    pub allocated_pages: usize,
}

impl MemoryStats {
    #[inline]
    #[must_use]
    pub const fn free_pages(&self) -> usize {
        self.total_pages.saturating_sub(self.allocated_pages)
    }
}

const fn kib(pages: usize) -> usize {
    pages * (PAGE_SIZE as usize / 1024)
}

impl fmt::Display for MemoryStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "MemTotal: {} kB", kib(self.total_pages))?;
        writeln!(f, "MemFree: {} kB", kib(self.free_pages()))?;
        writeln!(f, "MemUsed: {} kB", kib(self.allocated_pages))
    }
}
