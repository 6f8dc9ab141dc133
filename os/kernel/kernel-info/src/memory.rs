//! # Memory Layout

pub use kernel_memory_addresses::{ENTRIES_PER_TABLE, PAGE_SHIFT, PAGE_SIZE};

/// Start of the unmapped guard page that catches null-pointer accesses.
pub const GUARD_PAGE: u32 = 0;

/// First address past the guard page; the kernel identity map starts here.
pub const GUARD_PAGE_END: u32 = GUARD_PAGE + PAGE_SIZE;

/// Bytes covered by one page-directory entry (one full page table).
#[allow(clippy::cast_possible_truncation)]
pub const BYTES_PER_DIRECTORY_ENTRY: u32 = PAGE_SIZE * ENTRIES_PER_TABLE as u32;

const _: () = {
    assert!(PAGE_SIZE.is_power_of_two());
    assert!(BYTES_PER_DIRECTORY_ENTRY == 0x0040_0000); // 4 MiB
};
