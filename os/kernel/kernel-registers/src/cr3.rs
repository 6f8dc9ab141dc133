use bitfield_struct::bitfield;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage};

#[cfg(all(feature = "asm", target_arch = "x86"))]
use crate::{LoadRegisterUnsafe, StoreRegisterUnsafe};

/// CR3, the Page-Directory Base Register (32-bit paging, no PAE).
///
/// Holds the physical frame of the active page directory and the cache
/// controls applied when the MMU reads it.
#[bitfield(u32)]
pub struct Cr3 {
    /// Bits 0–2: Ignored.
    #[bits(3)]
    pub reserved0: u8,

    /// Bit 3 (PWT): Page-level Write-Through for the page directory.
    pub pwt: bool,

    /// Bit 4 (PCD): Page-level Cache Disable for the page directory.
    pub pcd: bool,

    /// Bits 5–11: Ignored.
    #[bits(7)]
    pub reserved1: u8,

    /// Bits 12–31: page directory physical base >> 12.
    #[bits(20)]
    page_directory_frame: u32,
}

impl Cr3 {
    /// Create a `Cr3` value pointing at the page directory in `root`.
    #[must_use]
    pub const fn from_page_directory(root: PhysicalPage, pwt: bool, pcd: bool) -> Self {
        Self::new()
            .with_pwt(pwt)
            .with_pcd(pcd)
            .with_page_directory_frame(root.frame_number())
    }

    /// Physical base address of the page directory.
    #[must_use]
    pub const fn page_directory(&self) -> PhysicalAddress {
        PhysicalPage::from_frame_number(self.page_directory_frame()).base()
    }
}

#[cfg(all(feature = "asm", target_arch = "x86"))]
impl LoadRegisterUnsafe for Cr3 {
    unsafe fn load_unsafe() -> Self {
        let cr3: u32;
        unsafe {
            core::arch::asm!("mov {}, cr3", out(reg) cr3, options(nomem, nostack, preserves_flags));
        }
        Self::from_bits(cr3)
    }
}

#[cfg(all(feature = "asm", target_arch = "x86"))]
impl StoreRegisterUnsafe for Cr3 {
    unsafe fn store_unsafe(self) {
        let cr3 = self.into_bits();
        unsafe {
            core::arch::asm!("mov cr3, {}", in(reg) cr3, options(nostack, preserves_flags));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_frame_round_trips() {
        let root = PhysicalPage::from_addr(PhysicalAddress::new(0x0012_3000));
        let cr3 = Cr3::from_page_directory(root, false, true);
        assert_eq!(cr3.into_bits(), 0x0012_3010);
        assert_eq!(cr3.page_directory(), PhysicalAddress::new(0x0012_3000));
        assert!(cr3.pcd());
        assert!(!cr3.pwt());
    }
}
