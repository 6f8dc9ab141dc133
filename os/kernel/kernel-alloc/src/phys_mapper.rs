//! # Identity PhysMapper for the Kernel
//!
//! The kernel identity-maps all usable physical memory (see
//! [`vmm`](crate::vmm)), so before and after paging is enabled a physical
//! address is also the virtual address of the same byte.
//!
//! ## Example
//! ```rust,no_run
//! use kernel_alloc::phys_mapper::IdentityPhysMapper;
//! use kernel_memory_addresses::PhysicalAddress;
//! use kernel_vmem::{PageTable, PhysMapper};
//!
//! let mapper = IdentityPhysMapper;
//! unsafe {
//!     let table: &mut PageTable = mapper.phys_to_mut(PhysicalAddress::new(0x0020_1000));
//!     table.zero();
//! }
//! ```

use kernel_memory_addresses::PhysicalAddress;
use kernel_vmem::PhysMapper;

/// [`PhysMapper`] for identity-mapped physical memory.
///
/// # Safety
/// Pointers are only valid while the referenced range is identity-mapped
/// (or paging is off).
#[derive(Copy, Clone, Debug, Default)]
pub struct IdentityPhysMapper;

impl PhysMapper for IdentityPhysMapper {
    #[inline]
    fn phys_to_ptr(&self, pa: PhysicalAddress) -> *mut u8 {
        core::ptr::with_exposed_provenance_mut(pa.as_usize())
    }
}
