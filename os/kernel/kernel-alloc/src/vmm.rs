//! # Kernel Address Space Bootstrap
//!
//! One-time construction of the kernel's address space:
//!
//! 1. create an empty directory,
//! 2. leave the guard page at address 0 unmapped,
//! 3. identity-map `[PAGE_SIZE, memory_end)` writable,
//! 4. remap read-only kernel sections as present, read-only, supervisor,
//! 5. activate the directory.
//!
//! Failing to build the kernel space is fatal: [`init_kernel_space`] panics.
//! [`try_init_kernel_space`] reports the error instead.

use kernel_info::boot::{ElfSection, MemoryInfo};
use kernel_info::memory::{GUARD_PAGE, GUARD_PAGE_END, PAGE_SIZE};
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
use kernel_vmem::{AddressSpace, FrameAlloc, PageFlags, PagingControl, PhysMapper, VmemError};
use log::{debug, info};

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum VmmError {
    #[error("cannot build the kernel address space: {0}")]
    Vmem(#[from] VmemError),
}

/// Build and activate the kernel address space.
///
/// # Errors
/// Any [`VmemError`] from building the tables; nothing is activated then.
///
/// # Safety
/// - Runs once, at CPL0, before any other address space exists.
/// - `sections` must describe the running kernel image.
/// - Everything the CPU touches after activation must lie below
///   `memory.memory_end`.
pub unsafe fn try_init_kernel_space<'m, M, A, P>(
    mapper: &'m M,
    alloc: &A,
    paging: &P,
    memory: &MemoryInfo,
    sections: &[ElfSection],
) -> Result<AddressSpace<'m, M>, VmmError>
where
    M: PhysMapper,
    A: FrameAlloc,
    P: PagingControl,
{
    let space = AddressSpace::create(mapper, alloc)?;

    space.unmap(VirtualAddress::new(GUARD_PAGE));
    space.identity_map_range(
        alloc,
        PhysicalAddress::new(GUARD_PAGE_END),
        memory.memory_end(),
        PageFlags::WRITABLE,
    )?;
    info!(
        "kernel space: identity map [{:#010x}, {}) in {} tables",
        GUARD_PAGE_END,
        memory.memory_end(),
        space.table_count()
    );

    for section in sections {
        protect_section(&space, alloc, section)?;
    }

    unsafe { space.activate(paging) };
    info!("kernel space: activated at {}", space.root_page());
    Ok(space)
}

/// Remap a read-only, page-aligned section without write permission.
fn protect_section<M: PhysMapper, A: FrameAlloc>(
    space: &AddressSpace<'_, M>,
    alloc: &A,
    section: &ElfSection,
) -> Result<(), VmemError> {
    if section.is_writable() || section.align != PAGE_SIZE {
        debug!(
            "kernel space: leaving section at {} writable (flags {:#x}, align {})",
            section.start(),
            section.flags,
            section.align
        );
        return Ok(());
    }

    let pages = section.size.div_ceil(PAGE_SIZE);
    space.map_range(
        alloc,
        section.start(),
        VirtualAddress::new(section.addr),
        pages,
        PageFlags::empty(),
    )?;
    debug!(
        "kernel space: write-protected {pages} pages at {}",
        section.start()
    );
    Ok(())
}

/// Build and activate the kernel address space, halting on failure.
///
/// # Panics
/// If the kernel address space cannot be built.
///
/// # Safety
/// See [`try_init_kernel_space`].
#[must_use]
pub unsafe fn init_kernel_space<'m, M, A, P>(
    mapper: &'m M,
    alloc: &A,
    paging: &P,
    memory: &MemoryInfo,
    sections: &[ElfSection],
) -> AddressSpace<'m, M>
where
    M: PhysMapper,
    A: FrameAlloc,
    P: PagingControl,
{
    match unsafe { try_init_kernel_space(mapper, alloc, paging, memory, sections) } {
        Ok(space) => space,
        Err(e) => panic!("Cannot initialize kernel virtual memory: {e}"),
    }
}

/// Activation through CR3 and CR0.
///
/// Loads CR3 with the directory, then sets CR0.PG and CR0.WP so the
/// read-only mappings bind the kernel too.
#[cfg(target_arch = "x86")]
#[derive(Copy, Clone, Debug, Default)]
pub struct CpuPaging;

#[cfg(target_arch = "x86")]
impl PagingControl for CpuPaging {
    unsafe fn activate(&self, root: kernel_vmem::RootPage) {
        use kernel_registers::cr0::Cr0;
        use kernel_registers::cr3::Cr3;
        use kernel_registers::{LoadRegisterUnsafe, StoreRegisterUnsafe};

        unsafe {
            Cr3::from_page_directory(root, false, false).store_unsafe();
            Cr0::load_unsafe()
                .with_pg_paging(true)
                .with_wp_write_protect(true)
                .store_unsafe();
        }
    }
}
