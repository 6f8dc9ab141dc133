//! # Address Space (two-level, directory-rooted)
//!
//! Build and manipulate a single virtual address space: a [`PageDirectory`]
//! whose present entries reference [`PageTable`]s, each page-sized and
//! obtained through a [`FrameAlloc`].
//!
//! ## Highlights
//!
//! - [`AddressSpace::map`] installs one 4 KiB mapping, allocating the table
//!   on demand.
//! - [`AddressSpace::identity_map_range`] / [`AddressSpace::map_range`] map a
//!   run of pages, leaving every table entry as it was on failure.
//! - [`AddressSpace::resolve`] / [`AddressSpace::translate`] walk the two
//!   levels.
//! - [`AddressSpace::clone_space`] forks a space: user tables and private
//!   supervisor tables are copied, kernel tables are shared. Physical pages are never copied.
//! - [`AddressSpace::destroy`] releases the owned tables and the directory.
//!
//! ## Ownership
//!
//! Every directory entry carries an *owned* tag (see [`PdEntry::is_owned`]).
//! Tables the space allocated itself are tagged; tables borrowed from the
//! kernel space are not, and survive this space's teardown.
//!
//! ## Safety
//!
//! - Mutating active mappings requires TLB maintenance by the caller.
//! - The `PhysMapper` must yield writable references to table frames.
//! - An address space is not internally locked; callers serialize mutation
//!   of the same space.

use crate::page_table::pd::{DirectoryIndex, PageDirectory, PdEntry};
use crate::page_table::pt::{PageTable, PtEntry};
use crate::page_table::split_indices;
use crate::{FrameAlloc, PageFlags, PagingControl, PhysMapper, VmemError};
use kernel_memory_addresses::{
    PAGE_SHIFT, PAGE_SIZE, PhysicalAddress, PhysicalPage, VirtualAddress, align_down,
};
use log::{debug, warn};

/// Handle to a single, concrete address space.
///
/// The handle owns its directory frame; [`destroy`](Self::destroy) consumes it.
pub struct AddressSpace<'m, M: PhysMapper> {
    root: PhysicalPage,
    mapper: &'m M,
}

/// The page-directory frame of an [`AddressSpace`].
pub type RootPage = PhysicalPage;

impl<'m, M: PhysMapper> AddressSpace<'m, M> {
    /// Create an empty address space with no mappings.
    ///
    /// # Errors
    /// [`VmemError::OutOfMemory`] if no frame is available for the directory.
    pub fn create<A: FrameAlloc>(mapper: &'m M, alloc: &A) -> Result<Self, VmemError> {
        let root = alloc.alloc_4k().ok_or(VmemError::OutOfMemory)?;
        let space = Self { root, mapper };
        space.pd_mut().zero();
        debug!("address space created at {root}");
        Ok(space)
    }

    /// Create an address space whose directory borrows every table of `kernel`.
    ///
    /// # Errors
    /// [`VmemError::OutOfMemory`] if no frame is available for the directory.
    pub fn create_from_kernel<A: FrameAlloc>(
        mapper: &'m M,
        alloc: &A,
        kernel: &Self,
    ) -> Result<Self, VmemError> {
        let space = Self::create(mapper, alloc)?;
        let pd = space.pd_mut();
        for (i, e) in kernel.pd_mut().present() {
            pd.set(i, e.borrowed());
        }
        Ok(space)
    }

    /// View an existing directory frame as an address space.
    ///
    /// # Safety
    /// `root` must hold a valid page directory, and no other handle may
    /// destroy it while this one is in use.
    #[inline]
    #[must_use]
    pub const unsafe fn from_root(mapper: &'m M, root: RootPage) -> Self {
        Self { root, mapper }
    }

    /// Physical page of the directory.
    #[inline]
    #[must_use]
    pub const fn root_page(&self) -> RootPage {
        self.root
    }

    /// Install this space as the active translation root.
    ///
    /// # Safety
    /// The space must map the currently executing code and stack, and the
    /// caller must run at CPL0.
    #[inline]
    pub unsafe fn activate<P: PagingControl>(&self, paging: &P) {
        unsafe { paging.activate(self.root) }
    }

    #[inline]
    #[allow(clippy::mut_from_ref)]
    fn pd_mut(&self) -> &mut PageDirectory {
        // SAFETY: the directory frame is owned by this handle.
        unsafe { self.mapper.phys_to_mut::<PageDirectory>(self.root.base()) }
    }

    #[inline]
    #[allow(clippy::mut_from_ref)]
    fn pt_mut(&self, page: PhysicalPage) -> &mut PageTable {
        // SAFETY: `page` was read from a present directory entry.
        unsafe { self.mapper.phys_to_mut::<PageTable>(page.base()) }
    }

    /// Allocate and clear a table frame.
    fn new_table<A: FrameAlloc>(&self, alloc: &A) -> Result<PhysicalPage, VmemError> {
        let page = alloc.alloc_4k().ok_or_else(|| {
            warn!("no frame left for a page table");
            VmemError::OutOfMemory
        })?;
        self.pt_mut(page).zero();
        Ok(page)
    }

    /// The table behind slot `di`, private to this space.
    ///
    /// An absent table is allocated and installed empty. A borrowed table is
    /// copied into a fresh owned one first, so the lender never sees writes
    /// made through this space.
    fn owned_table<A: FrameAlloc>(
        &self,
        alloc: &A,
        di: DirectoryIndex,
    ) -> Result<PhysicalPage, VmemError> {
        let pd = self.pd_mut();
        let pde = pd.get(di);
        match pde.table() {
            Some(table) if pde.is_owned() => Ok(table),
            Some(shared) => {
                let table = self.new_table(alloc)?;
                self.pt_mut(table).copy_from(self.pt_mut(shared));
                pd.set(di, pde.with_owned_table(table));
                debug!(
                    "slot {} of {}: borrowed table {shared} copied into {table}",
                    di.as_usize(),
                    self.root
                );
                Ok(table)
            }
            None => {
                let table = self.new_table(alloc)?;
                pd.set(di, PdEntry::make(table, PageFlags::empty(), true));
                Ok(table)
            }
        }
    }

    /// Map the page containing `va` to the frame containing `pa`.
    ///
    /// A missing table is allocated and installed as owned. A borrowed table
    /// is replaced by an owned copy before the write. The directory entry
    /// accumulates `flags`; the table entry is overwritten with
    /// `pa | PRESENT | flags`. Offset bits of both addresses are ignored.
    ///
    /// # Errors
    /// [`VmemError::OutOfMemory`] if a table is needed and cannot be
    /// allocated. Nothing is modified in that case.
    pub fn map<A: FrameAlloc>(
        &self,
        alloc: &A,
        pa: PhysicalAddress,
        va: VirtualAddress,
        flags: PageFlags,
    ) -> Result<(), VmemError> {
        let (di, ti) = split_indices(va);
        let table = self.owned_table(alloc, di)?;
        let pd = self.pd_mut();
        pd.set(di, pd.get(di).with_added_flags(flags));
        self.pt_mut(table).set(ti, PtEntry::make(pa.page(), flags));
        Ok(())
    }

    /// `map(page, page, flags)`: map a physical page onto the same virtual address.
    ///
    /// # Errors
    /// See [`map`](Self::map).
    #[inline]
    pub fn identity_map<A: FrameAlloc>(
        &self,
        alloc: &A,
        page: PhysicalAddress,
        flags: PageFlags,
    ) -> Result<(), VmemError> {
        self.map(alloc, page, VirtualAddress::new(page.as_u32()), flags)
    }

    /// Identity-map every page touching `[from, to)`.
    ///
    /// # Errors
    /// [`VmemError::OutOfMemory`] if a table for any slot of the range cannot
    /// be allocated. Tables are set up for the whole range before the first
    /// entry is written, so no table entry changes on failure. Tables
    /// installed on the way stay (empty, or copies of borrowed ones).
    pub fn identity_map_range<A: FrameAlloc>(
        &self,
        alloc: &A,
        from: PhysicalAddress,
        to: PhysicalAddress,
        flags: PageFlags,
    ) -> Result<(), VmemError> {
        let start = align_down(from.as_u32(), PAGE_SIZE);
        if to.as_u32() <= start {
            return Ok(());
        }
        let pages = (to.as_u32() - start).div_ceil(PAGE_SIZE);
        self.map_range(
            alloc,
            PhysicalAddress::new(start),
            VirtualAddress::new(start),
            pages,
            flags,
        )
    }

    /// Map `pages` consecutive pages starting at `va` to consecutive frames
    /// starting at `pa`.
    ///
    /// # Errors
    /// - [`VmemError::RangeOverflow`] if either run wraps past 4 GiB; nothing
    ///   is mapped.
    /// - [`VmemError::OutOfMemory`] as for
    ///   [`identity_map_range`](Self::identity_map_range); no table entry
    ///   changes.
    pub fn map_range<A: FrameAlloc>(
        &self,
        alloc: &A,
        pa: PhysicalAddress,
        va: VirtualAddress,
        pages: u32,
        flags: PageFlags,
    ) -> Result<(), VmemError> {
        let pa = pa.page().base();
        let va = va.page().base();
        if pages == 0 {
            return Ok(());
        }

        let Some(last) = (pages - 1)
            .checked_mul(PAGE_SIZE)
            .filter(|&off| pa.checked_add(off).is_some())
            .and_then(|off| va.checked_add(off))
        else {
            return Err(VmemError::RangeOverflow { start: va, pages });
        };

        let (first_slot, last_slot) = (DirectoryIndex::from(va), DirectoryIndex::from(last));
        for slot in DirectoryIndex::all()
            .skip(first_slot.as_usize())
            .take(last_slot.as_usize() - first_slot.as_usize() + 1)
        {
            self.owned_table(alloc, slot).inspect_err(|_| {
                warn!(
                    "no table for slot {} while mapping {pages} pages at {va}",
                    slot.as_usize()
                );
            })?;
        }

        for i in 0..pages {
            let off = i << PAGE_SHIFT;
            self.map(alloc, pa + off, va + off, flags)?;
        }
        Ok(())
    }

    /// Clear the table entry for the page containing `va`.
    ///
    /// No-op if the table is absent. Emptied tables are not released.
    pub fn unmap(&self, va: VirtualAddress) {
        let (di, ti) = split_indices(va);
        if let Some(table) = self.pd_mut().get(di).table() {
            self.pt_mut(table).set(ti, PtEntry::zero());
        }
    }

    /// Walk both levels for `va`; `None` if either entry is not present.
    #[must_use]
    pub fn resolve(&self, va: VirtualAddress) -> Option<PtEntry> {
        let (di, ti) = split_indices(va);
        let table = self.pd_mut().get(di).table()?;
        let pte = self.pt_mut(table).get(ti);
        pte.is_present().then_some(pte)
    }

    #[inline]
    #[must_use]
    pub fn is_mapped(&self, va: VirtualAddress) -> bool {
        self.resolve(va).is_some()
    }

    /// Whether every page touching the span from the page of `va` up to
    /// `va + size` (exclusive) is mapped.
    ///
    /// Page-granular: a mapped page counts as fully contained.
    #[must_use]
    pub fn contains(&self, va: VirtualAddress, size: u32) -> bool {
        let end = u64::from(va.as_u32()) + u64::from(size);
        let mut page = u64::from(align_down(va.as_u32(), PAGE_SIZE));
        while page < end {
            let Ok(addr) = u32::try_from(page) else {
                return false;
            };
            if !self.is_mapped(VirtualAddress::new(addr)) {
                return false;
            }
            page += u64::from(PAGE_SIZE);
        }
        true
    }

    /// Translate `va` to its physical address, keeping the in-page offset.
    #[must_use]
    pub fn translate(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        let page = self.resolve(va)?.page()?;
        Some(page.join(va.offset()))
    }

    /// Flags of the table entry mapping `va`.
    #[must_use]
    pub fn get_flags(&self, va: VirtualAddress) -> Option<PageFlags> {
        self.resolve(va).map(PtEntry::flags)
    }

    /// Fork this space.
    ///
    /// The child starts as a borrower of `kernel` (see
    /// [`create_from_kernel`](Self::create_from_kernel)). Every present entry
    /// of `self` then overrides the child's slot:
    ///
    /// - user-accessible entries get a fresh owned copy of their table;
    /// - other entries are shared as borrowed, except supervisor tables this
    ///   space owns that are not `kernel`'s, which are copied too.
    ///
    /// Mapped physical pages are shared, not copied.
    ///
    /// # Errors
    /// [`VmemError::OutOfMemory`]; every frame allocated for the child is
    /// released before returning.
    pub fn clone_space<A: FrameAlloc>(&self, alloc: &A, kernel: &Self) -> Result<Self, VmemError> {
        let child = Self::create_from_kernel(self.mapper, alloc, kernel)?;
        let dst = child.pd_mut();

        for (i, e) in self.pd_mut().present() {
            let kernel_table = kernel.directory_entry(i).table();
            let private = e.is_owned() && e.table() != kernel_table;
            if !(e.flags().contains(PageFlags::USER) || private) {
                dst.set(i, e.borrowed());
                continue;
            }

            let Some(src_table) = e.table() else {
                continue;
            };
            let table = match child.new_table(alloc) {
                Ok(table) => table,
                Err(err) => {
                    child.destroy(alloc);
                    return Err(err);
                }
            };
            child.pt_mut(table).copy_from(self.pt_mut(src_table));
            dst.set(i, e.with_owned_table(table));
        }

        debug!("address space {} cloned into {}", self.root, child.root);
        Ok(child)
    }

    /// Release every owned table and the directory.
    pub fn destroy<A: FrameAlloc>(self, alloc: &A) {
        let mut released = 0_usize;
        for (_, e) in self.pd_mut().present().filter(|(_, e)| e.is_owned()) {
            if let Some(table) = e.table() {
                alloc.free_4k(table);
                released += 1;
            }
        }
        alloc.free_4k(self.root);
        debug!(
            "address space {} destroyed ({released} tables released)",
            self.root
        );
    }

    /// Number of present directory entries; for diagnostics.
    #[must_use]
    pub fn table_count(&self) -> usize {
        self.pd_mut().present().count()
    }

    /// The raw directory entry in slot `index`.
    #[must_use]
    pub fn directory_entry(&self, index: DirectoryIndex) -> PdEntry {
        self.pd_mut().get(index)
    }
}
