//! # Buddy Allocator
//!
//! Physical block allocator over a fixed, page-aligned arena. Blocks are
//! `2^order` pages large and tracked by a [`BlockTree`]; order 0 is one page.
//!
//! All tree access happens under one spin lock taken with interrupts
//! disabled, so interrupt handlers on this CPU never see a torn tree. The
//! prior interrupt state is restored on release.
//!
//! ```text
//! heap_begin                                                  heap_end
//! │ node states │pad│ block arena (pages)          │ reserved tail │
//!               ▲   ▲                              ▲               ▲
//!               │   base                   real end of memory   base + 2^max_order pages
//!               └ page boundary
//! ```
//!
//! The tree always covers a power of two of pages. Leaves past the real end
//! of memory are reserved at construction and never handed out.

mod stats;
mod tree;

pub use self::stats::MemoryStats;
pub use self::tree::{BlockTree, NodeState, node_count};

use core::fmt;
use kernel_memory_addresses::{PAGE_SHIFT, PAGE_SIZE, PhysicalAddress, PhysicalPage, align_up};
use kernel_sync::{InterruptControl, SpinMutex};
use kernel_vmem::{FrameAlloc, PhysMapper};
use log::{error, info, trace, warn};

/// Largest supported block order: `2^20` pages cover the 4 GiB address space.
pub const MAX_ORDER: u8 = 20;

const _: () = assert!(block_size(MAX_ORDER) == 1 << 32);

/// Errors of the buddy allocator.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum BuddyError {
    #[error("no free block of order {order}")]
    OutOfMemory { order: u8 },

    #[error("order {order} exceeds the maximum order {max_order}")]
    OrderTooLarge { order: u8, max_order: u8 },

    #[error("node {index} is not an allocated block")]
    NotAllocated { index: usize },

    #[error("node {index} does not exist")]
    InvalidBlock { index: usize },

    #[error("{address} lies outside the arena")]
    OutOfArena { address: PhysicalAddress },

    #[error("{address} is not aligned to its block size")]
    Misaligned { address: PhysicalAddress },

    #[error("the heap cannot hold the node states and one page")]
    ArenaTooSmall,

    #[error("{got} node states given, {needed} needed")]
    MetadataTooSmall { needed: usize, got: usize },
}

/// Size in bytes of a block of `order`.
#[inline]
#[must_use]
pub const fn block_size(order: u8) -> u64 {
    (PAGE_SIZE as u64) << order
}

/// Smallest order whose block holds `pages` pages.
///
/// ```
/// # use kernel_alloc::buddy::order_for_pages;
/// assert_eq!(order_for_pages(0), 0);
/// assert_eq!(order_for_pages(1), 0);
/// assert_eq!(order_for_pages(3), 2);
/// assert_eq!(order_for_pages(4), 2);
/// ```
#[inline]
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub const fn order_for_pages(pages: u32) -> u8 {
    if pages <= 1 {
        0
    } else {
        ((pages - 1).ilog2() + 1) as u8
    }
}

/// Smallest order whose block holds `size` bytes.
///
/// ```
/// # use kernel_alloc::buddy::order_of;
/// assert_eq!(order_of(1), 0);
/// assert_eq!(order_of(4096), 0);
/// assert_eq!(order_of(4097), 1);
/// ```
#[inline]
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub const fn order_of(size: u64) -> u8 {
    let pages = size.div_ceil(PAGE_SIZE as u64);
    if pages <= 1 {
        0
    } else {
        ((pages - 1).ilog2() + 1) as u8
    }
}

/// A block handed out by [`BuddyAllocator`].
///
/// The block is owned by the holder until passed to [`BuddyAllocator::free`].
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct Block {
    index: usize,
    order: u8,
    address: PhysicalAddress,
}

impl Block {
    /// Tree node tracking this block.
    #[inline]
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    #[inline]
    #[must_use]
    pub const fn order(&self) -> u8 {
        self.order
    }

    #[inline]
    #[must_use]
    pub const fn address(&self) -> PhysicalAddress {
        self.address
    }

    /// First page of the block.
    #[inline]
    #[must_use]
    pub const fn page(&self) -> PhysicalPage {
        self.address.page()
    }

    /// Size of the block in pages.
    #[inline]
    #[must_use]
    pub const fn pages(&self) -> u32 {
        1 << self.order
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Block#{}(order {} at {})", self.index, self.order, self.address)
    }
}

/// The buddy allocator: a locked [`BlockTree`] over a physical arena.
pub struct BuddyAllocator<'s, M: PhysMapper, I: InterruptControl> {
    tree: SpinMutex<BlockTree<'s>>,
    base: PhysicalAddress,
    pages: u32,
    mapper: &'s M,
    irq: I,
}

impl<'s, M: PhysMapper, I: InterruptControl> BuddyAllocator<'s, M, I> {
    /// Manage `pages` pages starting at `base`, with node states in `states`.
    ///
    /// # Errors
    /// - [`BuddyError::Misaligned`] if `base` is not page-aligned.
    /// - [`BuddyError::ArenaTooSmall`] if `pages` is zero or the arena wraps.
    /// - [`BuddyError::MetadataTooSmall`] if `states` is too short for the tree.
    ///
    /// An arena that fits below 4 GiB has at most `2^20` pages, so its order
    /// never exceeds [`MAX_ORDER`].
    ///
    /// # Safety
    /// The arena must be unused memory reachable through `mapper` for `'s`;
    /// blocks are handed out from it and zeroed through the mapper.
    pub unsafe fn new(
        mapper: &'s M,
        irq: I,
        states: &'s mut [NodeState],
        base: PhysicalAddress,
        pages: u32,
    ) -> Result<Self, BuddyError> {
        if !base.is_page_aligned() {
            return Err(BuddyError::Misaligned { address: base });
        }
        let span = u64::from(pages) << PAGE_SHIFT;
        if pages == 0 || u64::from(base.as_u32()) + span > 1 << 32 {
            return Err(BuddyError::ArenaTooSmall);
        }

        let max_order = order_for_pages(pages);
        let mut tree = BlockTree::new(states, max_order)?;
        reserve_tail(&mut tree, pages);

        Ok(Self {
            tree: SpinMutex::new(tree),
            base,
            pages,
            mapper,
            irq,
        })
    }

    /// Carve the allocator out of the physical heap `[heap_begin, heap_end)`.
    ///
    /// The node states go to the start of the heap, the block arena to the
    /// next page boundary after them.
    ///
    /// # Errors
    /// [`BuddyError::ArenaTooSmall`] if the heap cannot hold the node states
    /// and at least one page.
    ///
    /// # Safety
    /// The heap must be unused memory reachable through `mapper` for `'s`.
    pub unsafe fn from_heap(
        mapper: &'s M,
        irq: I,
        heap_begin: PhysicalAddress,
        heap_end: PhysicalAddress,
    ) -> Result<Self, BuddyError> {
        let begin = align_up(heap_begin.as_u32(), PAGE_SIZE).ok_or(BuddyError::ArenaTooSmall)?;
        let end = heap_end.page().base().as_u32();
        if end <= begin {
            return Err(BuddyError::ArenaTooSmall);
        }

        // the tree for the whole heap bounds the tree for what is left
        let heap_pages = (end - begin) >> PAGE_SHIFT;
        let nodes = node_count(order_for_pages(heap_pages));
        let metadata_pages = u32::try_from(nodes.div_ceil(PAGE_SIZE as usize))
            .map_err(|_| BuddyError::ArenaTooSmall)?;
        if metadata_pages >= heap_pages {
            return Err(BuddyError::ArenaTooSmall);
        }
        let pages = heap_pages - metadata_pages;
        let base = PhysicalAddress::new(begin + (metadata_pages << PAGE_SHIFT));

        let ptr = mapper.phys_to_ptr(PhysicalAddress::new(begin)).cast::<NodeState>();
        // SAFETY: the caller hands us the heap; `Free` is the all-zero state.
        let states = unsafe {
            core::ptr::write_bytes(ptr, 0, nodes);
            core::slice::from_raw_parts_mut(ptr, nodes)
        };

        let allocator = unsafe { Self::new(mapper, irq, states, base, pages)? };
        info!(
            "buddy: {metadata_pages} metadata pages at {}, {pages} pages at {base}, max order {}",
            PhysicalAddress::new(begin),
            allocator.max_order()
        );
        Ok(allocator)
    }

    /// First byte of the block arena.
    #[inline]
    #[must_use]
    pub const fn base(&self) -> PhysicalAddress {
        self.base
    }

    /// Usable pages in the arena.
    #[inline]
    #[must_use]
    pub const fn total_pages(&self) -> u32 {
        self.pages
    }

    #[must_use]
    pub fn max_order(&self) -> u8 {
        self.tree.lock_irq(&self.irq).max_order()
    }

    /// Pages currently handed out.
    #[must_use]
    pub fn allocated_pages(&self) -> usize {
        self.tree.lock_irq(&self.irq).allocated_pages()
    }

    #[must_use]
    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            total_pages: self.pages as usize,
            allocated_pages: self.allocated_pages(),
        }
    }

    fn block(&self, index: usize, order: u8) -> Block {
        let offset = BlockTree::position_in_order(index) << (PAGE_SHIFT + u32::from(order));
        #[allow(clippy::cast_possible_truncation)]
        let address = self.base + offset as u32;
        Block {
            index,
            order,
            address,
        }
    }

    /// Take the leftmost free block of `order`.
    ///
    /// # Errors
    /// [`BuddyError::OutOfMemory`] on exhaustion, [`BuddyError::OrderTooLarge`]
    /// if no block of `order` can exist.
    pub fn allocate(&self, order: u8) -> Result<Block, BuddyError> {
        let taken = self.tree.lock_irq(&self.irq).allocate(order);
        let index = taken.inspect_err(|e| warn!("buddy: {e}"))?;

        let block = self.block(index, order);
        trace!("buddy: allocated {block:?}");
        Ok(block)
    }

    /// [`allocate`](Self::allocate), then clear the whole block.
    ///
    /// # Errors
    /// As for [`allocate`](Self::allocate); nothing is written on failure.
    pub fn allocate_zeroed(&self, order: u8) -> Result<Block, BuddyError> {
        let block = self.allocate(order)?;
        for page in 0..block.pages() {
            let ptr = self.mapper.phys_to_ptr(block.address() + (page << PAGE_SHIFT));
            // SAFETY: the block is ours and lies inside the arena.
            unsafe { core::ptr::write_bytes(ptr, 0, PAGE_SIZE as usize) };
        }
        Ok(block)
    }

    /// Return `block` to the allocator, coalescing with its free buddies.
    ///
    /// # Errors
    /// [`BuddyError::NotAllocated`] if the block is not currently allocated
    /// (e.g. freed twice); the tree is left untouched.
    pub fn free(&self, block: Block) -> Result<(), BuddyError> {
        let released = self.tree.lock_irq(&self.irq).free(block.index);
        released.inspect_err(|e| warn!("buddy: rejected free of {block:?}: {e}"))?;

        trace!("buddy: freed {block:?}");
        Ok(())
    }

    /// The block of `order` starting at `address`, for callers that only
    /// kept the address.
    ///
    /// # Errors
    /// - [`BuddyError::OrderTooLarge`] if `order` exceeds the root order.
    /// - [`BuddyError::OutOfArena`] if the block does not lie in the arena.
    /// - [`BuddyError::Misaligned`] if `address` is not a block boundary.
    pub fn block_at(&self, address: PhysicalAddress, order: u8) -> Result<Block, BuddyError> {
        let max_order = self.max_order();
        if order > max_order {
            return Err(BuddyError::OrderTooLarge { order, max_order });
        }

        let Some(offset) = address.as_u32().checked_sub(self.base.as_u32()) else {
            return Err(BuddyError::OutOfArena { address });
        };
        let offset = u64::from(offset);
        if offset + block_size(order) > u64::from(self.pages) << PAGE_SHIFT {
            return Err(BuddyError::OutOfArena { address });
        }
        if offset % block_size(order) != 0 {
            return Err(BuddyError::Misaligned { address });
        }

        #[allow(clippy::cast_possible_truncation)]
        let position = (offset / block_size(order)) as usize;
        let index = (1 << (max_order - order)) - 1 + position;
        Ok(self.block(index, order))
    }
}

/// Reserve every leaf past `pages`, largest aligned blocks first.
fn reserve_tail(tree: &mut BlockTree<'_>, pages: u32) {
    let total = 1_u32 << tree.max_order();
    let mut page = pages;
    while page < total {
        #[allow(clippy::cast_possible_truncation)]
        let order = page.trailing_zeros().min((total - page).ilog2()) as u8;
        tree.reserve(order, (page >> order) as usize);
        page += 1 << order;
    }
}

impl<M: PhysMapper, I: InterruptControl> FrameAlloc for BuddyAllocator<'_, M, I> {
    fn alloc_4k(&self) -> Option<PhysicalPage> {
        self.allocate(0).ok().map(|block| block.page())
    }

    fn free_4k(&self, page: PhysicalPage) {
        if let Err(e) = self
            .block_at(page.base(), 0)
            .and_then(|block| self.free(block))
        {
            error!("buddy: cannot release frame {page}: {e}");
        }
    }
}
