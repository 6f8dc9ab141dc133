mod common;

use common::{HEAP, RecordingIrq, TestRam};
use kernel_alloc::buddy::{
    BuddyAllocator, BuddyError, MAX_ORDER, MemoryStats, NodeState, node_count,
};
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, VirtualAddress};
use kernel_vmem::{AddressSpace, FrameAlloc, PageFlags};

fn pa(v: u32) -> PhysicalAddress {
    PhysicalAddress::new(v)
}

/// `pages`-page arena at [`HEAP`] with interrupts initially enabled.
fn arena<'s>(
    ram: &'s TestRam,
    irq: &'s RecordingIrq,
    states: &'s mut Vec<NodeState>,
    pages: u32,
) -> BuddyAllocator<'s, TestRam, &'s RecordingIrq> {
    states.resize(node_count(8), NodeState::Full);
    unsafe { BuddyAllocator::new(ram, irq, states, pa(HEAP), pages) }.unwrap()
}

#[test]
fn eight_pages_in_order_then_exhausted() {
    let ram = TestRam::new(HEAP, 8);
    let irq = RecordingIrq::enabled();
    let mut states = Vec::new();
    let buddy = arena(&ram, &irq, &mut states, 8);
    assert_eq!(buddy.max_order(), 3);

    let blocks: Vec<_> = (0..8).map(|_| buddy.allocate(0).unwrap()).collect();
    for (i, block) in (0_u32..).zip(&blocks) {
        assert_eq!(block.address(), pa(HEAP + i * 4096));
        assert_eq!(block.index(), 7 + i as usize);
    }
    assert_eq!(buddy.allocate(0), Err(BuddyError::OutOfMemory { order: 0 }));

    // third and fourth block are buddies
    buddy.free(blocks[2]).unwrap();
    buddy.free(blocks[3]).unwrap();
    let merged = buddy.allocate(1).unwrap();
    assert_eq!(merged.address(), pa(HEAP + 2 * 4096));
    assert_eq!(merged.pages(), 2);
}

#[test]
fn every_order_holds_exactly_its_share() {
    for order in 0..=3_u8 {
        let ram = TestRam::new(HEAP, 8);
        let irq = RecordingIrq::enabled();
        let mut states = Vec::new();
        let buddy = arena(&ram, &irq, &mut states, 8);

        for _ in 0..(8 >> order) {
            buddy.allocate(order).unwrap();
        }
        assert_eq!(
            buddy.allocate(order),
            Err(BuddyError::OutOfMemory { order }),
            "order {order}"
        );
        assert_eq!(buddy.allocated_pages(), 8);
    }
}

#[test]
fn freed_buddies_coalesce() {
    let ram = TestRam::new(HEAP, 4);
    let irq = RecordingIrq::enabled();
    let mut states = Vec::new();
    let buddy = arena(&ram, &irq, &mut states, 4);

    let a = buddy.allocate(0).unwrap();
    let b = buddy.allocate(0).unwrap();
    let c = buddy.allocate(1).unwrap();
    assert_eq!(buddy.allocate(1), Err(BuddyError::OutOfMemory { order: 1 }));

    buddy.free(b).unwrap();
    buddy.free(a).unwrap();
    let pair = buddy.allocate(1).unwrap();
    assert_eq!(pair.address(), a.address());

    buddy.free(pair).unwrap();
    buddy.free(c).unwrap();
    assert_eq!(buddy.allocate(2).unwrap().address(), pa(HEAP));
}

#[test]
fn double_free_is_rejected() {
    let ram = TestRam::new(HEAP, 4);
    let irq = RecordingIrq::enabled();
    let mut states = Vec::new();
    let buddy = arena(&ram, &irq, &mut states, 4);

    let a = buddy.allocate(0).unwrap();
    let _b = buddy.allocate(0).unwrap();
    buddy.free(a).unwrap();

    assert_eq!(
        buddy.free(a),
        Err(BuddyError::NotAllocated { index: a.index() })
    );
    assert_eq!(buddy.allocated_pages(), 1);
}

#[test]
fn block_at_finds_allocated_blocks() {
    let ram = TestRam::new(HEAP, 8);
    let irq = RecordingIrq::enabled();
    let mut states = Vec::new();
    let buddy = arena(&ram, &irq, &mut states, 8);

    let _ = buddy.allocate(1).unwrap();
    let b = buddy.allocate(1).unwrap();
    assert_eq!(buddy.block_at(b.address(), 1), Ok(b));

    assert_eq!(
        buddy.block_at(pa(HEAP + 0x1000), 1),
        Err(BuddyError::Misaligned {
            address: pa(HEAP + 0x1000)
        })
    );
    assert_eq!(
        buddy.block_at(pa(HEAP - 0x1000), 0),
        Err(BuddyError::OutOfArena {
            address: pa(HEAP - 0x1000)
        })
    );
    assert_eq!(
        buddy.block_at(pa(HEAP + 0x8000), 0),
        Err(BuddyError::OutOfArena {
            address: pa(HEAP + 0x8000)
        })
    );
    assert_eq!(
        buddy.block_at(pa(HEAP), 4),
        Err(BuddyError::OrderTooLarge {
            order: 4,
            max_order: 3
        })
    );

    // a block of the wrong order at a valid address is not an allocation
    let wrong = buddy.block_at(b.address(), 0).unwrap();
    assert_eq!(
        buddy.free(wrong),
        Err(BuddyError::NotAllocated {
            index: wrong.index()
        })
    );
    buddy.free(b).unwrap();
}

#[test]
fn lock_restores_the_prior_interrupt_state() {
    let ram = TestRam::new(HEAP, 2);
    let mut states = Vec::new();

    let on = RecordingIrq::enabled();
    let buddy = arena(&ram, &on, &mut states, 2);
    let block = buddy.allocate(0).unwrap();
    buddy.free(block).unwrap();
    assert!(on.transitions.borrow().chunks(2).all(|c| c == [false, true]));
    drop(buddy);

    let off = RecordingIrq::default();
    let mut states = Vec::new();
    let buddy = arena(&ram, &off, &mut states, 2);
    let _ = buddy.allocate(0).unwrap();
    let _ = buddy.allocate(3);
    assert!(off.transitions.borrow().is_empty());
}

#[test]
fn allocate_zeroed_clears_the_block() {
    let ram = TestRam::new(HEAP, 4);
    let irq = RecordingIrq::enabled();
    let mut states = Vec::new();
    let buddy = arena(&ram, &irq, &mut states, 4);

    let _ = buddy.allocate(0).unwrap();
    let block = buddy.allocate_zeroed(1).unwrap();

    for page in 0..2 {
        let frame = PhysicalPage::from_addr(block.address() + page * 4096);
        assert!(ram.page_bytes(frame).iter().all(|&b| b == 0));
    }
    // untouched neighbour keeps its contents
    assert_eq!(ram.page_bytes(PhysicalPage::from_addr(pa(HEAP)))[0], 0xA5);
}

#[test]
fn failed_zeroed_allocation_writes_nothing() {
    let ram = TestRam::new(HEAP, 2);
    let irq = RecordingIrq::enabled();
    let mut states = Vec::new();
    let buddy = arena(&ram, &irq, &mut states, 2);

    let _ = buddy.allocate(0).unwrap();
    assert_eq!(
        buddy.allocate_zeroed(1),
        Err(BuddyError::OutOfMemory { order: 1 })
    );
    assert_eq!(ram.page_bytes(PhysicalPage::from_addr(pa(HEAP + 4096)))[0], 0xA5);
}

#[test]
fn pages_past_the_arena_are_never_handed_out() {
    let ram = TestRam::new(HEAP, 5);
    let irq = RecordingIrq::enabled();
    let mut states = Vec::new();
    let buddy = arena(&ram, &irq, &mut states, 5);
    assert_eq!(buddy.max_order(), 3);

    assert_eq!(buddy.allocate(3), Err(BuddyError::OutOfMemory { order: 3 }));
    assert_eq!(buddy.allocate(2).unwrap().address(), pa(HEAP));
    assert_eq!(buddy.allocate(0).unwrap().address(), pa(HEAP + 4 * 4096));
    assert_eq!(buddy.allocate(0), Err(BuddyError::OutOfMemory { order: 0 }));
    assert_eq!(buddy.stats().free_pages(), 0);
}

#[test]
fn from_heap_places_states_before_the_arena() {
    let ram = TestRam::new(HEAP, 64);
    let irq = RecordingIrq::enabled();

    let buddy =
        unsafe { BuddyAllocator::from_heap(&ram, &irq, pa(HEAP + 0x10), pa(HEAP + 64 * 4096)) }
            .unwrap();

    // the first page is skipped by alignment, the second holds 127 node states
    assert_eq!(buddy.base(), pa(HEAP + 2 * 4096));
    assert_eq!(buddy.total_pages(), 62);
    assert_eq!(buddy.max_order(), 6);
    assert_eq!(buddy.allocate(0).unwrap().address(), buddy.base());

    let states = ram.page_bytes(PhysicalPage::from_addr(pa(HEAP + 4096)));
    assert!(states[..127].iter().all(|&s| s == 0 || s == 1 || s == 2));
    assert_eq!(states[127], 0xA5);
}

#[test]
fn from_heap_rejects_tiny_heaps() {
    let ram = TestRam::new(HEAP, 2);
    let irq = RecordingIrq::enabled();

    let one_page = unsafe { BuddyAllocator::from_heap(&ram, &irq, pa(HEAP), pa(HEAP + 4096)) };
    assert_eq!(one_page.err(), Some(BuddyError::ArenaTooSmall));

    let inverted = unsafe { BuddyAllocator::from_heap(&ram, &irq, pa(HEAP + 4096), pa(HEAP)) };
    assert_eq!(inverted.err(), Some(BuddyError::ArenaTooSmall));
}

#[test]
fn arena_order_is_bounded_by_the_address_space() {
    let ram = TestRam::new(HEAP, 1);
    let irq = RecordingIrq::enabled();
    let mut states = vec![NodeState::Full; node_count(MAX_ORDER)];

    let whole = unsafe { BuddyAllocator::new(&ram, &irq, &mut states, pa(0), 1 << 20) }.unwrap();
    assert_eq!(whole.max_order(), MAX_ORDER);
    drop(whole);

    let past_end = unsafe { BuddyAllocator::new(&ram, &irq, &mut states, pa(0x1000), 1 << 20) };
    assert_eq!(past_end.err(), Some(BuddyError::ArenaTooSmall));
}

#[test]
fn stats_report_in_kib() {
    let ram = TestRam::new(HEAP, 8);
    let irq = RecordingIrq::enabled();
    let mut states = Vec::new();
    let buddy = arena(&ram, &irq, &mut states, 8);

    let _ = buddy.allocate(1).unwrap();
    let stats = buddy.stats();
    assert_eq!(
        stats,
        MemoryStats {
            total_pages: 8,
            allocated_pages: 2
        }
    );
    assert_eq!(
        stats.to_string(),
        "MemTotal: 32 kB\nMemFree: 24 kB\nMemUsed: 8 kB\n"
    );
}

#[test]
fn frame_alloc_ignores_foreign_frames() {
    let ram = TestRam::new(HEAP, 4);
    let irq = RecordingIrq::enabled();
    let mut states = Vec::new();
    let buddy = arena(&ram, &irq, &mut states, 4);

    let frame = buddy.alloc_4k().unwrap();
    buddy.free_4k(PhysicalPage::from_addr(pa(0x1000)));
    assert_eq!(buddy.allocated_pages(), 1);

    buddy.free_4k(frame);
    assert_eq!(buddy.allocated_pages(), 0);
}

#[test]
fn destroyed_space_blocks_are_reused() {
    let ram = TestRam::new(HEAP, 16);
    let irq = RecordingIrq::enabled();
    let mut states = Vec::new();
    let buddy = arena(&ram, &irq, &mut states, 16);

    let space = AddressSpace::create(&ram, &buddy).unwrap();
    space
        .map(
            &buddy,
            pa(0x0100_0000),
            VirtualAddress::new(0x4000_0000),
            PageFlags::USER | PageFlags::WRITABLE,
        )
        .unwrap();
    let root = space.root_page();
    assert_eq!(buddy.allocated_pages(), 2);

    space.destroy(&buddy);
    assert_eq!(buddy.allocated_pages(), 0);

    let again = AddressSpace::create(&ram, &buddy).unwrap();
    assert_eq!(again.root_page(), root);
    assert!(!again.is_mapped(VirtualAddress::new(0x4000_0000)));
    assert_eq!(buddy.allocate(3).unwrap().address(), pa(HEAP + 8 * 4096));
}
