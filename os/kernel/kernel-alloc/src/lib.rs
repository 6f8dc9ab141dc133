//! # Kernel Physical Allocation and Address Space Bootstrap
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │           Kernel space bootstrap ([`vmm`])          │
//! │    • guard page, identity map, text protection      │
//! │    • activation through CR3 / CR0                   │
//! └─────────────────┬───────────────────────────────────┘
//!                   │ AddressSpace (kernel-vmem)
//! ┌─────────────────▼───────────────────────────────────┐
//! │         Physical mapper ([`phys_mapper`])           │
//! │    • identity: physical address == pointer          │
//! └─────────────────┬───────────────────────────────────┘
//!                   │ FrameAlloc
//! ┌─────────────────▼───────────────────────────────────┐
//! │          Buddy allocator ([`buddy`])                │
//! │    • 2^order-page blocks over one arena             │
//! │    • one spin lock, interrupts off while held       │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Boot order
//!
//! ```rust,no_run
//! # #[cfg(target_arch = "x86")]
//! # fn boot(memory: &kernel_info::boot::MemoryInfo, sections: &[kernel_info::boot::ElfSection]) {
//! use kernel_alloc::buddy::BuddyAllocator;
//! use kernel_alloc::phys_mapper::IdentityPhysMapper;
//! use kernel_alloc::vmm::{CpuPaging, init_kernel_space};
//! use kernel_sync::CpuInterrupts;
//!
//! static MAPPER: IdentityPhysMapper = IdentityPhysMapper;
//! let buddy = unsafe {
//!     BuddyAllocator::from_heap(&MAPPER, CpuInterrupts, memory.heap_begin(), memory.heap_end())
//! }
//! .expect("heap");
//! let kernel = unsafe { init_kernel_space(&MAPPER, &buddy, &CpuPaging, memory, sections) };
//! # let _ = kernel;
//! # }
//! ```
//!
//! The allocator and the kernel space live for the rest of the kernel's
//! lifetime; they are never torn down.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod buddy;
pub mod phys_mapper;
pub mod vmm;

pub use buddy::{Block, BuddyAllocator, BuddyError, MemoryStats};
