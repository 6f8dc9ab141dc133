//! # Kernel Memory Configuration and Boot Interface
//!
//! This crate defines the memory-layout constants and the boot information
//! contract consumed by the physical allocator and the paging core. It is the
//! single source for values that the loader, the allocator and the address
//! space bootstrap must agree on.
//!
//! ## Architecture
//!
//! ### Boot Information ([`boot`])
//! The loader-to-kernel handoff for memory management:
//! * **Arena bounds**: the physical heap `[heap_begin, heap_end)` handed to the
//!   buddy allocator, and `memory_end`, the top of usable physical memory.
//! * **ELF sections**: the kernel image's section descriptors (address, size,
//!   alignment, writable flag), used only to decide which pages of kernel text
//!   are write-protected.
//!
//! ### Memory Layout ([`memory`])
//! Compile-time constants of the 32-bit two-level layout:
//!
//! ```text
//! Physical / identity-mapped kernel view:
//!
//! 0x0000_0000 ┌─────────────────────────────────┐
//!             │  Guard page (never mapped)      │
//! 0x0000_1000 ├─────────────────────────────────┤
//!             │  Low memory, kernel image       │
//! heap_begin  ├─────────────────────────────────┤
//!             │  Buddy node-state metadata      │
//!             ├─────────────────────────────────┤  (page aligned)
//!             │  Buddy block arena              │
//! heap_end    ├─────────────────────────────────┤
//!             │  ...                            │
//! memory_end  └─────────────────────────────────┘
//! ```
//!
//! The kernel address space identity maps `[GUARD_PAGE_END, memory_end)`.

#![cfg_attr(not(any(test, doctest)), no_std)]

pub mod boot;
pub mod memory;
