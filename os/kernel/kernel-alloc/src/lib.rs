//! # Kernel Physical Memory Allocation
//!
//! Physical pages are handed out by a coalescing extent allocator that needs
//! no heap: its bookkeeping lives in a caller-provided slice carved from the
//! first usable RAM above 1 MiB.
//!
//! ```text
//!   head                         tail
//!    │                             │
//!    ▼                             ▼
//! ┌──────┬──────┬──────┬──────┬──────┬──────┐
//! │ ext  │ ext  │ ext  │ ext  │      │      │   ExtentRing (circular)
//! └──────┴──────┴──────┴──────┴──────┴──────┘
//!   ▲ allocate pops here,          ▲ free pushes here
//!     pushes remainder back
//! ```
//!
//! Each [`Extent`](extent::Extent) packs a page-aligned base and a page count
//! into one `u64`. When the ring fills up, or an allocation scan finds no fit,
//! the ring is sorted by base and adjacent extents are merged.
//!
//! ## Layers
//! * [`extent`]: the packed `(base, pages)` word.
//! * [`ring`]: fixed-capacity deque with in-place compaction.
//! * [`phys`]: [`PhysicalMemory`](phys::PhysicalMemory), the allocator proper.
//! * [`frame_alloc`]: the lock-protected global instance used by the kernel.
//!
//! ## Usage
//! ```rust
//! use kernel_alloc::extent::Extent;
//! use kernel_alloc::phys::{AllocFlags, PhysicalMemory};
//!
//! let mut slots = [Extent::new(); 16];
//! let mut mem = PhysicalMemory::new(&mut slots);
//! mem.free(0x10_0000, 0x4000);
//!
//! let page = mem.allocate(0x1000, AllocFlags::ANY).unwrap();
//! assert_eq!(page, 0x10_0000);
//! mem.free(page, 0x1000);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

pub mod error;
pub mod extent;
pub mod frame_alloc;
pub mod phys;
pub mod ring;

pub use error::FrameAllocError;
pub use phys::{AllocFlags, PhysicalMemory};
