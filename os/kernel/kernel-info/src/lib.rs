//! # Kernel Configuration and Boot Interface
//!
//! This crate defines the boot handoff contract and the memory layout constants
//! shared between the loader, the kernel's `build.rs` and the kernel itself.
//!
//! ## Overview
//!
//! The early-boot core consumes exactly two things from whoever loaded it:
//!
//! * a flat **physical memory map** (`{base, length, kind}` triples plus the
//!   total amount of RAM), used once to seed the physical frame allocator, and
//! * the physical address of the **ACPI RSDP**, used to find the MADT.
//!
//! Both travel in [`KernelBootInfo`](boot::KernelBootInfo).
//!
//! ## Virtual Memory Architecture
//!
//! ```text
//! HHDM_BASE             ├─────────────────────────────────┤ 0xffff_8880_0000_0000
//!                       │   Higher Half Direct Mapping    │
//!                       │   (Physical Memory Access)      │
//! KERNEL_BASE           ├─────────────────────────────────┤ 0xffff_ffff_8000_0000
//!                       │       Kernel Text & Data        │
//! 0xFFFF_FFFF_FFFF_FFFF └─────────────────────────────────┘
//! ```
//!
//! All physical memory (including the local APIC and IOAPIC MMIO windows) is
//! reachable at [`HHDM_BASE`](memory::HHDM_BASE)` + pa`. The loader sets that
//! mapping up; this kernel never edits page tables.
//!
//! ## Build Script Integration
//! ```rust
//! use kernel_info::memory::{KERNEL_BASE, PHYS_LOAD};
//!
//! println!("cargo:rustc-link-arg=--defsym=KERNEL_BASE={:#x}", KERNEL_BASE);
//! println!("cargo:rustc-link-arg=--defsym=PHYS_LOAD={:#x}", PHYS_LOAD);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod boot;
pub mod memory;
