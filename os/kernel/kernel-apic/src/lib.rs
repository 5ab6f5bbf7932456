//! # Local APIC, I/O APIC and Interrupt Routing
//!
//! Drives the interrupt hardware behind [`kernel_interrupts`]:
//!
//! - [`LocalApic`](lapic::LocalApic): per-core enable, EOI and IPIs, in
//!   either xAPIC (MMIO) or x2APIC (MSR) mode;
//! - [`InterruptRouter`](routing::InterruptRouter): GSI → I/O APIC pin →
//!   vector, with polarity, trigger mode and mask;
//! - [`smp`]: INIT-SIPI-SIPI bring-up of the application processors;
//! - [`timer`]: the per-core LAPIC timer, periodic or TSC-deadline;
//! - [`msi`] and [`pic`]: MSI message encoding and the legacy 8259 shutdown.
//!
//! ```text
//!  device ──► I/O APIC pin ──redirection entry──► LAPIC (dest) ──► vector ──► IDT
//!                                                   ▲
//!  MSI write to 0xFEE0_0000 | dest << 12 ───────────┘
//! ```
//!
//! Hardware access goes through the [`CpuPlatform`], [`PortIo`] and
//! [`IoApicRegisters`](ioapic::IoApicRegisters) seams; the kernel supplies
//! the instructions and mappings, tests supply fakes.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod error;
pub mod icr;
pub mod ioapic;
pub mod lapic;
pub mod msi;
pub mod pic;
pub mod platform;
pub mod routing;
pub mod smp;
pub mod timer;

pub use error::{RoutingError, SmpError};
pub use icr::DeliveryMode;
pub use lapic::{ApicMode, LocalApic, SPURIOUS_VECTOR};
pub use platform::{CpuPlatform, Delay, PortIo};
pub use routing::{InterruptRouter, Polarity, SharedRouter, TriggerMode, isa_line};
pub use smp::ApReady;
pub use timer::{LvtTimer, TimerMode};
