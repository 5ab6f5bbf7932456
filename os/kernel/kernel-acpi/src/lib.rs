//! # ACPI Discovery and Interrupt Topology
//!
//! Just enough ACPI to find out how interrupts are wired: locate the root
//! pointer, walk the RSDT/XSDT to a table by signature, decode the MADT, and
//! condense it into an [`AcpiTopology`](topology::AcpiTopology) that the APIC
//! layer consumes.
//!
//! ```text
//! RSDP/XSDP ──► RSDT/XSDT ──► "APIC" (MADT) ──► AcpiTopology
//!                                                 • local APICs
//!                                                 • I/O APICs + GSI bases
//!                                                 • ISA overrides
//! ```
//!
//! Every table is checksum-validated before it is trusted. Firmware memory is
//! reached through [`PhysMapRo`], so the parser does not care whether the
//! kernel uses an identity map or the HHDM.
//!
//! ## Usage
//! ```rust,no_run
//! use kernel_acpi::{PhysMapRo, topology::{self, AcpiTopology}};
//!
//! struct Hhdm;
//! impl PhysMapRo for Hhdm {
//!     unsafe fn map_ro<'a>(&self, paddr: u64, len: usize) -> &'a [u8] {
//!         // Implementation-specific mapping
//!         # unimplemented!()
//!     }
//! }
//!
//! let rsdp_addr = 0x000E_0000; // From the boot info block
//! let topo = unsafe { AcpiTopology::discover(&Hhdm, rsdp_addr) }.unwrap();
//! let topo = topology::install_topology(topo);
//! println!("{} CPUs, {} I/O APICs", topo.lapics().len(), topo.io_apics().len());
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod error;
pub mod madt;
pub mod rsdp;
pub mod tables;
pub mod topology;

pub use error::AcpiError;

/// Map a physical region and return a *read-only* byte slice for its contents.
/// You provide the implementation (identity map, kmap, etc.).
pub trait PhysMapRo {
    /// # Safety
    /// The implementor must ensure the returned slice is valid for `len` bytes.
    unsafe fn map_ro<'a>(&self, paddr: u64, len: usize) -> &'a [u8];
}

fn sum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |a, &b| a.wrapping_add(b))
}

fn read_u16(bytes: &[u8], at: usize) -> Option<u16> {
    Some(u16::from_le_bytes(bytes.get(at..at + 2)?.try_into().ok()?))
}

fn read_u32(bytes: &[u8], at: usize) -> Option<u32> {
    Some(u32::from_le_bytes(bytes.get(at..at + 4)?.try_into().ok()?))
}

fn read_u64(bytes: &[u8], at: usize) -> Option<u64> {
    Some(u64::from_le_bytes(bytes.get(at..at + 8)?.try_into().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_wraps() {
        assert_eq!(sum(&[0xFF, 0x01]), 0);
        assert_eq!(sum(&[0x80, 0x80, 0x05]), 5);
    }

    #[test]
    fn little_endian_reads_are_bounds_checked() {
        let b = [0x34, 0x12, 0x78, 0x56, 1, 0, 0, 0, 0];
        assert_eq!(read_u16(&b, 0), Some(0x1234));
        assert_eq!(read_u32(&b, 0), Some(0x5678_1234));
        assert_eq!(read_u64(&b, 1), Some(0x0156_7812));
        assert_eq!(read_u32(&b, 6), None);
    }
}
