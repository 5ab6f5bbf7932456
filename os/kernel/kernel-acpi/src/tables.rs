//! # RSDT/XSDT walk
//!
//! Every ACPI table starts with the same 36-byte header; the root table's
//! payload is an array of physical pointers to the others (4 bytes each in
//! the RSDT, 8 in the XSDT).

use crate::error::{AcpiError, Signature};
use crate::rsdp::AcpiRoots;
use crate::{PhysMapRo, read_u32, read_u64, sum};
use log::{debug, warn};

/// Length of the common System Description Table header.
pub const SDT_HEADER_LEN: usize = 36;

/// Decoded common header of an ACPI table.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SdtHeader {
    pub signature: Signature,
    pub length: u32,
    pub revision: u8,
}

impl SdtHeader {
    /// Reads the header from the first [`SDT_HEADER_LEN`] bytes of `bytes`.
    #[must_use]
    pub fn read(bytes: &[u8]) -> Option<Self> {
        Some(Self {
            signature: Signature(bytes.get(0..4)?.try_into().ok()?),
            length: read_u32(bytes, 4)?,
            revision: *bytes.get(8)?,
        })
    }
}

/// The root table and the mapper used to reach the tables it lists.
pub struct AcpiTables<'m, M: PhysMapRo> {
    map: &'m M,
    root: &'m [u8],
    entry_size: usize,
}

impl<'m, M: PhysMapRo> AcpiTables<'m, M> {
    /// Opens the XSDT if the firmware provides one, the RSDT otherwise.
    ///
    /// # Errors
    /// - [`AcpiError::TableMissing`] if neither root is present.
    /// - [`AcpiError::Checksum`] / [`AcpiError::Malformed`] for a bad root table.
    ///
    /// # Safety
    /// Every address reachable from `roots` must be mappable through `map`.
    pub unsafe fn new(map: &'m M, roots: &AcpiRoots) -> Result<Self, AcpiError> {
        let (addr, entry_size, sig) = match (roots.xsdt_addr, roots.rsdt_addr) {
            (Some(x), _) => (x, 8, *b"XSDT"),
            (None, Some(r)) => (r, 4, *b"RSDT"),
            (None, None) => return Err(AcpiError::TableMissing(Signature(*b"XSDT"))),
        };

        let root = unsafe { map_table(map, addr) }?;
        if root.signature != Signature(sig) {
            return Err(AcpiError::Malformed(Signature(sig)));
        }
        debug!(
            "ACPI root {} at {addr:#x}: {} entries",
            root.signature,
            (root.bytes.len() - SDT_HEADER_LEN) / entry_size
        );

        Ok(Self {
            map,
            root: root.bytes,
            entry_size,
        })
    }

    /// Physical addresses of every table listed in the root.
    pub fn entries(&self) -> impl Iterator<Item = u64> + '_ {
        self.root[SDT_HEADER_LEN..]
            .chunks_exact(self.entry_size)
            .filter_map(|c| match c.len() {
                8 => read_u64(c, 0),
                _ => read_u32(c, 0).map(u64::from),
            })
    }

    /// Returns the bytes of the first table with the given signature and a
    /// valid checksum. Tables that fail the checksum are skipped.
    ///
    /// # Errors
    /// [`AcpiError::TableMissing`] if no valid table carries `signature`.
    pub fn find(&self, signature: [u8; 4]) -> Result<&'m [u8], AcpiError> {
        let wanted = Signature(signature);
        for addr in self.entries().filter(|&a| a != 0) {
            // SAFETY: reachable from the root, see `new`.
            let header = unsafe { self.map.map_ro(addr, SDT_HEADER_LEN) };
            if SdtHeader::read(header).map(|h| h.signature) != Some(wanted) {
                continue;
            }
            match unsafe { map_table(self.map, addr) } {
                Ok(table) => return Ok(table.bytes),
                Err(e) => warn!("Skipping ACPI table: {e}"),
            }
        }
        Err(AcpiError::TableMissing(wanted))
    }
}

struct MappedTable<'m> {
    signature: Signature,
    bytes: &'m [u8],
}

/// Maps a whole table and validates its length and checksum.
unsafe fn map_table<'m>(map: &'m impl PhysMapRo, addr: u64) -> Result<MappedTable<'m>, AcpiError> {
    let header_bytes = unsafe { map.map_ro(addr, SDT_HEADER_LEN) };
    let header = SdtHeader::read(header_bytes).ok_or(AcpiError::Malformed(Signature(*b"????")))?;
    let len = header.length as usize;
    if len < SDT_HEADER_LEN {
        return Err(AcpiError::Malformed(header.signature));
    }

    let bytes = unsafe { map.map_ro(addr, len) };
    if sum(bytes) != 0 {
        return Err(AcpiError::Checksum(header.signature, addr));
    }
    Ok(MappedTable {
        signature: header.signature,
        bytes,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::rsdp::tests::{Blob, rsdp_v2, seal};

    /// A sealed table with the given signature and payload.
    pub fn table(sig: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let len = u32::try_from(SDT_HEADER_LEN + payload.len()).unwrap();
        let mut t = vec![0u8; SDT_HEADER_LEN];
        t[0..4].copy_from_slice(sig);
        t[4..8].copy_from_slice(&len.to_le_bytes());
        t[8] = 1;
        t[10..16].copy_from_slice(b"TESTOE");
        t.extend_from_slice(payload);
        seal(&mut t, 9);
        t
    }

    /// Lays out `blobs` back to back and returns the memory plus their addresses.
    pub fn layout(blobs: &[Vec<u8>], start: usize) -> (Vec<u8>, Vec<u64>) {
        let mut mem = vec![0u8; start];
        let mut addrs = Vec::new();
        for b in blobs {
            addrs.push(mem.len() as u64);
            mem.extend_from_slice(b);
            mem.resize(mem.len().next_multiple_of(16), 0);
        }
        (mem, addrs)
    }

    /// RSDP at 0, XSDT right after it, then `tables`.
    pub fn firmware(tables: &[Vec<u8>]) -> Blob {
        let (body, addrs) = layout(tables, 0);
        let xsdt_len = SDT_HEADER_LEN + 8 * tables.len();
        let base = (36usize.next_multiple_of(16) + xsdt_len).next_multiple_of(16) as u64;

        let payload: Vec<u8> = addrs
            .iter()
            .flat_map(|a| (a + base).to_le_bytes())
            .collect();
        let xsdt = table(b"XSDT", &payload);

        let (mut mem, head) = layout(&[rsdp_v2(0, 48), xsdt], 0);
        assert_eq!(head[1], 48);
        assert_eq!(mem.len() as u64, base);
        mem.extend(body);
        Blob(mem)
    }

    #[test]
    fn finds_tables_by_signature() {
        let fw = firmware(&[table(b"FACP", &[1, 2, 3]), table(b"APIC", &[9; 8])]);
        let roots = unsafe { AcpiRoots::parse(&fw, 0) }.unwrap();
        let tables = unsafe { AcpiTables::new(&fw, &roots) }.unwrap();

        assert_eq!(tables.entries().count(), 2);
        let madt = tables.find(*b"APIC").unwrap();
        assert_eq!(&madt[0..4], b"APIC");
        assert_eq!(&madt[SDT_HEADER_LEN..], &[9; 8]);
        assert_eq!(
            tables.find(*b"HPET"),
            Err(AcpiError::TableMissing(Signature(*b"HPET")))
        );
    }

    #[test]
    fn skips_tables_with_bad_checksums() {
        let mut broken = table(b"APIC", &[1; 4]);
        broken[SDT_HEADER_LEN] ^= 0xFF;
        let fw = firmware(&[broken, table(b"APIC", &[2; 4])]);
        let roots = unsafe { AcpiRoots::parse(&fw, 0) }.unwrap();
        let tables = unsafe { AcpiTables::new(&fw, &roots) }.unwrap();

        assert_eq!(&tables.find(*b"APIC").unwrap()[SDT_HEADER_LEN..], &[2; 4]);
    }

    #[test]
    fn falls_back_to_rsdt() {
        let facp = table(b"FACP", &[]);
        let rsdt = table(b"RSDT", &0x80u32.to_le_bytes());
        let mut mem = vec![0u8; 0x80];
        mem[0x40..0x40 + rsdt.len()].copy_from_slice(&rsdt);
        mem.extend(facp);

        let roots = AcpiRoots {
            rsdp_addr: 0,
            revision: 0,
            xsdt_addr: None,
            rsdt_addr: Some(0x40),
        };
        let fw = Blob(mem);
        let tables = unsafe { AcpiTables::new(&fw, &roots) }.unwrap();
        assert_eq!(tables.entries().collect::<Vec<_>>(), vec![0x80]);
        assert!(tables.find(*b"FACP").is_ok());
    }
}
