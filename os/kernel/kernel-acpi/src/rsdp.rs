//! # RSDP/XSDP (Root/Extended System Description Pointer)

use crate::error::{AcpiError, Signature};
use crate::{PhysMapRo, sum};
use core::ptr;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AcpiRoots {
    pub rsdp_addr: u64,
    pub revision: u8,
    pub xsdt_addr: Option<u64>,
    pub rsdt_addr: Option<u64>,
}

/// ACPI 1.0 Root System Description Pointer (RSDP)
#[derive(Clone, Copy)]
#[repr(C, packed)]
#[allow(dead_code)]
struct Rsdp {
    signature: [u8; 8], // "RSD PTR "
    checksum: u8,       // sum of first 20 bytes == 0
    oem_id: [u8; 6],
    revision: u8, // 0 for ACPI 1.0
    rsdt_addr: u32,
}

/// ACPI 2.0 Extended System Description Pointer (XSDP)
#[derive(Clone, Copy)]
#[repr(C, packed)]
#[allow(dead_code)]
struct Xsdp {
    v1: Rsdp,
    length: u32,
    xsdt_addr: u64,
    ext_checksum: u8, // checksum of entire table
    reserved: [u8; 3],
}

const RSDP_SIGNATURE: &[u8; 8] = b"RSD PTR ";

impl AcpiRoots {
    /// Validate the RSDP/XSDP at the physical address.
    ///
    /// Revision 0 yields only an RSDT. Revision 2 and later additionally
    /// require a valid extended checksum and yield the XSDT.
    ///
    /// # Errors
    /// [`AcpiError::InvalidRsdp`] for a null address, a wrong signature or a
    /// failed checksum.
    ///
    /// # Safety
    /// `rsdp_addr` must point at firmware memory that `map` can map for at
    /// least the advertised structure length.
    #[allow(clippy::similar_names)]
    pub unsafe fn parse(map: &impl PhysMapRo, rsdp_addr: u64) -> Result<Self, AcpiError> {
        let invalid = AcpiError::InvalidRsdp(rsdp_addr);
        if rsdp_addr == 0 {
            return Err(invalid);
        }

        let v1_bytes = unsafe { map.map_ro(rsdp_addr, size_of::<Rsdp>()) };
        if &v1_bytes[0..8] != RSDP_SIGNATURE || sum(v1_bytes) != 0 {
            return Err(invalid);
        }
        let v1 = unsafe { ptr::read_unaligned(v1_bytes.as_ptr().cast::<Rsdp>()) };
        let rsdt_addr = match v1.rsdt_addr {
            0 => None,
            a => Some(u64::from(a)),
        };

        if v1.revision < 2 {
            return Ok(Self {
                rsdp_addr,
                revision: v1.revision,
                xsdt_addr: None,
                rsdt_addr,
            });
        }

        // Need full v2 to read length + xsdt
        let v2_bytes = unsafe { map.map_ro(rsdp_addr, size_of::<Xsdp>()) };
        let v2 = unsafe { ptr::read_unaligned(v2_bytes.as_ptr().cast::<Xsdp>()) };
        let len = v2.length as usize;
        if len < size_of::<Xsdp>() {
            return Err(AcpiError::Malformed(Signature(*b"RSDP")));
        }
        let full = unsafe { map.map_ro(rsdp_addr, len) };
        if sum(full) != 0 {
            return Err(invalid);
        }

        Ok(Self {
            rsdp_addr,
            revision: v1.revision,
            xsdt_addr: (v2.xsdt_addr != 0).then_some(v2.xsdt_addr),
            rsdt_addr,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Physical memory backed by a byte vector; addresses are offsets.
    pub struct Blob(pub Vec<u8>);

    impl PhysMapRo for Blob {
        unsafe fn map_ro<'a>(&self, paddr: u64, len: usize) -> &'a [u8] {
            let at = usize::try_from(paddr).unwrap();
            assert!(at + len <= self.0.len(), "map {paddr:#x}+{len:#x} out of range");
            unsafe { core::slice::from_raw_parts(self.0.as_ptr().add(at), len) }
        }
    }

    /// Patches `bytes[at]` so the whole slice sums to zero.
    pub fn seal(bytes: &mut [u8], at: usize) {
        bytes[at] = 0;
        bytes[at] = 0u8.wrapping_sub(sum(bytes));
    }

    pub fn rsdp_v2(rsdt: u32, xsdt: u64) -> Vec<u8> {
        let mut b = vec![0u8; 36];
        b[0..8].copy_from_slice(RSDP_SIGNATURE);
        b[9..15].copy_from_slice(b"TESTOE");
        b[15] = 2;
        b[16..20].copy_from_slice(&rsdt.to_le_bytes());
        b[20..24].copy_from_slice(&36u32.to_le_bytes());
        b[24..32].copy_from_slice(&xsdt.to_le_bytes());
        seal(&mut b[..20], 8);
        seal(&mut b, 32);
        b
    }

    #[test]
    fn parses_v1_root() {
        let mut b = rsdp_v2(0x1234, 0);
        b[15] = 0;
        seal(&mut b[..20], 8);
        let mut mem = vec![0u8; 0x40];
        mem[0x10..0x10 + 36].copy_from_slice(&b);

        let roots = unsafe { AcpiRoots::parse(&Blob(mem), 0x10) }.unwrap();
        assert_eq!(roots.revision, 0);
        assert_eq!(roots.rsdt_addr, Some(0x1234));
        assert_eq!(roots.xsdt_addr, None);
    }

    #[test]
    fn parses_v2_root() {
        let roots = unsafe { AcpiRoots::parse(&Blob(rsdp_v2(0x1000, 0x2000)), 0) };
        assert_eq!(roots, Err(AcpiError::InvalidRsdp(0)));

        let mut mem = vec![0u8; 8];
        mem.extend(rsdp_v2(0x1000, 0x2000));
        let roots = unsafe { AcpiRoots::parse(&Blob(mem), 8) }.unwrap();
        assert_eq!(roots.xsdt_addr, Some(0x2000));
        assert_eq!(roots.rsdt_addr, Some(0x1000));
    }

    #[test]
    fn rejects_bad_signature_and_checksums() {
        let mut mem = vec![0u8; 8];
        mem.extend(rsdp_v2(0x1000, 0x2000));

        let mut bad_sig = mem.clone();
        bad_sig[8] = b'X';
        assert!(unsafe { AcpiRoots::parse(&Blob(bad_sig), 8) }.is_err());

        let mut bad_v1 = mem.clone();
        bad_v1[8 + 8] ^= 1;
        assert!(unsafe { AcpiRoots::parse(&Blob(bad_v1), 8) }.is_err());

        // Only the extended part is damaged.
        let mut bad_ext = mem;
        bad_ext[8 + 33] = 0x55;
        assert_eq!(
            unsafe { AcpiRoots::parse(&Blob(bad_ext), 8) },
            Err(AcpiError::InvalidRsdp(8))
        );
    }
}
