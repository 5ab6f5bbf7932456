//! # MADT (Multiple APIC Description Table)
//!
//! After the common header come the local APIC address (`u32` at 36) and
//! flags (`u32` at 40), then a packed list of `{type: u8, length: u8, ...}`
//! records starting at offset 44.

use crate::error::{AcpiError, Signature};
use crate::tables::SDT_HEADER_LEN;
use crate::{read_u16, read_u32, read_u64};

pub const MADT_SIGNATURE: [u8; 4] = *b"APIC";

/// Offset of the first interrupt controller record.
pub const MADT_ENTRIES_OFFSET: usize = SDT_HEADER_LEN + 8;

/// MADT flag: the platform also has dual 8259 PICs.
pub const PCAT_COMPAT: u32 = 1 << 0;

/// Local APIC flag: the processor is usable.
pub const LAPIC_ENABLED: u32 = 1 << 0;

const MALFORMED: AcpiError = AcpiError::Malformed(Signature(MADT_SIGNATURE));

/// One decoded MADT record.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MadtEntry {
    /// Type 0.
    LocalApic {
        processor_id: u8,
        apic_id: u8,
        flags: u32,
    },
    /// Type 1.
    IoApic { id: u8, address: u32, gsi_base: u32 },
    /// Type 2. `flags` holds the MPS INTI polarity (bits 0..2) and trigger
    /// mode (bits 2..4).
    InterruptOverride {
        bus: u8,
        irq: u8,
        gsi: u32,
        flags: u16,
    },
    /// Type 5. Replaces the 32-bit local APIC address in the header.
    LocalApicAddressOverride { address: u64 },
    /// Type 9.
    X2Apic {
        x2apic_id: u32,
        flags: u32,
        processor_uid: u32,
    },
    /// Any record type this kernel does not interpret.
    Other { kind: u8, length: u8 },
}

#[derive(Debug, Copy, Clone)]
pub struct Madt<'a> {
    bytes: &'a [u8],
}

impl<'a> Madt<'a> {
    /// Wraps a validated `"APIC"` table, as returned by
    /// [`AcpiTables::find`](crate::tables::AcpiTables::find).
    ///
    /// # Errors
    /// [`AcpiError::Malformed`] if the table is shorter than its fixed part
    /// or carries another signature.
    pub fn new(bytes: &'a [u8]) -> Result<Self, AcpiError> {
        if bytes.len() < MADT_ENTRIES_OFFSET || bytes[0..4] != MADT_SIGNATURE {
            return Err(MALFORMED);
        }
        Ok(Self { bytes })
    }

    /// 32-bit local APIC MMIO address from the header.
    #[must_use]
    pub fn local_apic_addr(&self) -> u32 {
        read_u32(self.bytes, SDT_HEADER_LEN).unwrap_or_default()
    }

    #[must_use]
    pub fn flags(&self) -> u32 {
        read_u32(self.bytes, SDT_HEADER_LEN + 4).unwrap_or_default()
    }

    #[must_use]
    pub fn pc_at_compat(&self) -> bool {
        self.flags() & PCAT_COMPAT != 0
    }

    /// Decodes the records in table order.
    ///
    /// A record that claims fewer than two bytes, runs past the end of the
    /// table, or is too short for its type yields one
    /// [`AcpiError::Malformed`] and ends the iteration.
    #[must_use]
    pub const fn entries(&self) -> MadtEntries<'a> {
        MadtEntries {
            bytes: self.bytes,
            offset: MADT_ENTRIES_OFFSET,
        }
    }
}

pub struct MadtEntries<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl Iterator for MadtEntries<'_> {
    type Item = Result<MadtEntry, AcpiError>;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = self.bytes.get(self.offset..)?;
        if rest.is_empty() {
            return None;
        }

        let decoded = match rest {
            [kind, length, ..] if *length >= 2 && usize::from(*length) <= rest.len() => {
                decode(*kind, &rest[..usize::from(*length)])
            }
            _ => None,
        };

        match decoded {
            Some(entry) => {
                self.offset += usize::from(rest[1]);
                Some(Ok(entry))
            }
            None => {
                self.offset = self.bytes.len();
                Some(Err(MALFORMED))
            }
        }
    }
}

fn decode(kind: u8, r: &[u8]) -> Option<MadtEntry> {
    Some(match kind {
        0 => MadtEntry::LocalApic {
            processor_id: *r.get(2)?,
            apic_id: *r.get(3)?,
            flags: read_u32(r, 4)?,
        },
        1 => MadtEntry::IoApic {
            id: *r.get(2)?,
            address: read_u32(r, 4)?,
            gsi_base: read_u32(r, 8)?,
        },
        2 => MadtEntry::InterruptOverride {
            bus: *r.get(2)?,
            irq: *r.get(3)?,
            gsi: read_u32(r, 4)?,
            flags: read_u16(r, 8)?,
        },
        5 => MadtEntry::LocalApicAddressOverride {
            address: read_u64(r, 4)?,
        },
        9 => MadtEntry::X2Apic {
            x2apic_id: read_u32(r, 4)?,
            flags: read_u32(r, 8)?,
            processor_uid: read_u32(r, 12)?,
        },
        kind => MadtEntry::Other {
            kind,
            length: r[1],
        },
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::tables::tests::table;

    pub fn lapic(processor_id: u8, apic_id: u8, enabled: bool) -> Vec<u8> {
        let mut r = vec![0, 8, processor_id, apic_id];
        r.extend_from_slice(&u32::from(enabled).to_le_bytes());
        r
    }

    pub fn ioapic(id: u8, address: u32, gsi_base: u32) -> Vec<u8> {
        let mut r = vec![1, 12, id, 0];
        r.extend_from_slice(&address.to_le_bytes());
        r.extend_from_slice(&gsi_base.to_le_bytes());
        r
    }

    pub fn iso(irq: u8, gsi: u32, flags: u16) -> Vec<u8> {
        let mut r = vec![2, 10, 0, irq];
        r.extend_from_slice(&gsi.to_le_bytes());
        r.extend_from_slice(&flags.to_le_bytes());
        r
    }

    pub fn madt(lapic_addr: u32, flags: u32, records: &[Vec<u8>]) -> Vec<u8> {
        let mut payload = lapic_addr.to_le_bytes().to_vec();
        payload.extend_from_slice(&flags.to_le_bytes());
        for r in records {
            payload.extend_from_slice(r);
        }
        table(b"APIC", &payload)
    }

    #[test]
    fn decodes_standard_records() {
        let mut x2 = vec![9, 16, 0, 0];
        for v in [0x1_0000u32, 1, 7] {
            x2.extend_from_slice(&v.to_le_bytes());
        }
        let mut lapic_override = vec![5, 12, 0, 0];
        lapic_override.extend_from_slice(&0xFEE0_0000_u64.to_le_bytes());

        let bytes = madt(
            0xFEE0_0000,
            PCAT_COMPAT,
            &[
                lapic(0, 0, true),
                ioapic(2, 0xFEC0_0000, 0),
                iso(0, 2, 0),
                vec![4, 6, 0xFF, 5, 0, 1], // local APIC NMI, not interpreted
                lapic_override,
                x2,
            ],
        );
        let madt = Madt::new(&bytes).unwrap();
        assert_eq!(madt.local_apic_addr(), 0xFEE0_0000);
        assert!(madt.pc_at_compat());

        let entries: Vec<_> = madt.entries().collect::<Result<_, _>>().unwrap();
        assert_eq!(
            entries,
            vec![
                MadtEntry::LocalApic {
                    processor_id: 0,
                    apic_id: 0,
                    flags: 1
                },
                MadtEntry::IoApic {
                    id: 2,
                    address: 0xFEC0_0000,
                    gsi_base: 0
                },
                MadtEntry::InterruptOverride {
                    bus: 0,
                    irq: 0,
                    gsi: 2,
                    flags: 0
                },
                MadtEntry::Other { kind: 4, length: 6 },
                MadtEntry::LocalApicAddressOverride {
                    address: 0xFEE0_0000
                },
                MadtEntry::X2Apic {
                    x2apic_id: 0x1_0000,
                    flags: 1,
                    processor_uid: 7
                },
            ]
        );
    }

    #[test]
    fn short_record_stops_decoding() {
        let bytes = madt(0, 0, &[lapic(0, 0, true), vec![0, 1], lapic(1, 1, true)]);
        let madt = Madt::new(&bytes).unwrap();
        let got: Vec<_> = madt.entries().collect();
        assert_eq!(got.len(), 2);
        assert!(got[0].is_ok());
        assert_eq!(got[1], Err(MALFORMED));
    }

    #[test]
    fn truncated_record_is_malformed() {
        // An IOAPIC record claiming 12 bytes with only 6 left in the table.
        let bytes = madt(0, 0, &[vec![1, 12, 0, 0, 0, 0]]);
        let got: Vec<_> = Madt::new(&bytes).unwrap().entries().collect();
        assert_eq!(got, vec![Err(MALFORMED)]);

        // A LAPIC record whose length is too small for its fields.
        let bytes = madt(0, 0, &[vec![0, 4, 0, 0]]);
        let got: Vec<_> = Madt::new(&bytes).unwrap().entries().collect();
        assert_eq!(got, vec![Err(MALFORMED)]);
    }

    #[test]
    fn rejects_foreign_tables() {
        assert_eq!(Madt::new(&table(b"FACP", &[0; 8])).unwrap_err(), MALFORMED);
        assert_eq!(Madt::new(&table(b"APIC", &[0; 4])).unwrap_err(), MALFORMED);
    }
}
