use core::fmt;

/// A four-character ACPI table signature, printed as text.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Signature(pub [u8; 4]);

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            let c = if b.is_ascii_graphic() || b == b' ' { char::from(b) } else { '?' };
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AcpiError {
    #[error("no valid RSDP at {0:#x}")]
    InvalidRsdp(u64),
    #[error("checksum mismatch in {0} table at {1:#x}")]
    Checksum(Signature, u64),
    #[error("malformed {0} table")]
    Malformed(Signature),
    #[error("ACPI table {0} not found")]
    TableMissing(Signature),
}
