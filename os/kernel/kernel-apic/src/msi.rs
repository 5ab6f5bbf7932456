//! Message-signalled interrupt encoding for a fixed, edge-triggered
//! interrupt to one core in physical destination mode.

/// The LAPIC message window.
pub const MSI_ADDRESS_BASE: u32 = 0xFEE0_0000;

/// Address bit 3: redirection hint.
const MSI_REDIRECTION_HINT: u32 = 1 << 3;

/// Message address targeting APIC ID `apic_id` (bits 12..20).
#[must_use]
pub const fn msi_address(apic_id: u8) -> u32 {
    MSI_ADDRESS_BASE | (apic_id as u32) << 12 | MSI_REDIRECTION_HINT
}

/// Message data for `vector`, fixed delivery and edge trigger.
#[must_use]
pub const fn msi_data(vector: u8) -> u32 {
    vector as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_layout() {
        assert_eq!(msi_address(0), 0xFEE0_0008);
        assert_eq!(msi_address(3), 0xFEE0_3008);
        assert_eq!(msi_address(0xFF), 0xFEEF_F008);
        assert_eq!(msi_data(0x41), 0x41);
    }
}
