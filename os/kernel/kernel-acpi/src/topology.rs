//! # Interrupt topology registry
//!
//! The MADT condensed into fixed-size arrays, built once during boot and
//! read-only afterwards.

use crate::error::AcpiError;
use crate::madt::{LAPIC_ENABLED, MADT_SIGNATURE, Madt, MadtEntry};
use crate::rsdp::AcpiRoots;
use crate::tables::AcpiTables;
use crate::PhysMapRo;
use kernel_sync::SyncOnceCell;
use log::{debug, info, warn};

pub const MAX_LAPICS: usize = 256;
pub const MAX_IO_APICS: usize = 16;
pub const MAX_ISA_OVERRIDES: usize = 16;

/// MPS INTI flags: polarity is active-low.
const INTI_ACTIVE_LOW: u16 = 1 << 1;

/// MPS INTI flags: trigger mode is level.
const INTI_LEVEL: u16 = 1 << 3;

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct LapicInfo {
    pub processor_id: u32,
    pub apic_id: u32,
    pub enabled: bool,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct IoApicInfo {
    pub id: u8,
    /// Physical MMIO base.
    pub base_addr: u64,
    /// First global system interrupt served by this controller.
    pub gsi_base: u32,
}

/// An ISA IRQ that is not identity-mapped onto a GSI, or not edge/high.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct IsaOverride {
    pub bus: u8,
    pub irq: u8,
    pub gsi: u32,
    pub active_low: bool,
    pub level_triggered: bool,
    /// Index into [`AcpiTopology::io_apics`] of the controller owning `gsi`.
    pub ioapic: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct AcpiTopology {
    lapics: [LapicInfo; MAX_LAPICS],
    lapic_count: usize,
    io_apics: [IoApicInfo; MAX_IO_APICS],
    io_apic_count: usize,
    overrides: [IsaOverride; MAX_ISA_OVERRIDES],
    override_count: usize,
    lapic_base: u64,
    pc_at_compat: bool,
}

impl AcpiTopology {
    const EMPTY: Self = Self {
        lapics: [LapicInfo {
            processor_id: 0,
            apic_id: 0,
            enabled: false,
        }; MAX_LAPICS],
        lapic_count: 0,
        io_apics: [IoApicInfo {
            id: 0,
            base_addr: 0,
            gsi_base: 0,
        }; MAX_IO_APICS],
        io_apic_count: 0,
        overrides: [IsaOverride {
            bus: 0,
            irq: 0,
            gsi: 0,
            active_low: false,
            level_triggered: false,
            ioapic: None,
        }; MAX_ISA_OVERRIDES],
        override_count: 0,
        lapic_base: 0,
        pc_at_compat: false,
    };

    /// Walks RSDP → XSDT/RSDT → MADT and builds the topology.
    ///
    /// # Errors
    /// Any [`AcpiError`] from the walk; a missing MADT is
    /// [`AcpiError::TableMissing`].
    ///
    /// # Safety
    /// See [`AcpiRoots::parse`] and [`AcpiTables::new`].
    pub unsafe fn discover(map: &impl PhysMapRo, rsdp_addr: u64) -> Result<Self, AcpiError> {
        let roots = unsafe { AcpiRoots::parse(map, rsdp_addr) }?;
        info!(
            "ACPI revision {} (RSDP at {rsdp_addr:#x})",
            roots.revision
        );
        let tables = unsafe { AcpiTables::new(map, &roots) }?;
        let madt = Madt::new(tables.find(MADT_SIGNATURE)?)?;
        Self::from_madt(&madt)
    }

    /// Collects LAPIC, IOAPIC and ISA override records.
    ///
    /// Records beyond the fixed capacities are dropped with a warning.
    ///
    /// # Errors
    /// [`AcpiError::Malformed`] if a record cannot be decoded.
    pub fn from_madt(madt: &Madt<'_>) -> Result<Self, AcpiError> {
        let mut topo = Self::EMPTY;
        topo.lapic_base = u64::from(madt.local_apic_addr());
        topo.pc_at_compat = madt.pc_at_compat();

        for entry in madt.entries() {
            match entry? {
                MadtEntry::LocalApic {
                    processor_id,
                    apic_id,
                    flags,
                } => topo.push_lapic(LapicInfo {
                    processor_id: u32::from(processor_id),
                    apic_id: u32::from(apic_id),
                    enabled: flags & LAPIC_ENABLED != 0,
                }),
                MadtEntry::X2Apic {
                    x2apic_id,
                    flags,
                    processor_uid,
                } => topo.push_lapic(LapicInfo {
                    processor_id: processor_uid,
                    apic_id: x2apic_id,
                    enabled: flags & LAPIC_ENABLED != 0,
                }),
                MadtEntry::IoApic {
                    id,
                    address,
                    gsi_base,
                } => topo.push_io_apic(IoApicInfo {
                    id,
                    base_addr: u64::from(address),
                    gsi_base,
                }),
                MadtEntry::InterruptOverride {
                    bus,
                    irq,
                    gsi,
                    flags,
                } => topo.push_override(IsaOverride {
                    bus,
                    irq,
                    gsi,
                    active_low: flags & INTI_ACTIVE_LOW != 0,
                    level_triggered: flags & INTI_LEVEL != 0,
                    ioapic: None,
                }),
                MadtEntry::LocalApicAddressOverride { address } => topo.lapic_base = address,
                MadtEntry::Other { kind, length } => {
                    debug!("MADT: ignoring record type {kind} ({length} bytes)");
                }
            }
        }

        // IOAPIC records may follow the overrides that refer to them.
        for i in 0..topo.override_count {
            let gsi = topo.overrides[i].gsi;
            topo.overrides[i].ioapic = topo.io_apic_for_gsi(gsi);
        }

        info!(
            "MADT: {} local APICs, {} I/O APICs, {} ISA overrides, LAPIC at {:#x}",
            topo.lapic_count, topo.io_apic_count, topo.override_count, topo.lapic_base
        );
        Ok(topo)
    }

    #[must_use]
    pub fn lapics(&self) -> &[LapicInfo] {
        &self.lapics[..self.lapic_count]
    }

    #[must_use]
    pub fn io_apics(&self) -> &[IoApicInfo] {
        &self.io_apics[..self.io_apic_count]
    }

    #[must_use]
    pub fn isa_overrides(&self) -> &[IsaOverride] {
        &self.overrides[..self.override_count]
    }

    /// Local APIC MMIO base, after any address override.
    #[must_use]
    pub const fn lapic_base(&self) -> u64 {
        self.lapic_base
    }

    /// Whether legacy 8259 PICs are present and must be disabled.
    #[must_use]
    pub const fn pc_at_compat(&self) -> bool {
        self.pc_at_compat
    }

    /// The IOAPIC with the greatest `gsi_base` not above `gsi`.
    #[must_use]
    pub fn io_apic_for_gsi(&self, gsi: u32) -> Option<usize> {
        self.io_apics()
            .iter()
            .enumerate()
            .filter(|(_, io)| io.gsi_base <= gsi)
            .max_by_key(|(_, io)| io.gsi_base)
            .map(|(i, _)| i)
    }

    fn push_lapic(&mut self, lapic: LapicInfo) {
        if self.lapic_count == MAX_LAPICS {
            warn!("MADT: dropping local APIC {}; table full", lapic.apic_id);
            return;
        }
        self.lapics[self.lapic_count] = lapic;
        self.lapic_count += 1;
    }

    fn push_io_apic(&mut self, io: IoApicInfo) {
        if self.io_apic_count == MAX_IO_APICS {
            warn!("MADT: dropping I/O APIC {}; table full", io.id);
            return;
        }
        self.io_apics[self.io_apic_count] = io;
        self.io_apic_count += 1;
    }

    fn push_override(&mut self, iso: IsaOverride) {
        if self.override_count == MAX_ISA_OVERRIDES {
            warn!("MADT: dropping override for IRQ {}; table full", iso.irq);
            return;
        }
        self.overrides[self.override_count] = iso;
        self.override_count += 1;
    }
}

static TOPOLOGY: SyncOnceCell<AcpiTopology> = SyncOnceCell::new();

/// Publishes the topology for the rest of the kernel.
///
/// Only the first call stores anything; later calls log a warning and return
/// the topology that is already installed.
pub fn install_topology(topology: AcpiTopology) -> &'static AcpiTopology {
    let mut stored = false;
    let installed = TOPOLOGY.get_or_init(|| {
        stored = true;
        topology
    });
    if !stored {
        warn!("ACPI topology already installed; keeping the first one");
    }
    installed
}

/// The installed topology, if boot has gotten that far.
#[must_use]
pub fn topology() -> Option<&'static AcpiTopology> {
    TOPOLOGY.get()
}
