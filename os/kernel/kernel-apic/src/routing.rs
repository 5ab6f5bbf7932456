//! # Interrupt line routing
//!
//! Maps global system interrupts (GSIs) onto I/O APIC pins and programs the
//! matching redirection entries. All lines go to one destination core.

use crate::error::RoutingError;
use crate::icr::DeliveryMode;
use crate::ioapic::{IoApic, IoApicRegisters, RedirectionEntry};
use kernel_acpi::topology::{AcpiTopology, IoApicInfo, IsaOverride, MAX_IO_APICS};
use kernel_sync::SpinMutex;
use log::{debug, info, warn};

/// Vector of GSI 0 in the default identity layout.
pub const IRQ_BASE_VECTOR: u8 = 0x20;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Polarity {
    ActiveHigh,
    ActiveLow,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TriggerMode {
    Edge,
    Level,
}

fn signaling(iso: &IsaOverride) -> (Polarity, TriggerMode) {
    let polarity = if iso.active_low {
        Polarity::ActiveLow
    } else {
        Polarity::ActiveHigh
    };
    let trigger = if iso.level_triggered {
        TriggerMode::Level
    } else {
        TriggerMode::Edge
    };
    (polarity, trigger)
}

/// Where a legacy ISA IRQ arrives: its GSI, polarity and trigger mode.
///
/// Without an override the IRQ number is the GSI and the line is an
/// active-high edge.
#[must_use]
pub fn isa_line(topology: &AcpiTopology, irq: u8) -> (u32, Polarity, TriggerMode) {
    topology
        .isa_overrides()
        .iter()
        .find(|iso| iso.irq == irq)
        .map_or(
            (u32::from(irq), Polarity::ActiveHigh, TriggerMode::Edge),
            |iso| {
                let (polarity, trigger) = signaling(iso);
                (iso.gsi, polarity, trigger)
            },
        )
}

pub struct InterruptRouter<R> {
    ioapics: [Option<IoApic<R>>; MAX_IO_APICS],
    count: usize,
    destination: u32,
}

impl<R: IoApicRegisters> InterruptRouter<R> {
    /// A router without controllers that targets APIC ID `destination`.
    #[must_use]
    pub fn new(destination: u32) -> Self {
        if destination > u32::from(u8::MAX) {
            warn!("APIC ID {destination} does not fit a physical IOAPIC destination");
        }
        Self {
            ioapics: [const { None }; MAX_IO_APICS],
            count: 0,
            destination,
        }
    }

    /// Builds a router for every I/O APIC in `topology` and programs the
    /// default layout, with every line masked:
    ///
    /// - pin `p` of a controller with base `b` gets vector `p + b + 0x20`
    ///   (lines whose vector would exceed 255 are only masked);
    /// - each ISA override sends its GSI to vector `irq + 0x20` with the
    ///   override's polarity and trigger mode.
    ///
    /// `open` provides register access for a controller.
    pub fn init(
        topology: &AcpiTopology,
        destination: u32,
        mut open: impl FnMut(&IoApicInfo) -> R,
    ) -> Self {
        let mut router = Self::new(destination);
        for info in topology.io_apics() {
            router.add(IoApic::new(open(info), info.id, info.gsi_base));
        }

        for i in 0..router.count {
            let Some(io) = router.ioapics[i].as_ref() else {
                continue;
            };
            let (gsi_base, pins) = (io.gsi_base(), io.pins());
            for pin in 0..pins {
                let line = gsi_base + pin;
                let mapped = match u8::try_from(line + u32::from(IRQ_BASE_VECTOR)) {
                    Ok(vector) => {
                        router.map_line(line, vector, Polarity::ActiveHigh, TriggerMode::Edge)
                    }
                    Err(_) => {
                        debug!("GSI {line} has no vector in the default layout");
                        Ok(())
                    }
                };
                if let Err(e) = mapped.and_then(|()| router.set_mask(line, true)) {
                    warn!("{e}");
                }
            }
        }

        for iso in topology.isa_overrides() {
            let vector = iso.irq.saturating_add(IRQ_BASE_VECTOR);
            let (polarity, trigger) = signaling(iso);
            match router
                .map_line(iso.gsi, vector, polarity, trigger)
                .and_then(|()| router.set_mask(iso.gsi, true))
            {
                Ok(()) => info!(
                    "ISA IRQ {} -> GSI {} vector {vector:#x} ({polarity:?}, {trigger:?})",
                    iso.irq, iso.gsi
                ),
                Err(e) => warn!("ISA IRQ {} override skipped: {e}", iso.irq),
            }
        }

        router
    }

    /// Adds a controller. Controllers beyond the fixed capacity are dropped.
    pub fn add(&mut self, ioapic: IoApic<R>) {
        if self.count == MAX_IO_APICS {
            warn!("Ignoring I/O APIC {}; router full", ioapic.id());
            return;
        }
        info!(
            "I/O APIC {}: GSIs {}..{}",
            ioapic.id(),
            ioapic.gsi_base(),
            ioapic.gsi_base() + ioapic.pins()
        );
        self.ioapics[self.count] = Some(ioapic);
        self.count += 1;
    }

    #[must_use]
    pub const fn destination(&self) -> u32 {
        self.destination
    }

    pub fn controllers(&self) -> impl Iterator<Item = &IoApic<R>> {
        self.ioapics[..self.count].iter().flatten()
    }

    /// The controller with the greatest GSI base not above `line`, provided
    /// the line falls within its pins.
    fn owner(&self, line: u32) -> Result<(&IoApic<R>, u32), RoutingError> {
        self.controllers()
            .filter(|io| io.gsi_base() <= line)
            .max_by_key(|io| io.gsi_base())
            .filter(|io| io.serves(line))
            .map(|io| (io, line - io.gsi_base()))
            .ok_or(RoutingError::NoController { line })
    }

    /// Sends `line` to `vector` on the destination core. Fixed delivery,
    /// physical destination. The mask bit is left as it was.
    ///
    /// # Errors
    /// [`RoutingError::NoController`] if no I/O APIC serves the line.
    #[allow(clippy::cast_possible_truncation)]
    pub fn map_line(
        &mut self,
        line: u32,
        vector: u8,
        polarity: Polarity,
        trigger: TriggerMode,
    ) -> Result<(), RoutingError> {
        let destination = self.destination as u8;
        let (io, pin) = self.owner(line)?;
        let old = io.read_entry(pin);
        let entry = RedirectionEntry::new()
            .with_vector(vector)
            .with_delivery_mode(DeliveryMode::Fixed.bits())
            .with_dest_logical(false)
            .with_active_low(polarity == Polarity::ActiveLow)
            .with_level_triggered(trigger == TriggerMode::Level)
            .with_masked(old.masked())
            .with_destination(destination);
        io.write_entry(pin, entry);
        debug!("GSI {line} -> IOAPIC {} pin {pin}, vector {vector:#x}", io.id());
        Ok(())
    }

    /// Sets or clears the mask bit of `line` only.
    ///
    /// # Errors
    /// [`RoutingError::NoController`] if no I/O APIC serves the line.
    pub fn set_mask(&mut self, line: u32, masked: bool) -> Result<(), RoutingError> {
        let (io, pin) = self.owner(line)?;
        let entry = io.read_entry(pin).with_masked(masked);
        io.write_entry(pin, entry);
        Ok(())
    }

    /// The redirection entry behind `line`.
    ///
    /// # Errors
    /// [`RoutingError::NoController`] if no I/O APIC serves the line.
    pub fn entry(&self, line: u32) -> Result<RedirectionEntry, RoutingError> {
        let (io, pin) = self.owner(line)?;
        Ok(io.read_entry(pin))
    }
}

/// A router behind a spinlock, installed once by the boot processor.
///
/// Every access takes the lock with interrupts off. Before
/// [`install`](Self::install) all line operations fail with
/// [`RoutingError::NoController`].
pub struct SharedRouter<R> {
    inner: SpinMutex<Option<InterruptRouter<R>>>,
}

impl<R> Default for SharedRouter<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> SharedRouter<R> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: SpinMutex::new(None),
        }
    }
}

impl<R: IoApicRegisters> SharedRouter<R> {
    /// Stores `router`. A router that is already installed stays; the new
    /// one is handed back.
    ///
    /// # Errors
    /// The rejected router.
    pub fn install(&self, router: InterruptRouter<R>) -> Result<(), InterruptRouter<R>> {
        self.inner.with_lock_irq(|slot| {
            if slot.is_some() {
                return Err(router);
            }
            *slot = Some(router);
            Ok(())
        })
    }

    #[must_use]
    pub fn is_installed(&self) -> bool {
        self.inner.with_lock_irq(|slot| slot.is_some())
    }

    fn with_router<U>(
        &self,
        line: u32,
        f: impl FnOnce(&mut InterruptRouter<R>) -> Result<U, RoutingError>,
    ) -> Result<U, RoutingError> {
        self.inner.with_lock_irq(|slot| match slot {
            Some(router) => f(router),
            None => Err(RoutingError::NoController { line }),
        })
    }

    /// See [`InterruptRouter::map_line`].
    ///
    /// # Errors
    /// [`RoutingError::NoController`] if no router is installed or no
    /// I/O APIC serves the line.
    pub fn map_line(
        &self,
        line: u32,
        vector: u8,
        polarity: Polarity,
        trigger: TriggerMode,
    ) -> Result<(), RoutingError> {
        self.with_router(line, |r| r.map_line(line, vector, polarity, trigger))
    }

    /// See [`InterruptRouter::set_mask`].
    ///
    /// # Errors
    /// As for [`map_line`](Self::map_line).
    pub fn set_mask(&self, line: u32, masked: bool) -> Result<(), RoutingError> {
        self.with_router(line, |r| r.set_mask(line, masked))
    }

    /// # Errors
    /// As for [`map_line`](Self::map_line).
    pub fn entry(&self, line: u32) -> Result<RedirectionEntry, RoutingError> {
        self.with_router(line, |r| r.entry(line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ioapic::tests::FakeIoApic;
    use kernel_acpi::madt::Madt;

    /// A MADT with two I/O APICs (GSI 0..24 and 24..48) and one override
    /// sending ISA IRQ 0 to GSI 2, active-low and level-triggered.
    fn topology() -> AcpiTopology {
        let mut bytes = vec![0u8; 44];
        bytes[0..4].copy_from_slice(b"APIC");
        bytes[36..40].copy_from_slice(&0xFEE0_0000_u32.to_le_bytes());
        for (id, base) in [(0u8, 0u32), (1, 24)] {
            bytes.extend_from_slice(&[1, 12, id, 0]);
            bytes.extend_from_slice(&(0xFEC0_0000 + u32::from(id) * 0x1000).to_le_bytes());
            bytes.extend_from_slice(&base.to_le_bytes());
        }
        bytes.extend_from_slice(&[2, 10, 0, 0]);
        bytes.extend_from_slice(&2u32.to_le_bytes());
        bytes.extend_from_slice(&0b1111u16.to_le_bytes());
        AcpiTopology::from_madt(&Madt::new(&bytes).unwrap()).unwrap()
    }

    fn router<'a>(fakes: &'a [FakeIoApic; 2]) -> InterruptRouter<&'a FakeIoApic> {
        let mut r = InterruptRouter::new(5);
        r.add(IoApic::new(&fakes[0], 0, 0));
        r.add(IoApic::new(&fakes[1], 1, 24));
        r
    }

    #[test]
    fn line_goes_to_the_owning_controller() {
        let fakes = [FakeIoApic::new(24), FakeIoApic::new(24)];
        let mut r = router(&fakes);

        r.map_line(30, 0x50, Polarity::ActiveLow, TriggerMode::Level)
            .unwrap();

        let e = r.entry(30).unwrap();
        assert_eq!(e.vector(), 0x50);
        assert_eq!(e.destination(), 5);
        assert!(e.active_low() && e.level_triggered());
        assert!(e.masked(), "mapping keeps the mask bit");

        // Pin 6 of the second controller; the first one is untouched.
        let regs = fakes[1].regs.lock().unwrap();
        assert_eq!(regs[0x10 + 12] & 0xFF, 0x50);
        assert_eq!(regs[0x10 + 13], 5 << 24);
        drop(regs);
        assert!(fakes[0].regs.lock().unwrap()[0x10 + 12] & 0xFF == 0);
    }

    #[test]
    fn mask_toggles_only_the_mask_bit() {
        let fakes = [FakeIoApic::new(24), FakeIoApic::new(24)];
        let mut r = router(&fakes);
        r.map_line(3, 0x23, Polarity::ActiveHigh, TriggerMode::Edge)
            .unwrap();

        r.set_mask(3, false).unwrap();
        let e = r.entry(3).unwrap();
        assert!(!e.masked());
        assert_eq!(e.vector(), 0x23);

        r.map_line(3, 0x24, Polarity::ActiveHigh, TriggerMode::Edge)
            .unwrap();
        assert!(!r.entry(3).unwrap().masked());
    }

    #[test]
    fn lines_without_a_controller() {
        let fakes = [FakeIoApic::new(24), FakeIoApic::new(16)];
        let mut r = router(&fakes);
        assert_eq!(
            r.map_line(40, 0x40, Polarity::ActiveHigh, TriggerMode::Edge),
            Err(RoutingError::NoController { line: 40 })
        );
        assert_eq!(r.set_mask(48, true), Err(RoutingError::NoController { line: 48 }));

        let mut empty = InterruptRouter::<&FakeIoApic>::new(0);
        assert!(empty.set_mask(0, false).is_err());
    }

    #[test]
    fn default_layout_from_topology() {
        let fakes = [FakeIoApic::new(24), FakeIoApic::new(24)];
        let topo = topology();
        let r = InterruptRouter::init(&topo, 2, |info| &fakes[usize::from(info.id)]);

        assert_eq!(r.controllers().count(), 2);
        for line in 0..48 {
            let e = r.entry(line).unwrap();
            assert!(e.masked(), "line {line} left unmasked");
            assert_eq!(e.destination(), 2);
            if line != 2 && line != 0 {
                assert_eq!(u32::from(e.vector()), line + 0x20);
            }
        }

        let timer = r.entry(2).unwrap();
        assert_eq!(timer.vector(), 0x20);
        assert!(timer.active_low() && timer.level_triggered());
    }

    #[test]
    fn isa_lines_follow_overrides() {
        let topo = topology();
        assert_eq!(
            isa_line(&topo, 0),
            (2, Polarity::ActiveLow, TriggerMode::Level)
        );
        assert_eq!(
            isa_line(&topo, 1),
            (1, Polarity::ActiveHigh, TriggerMode::Edge)
        );
    }

    #[test]
    fn shared_router_rejects_lines_until_installed() {
        let shared = SharedRouter::<&FakeIoApic>::new();
        assert!(!shared.is_installed());
        assert_eq!(
            shared.map_line(1, 0x41, Polarity::ActiveHigh, TriggerMode::Edge),
            Err(RoutingError::NoController { line: 1 })
        );
        assert_eq!(
            shared.set_mask(1, false),
            Err(RoutingError::NoController { line: 1 })
        );
        assert!(shared.entry(1).is_err());
    }

    #[test]
    fn shared_router_programs_the_installed_controllers() {
        let fakes = [FakeIoApic::new(24), FakeIoApic::new(24)];
        let shared = SharedRouter::new();
        assert!(shared.install(router(&fakes)).is_ok());
        assert!(shared.install(router(&fakes)).is_err(), "second router kept");

        shared
            .map_line(1, 0x41, Polarity::ActiveHigh, TriggerMode::Edge)
            .unwrap();
        shared.set_mask(1, false).unwrap();

        let e = shared.entry(1).unwrap();
        assert_eq!(e.vector(), 0x41);
        assert!(!e.masked());
        assert_eq!(fakes[0].regs.lock().unwrap()[0x10 + 2] & 0xFF, 0x41);
        assert_eq!(
            shared.set_mask(60, true),
            Err(RoutingError::NoController { line: 60 })
        );
    }
}
