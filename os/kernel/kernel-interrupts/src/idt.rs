//! # x86-64 Interrupt Descriptor Table
//!
//! 256 gates of 16 bytes each. Every core owns one table (see
//! [`CoreTable`](crate::cores::CoreTable)); all of them point at the same
//! stubs, so they only differ in where they live.
//!
//! ```text
//!  byte  0..2   offset[15:0]
//!        2..4   selector
//!        4..6   IdtGateAttr (IST, type, DPL, P)
//!        6..8   offset[31:16]
//!        8..12  offset[63:32]
//!       12..16  reserved
//! ```

use bitfield_struct::bitfield;
use core::ops::{Index, IndexMut};

/// Kernel code segment selector the boot GDT places at index 1.
pub const KERNEL_CS: u16 = 0x08;

const _: () = assert!(size_of::<IdtEntry>() == 16);
const _: () = assert!(align_of::<Idt>() == 16);

/// The middle 16 bits of a gate: IST index in the low byte,
/// `| P | DPL(2) | S(0) | Type(4) |` in the high byte.
#[bitfield(u16)]
pub struct IdtGateAttr {
    /// Interrupt Stack Table index; 0 keeps the current stack.
    #[bits(3)]
    pub ist: u8,

    #[bits(5)]
    __zero0: u8,

    /// 0xE = interrupt gate (clears IF), 0xF = trap gate.
    #[bits(4)]
    pub typ: u8,

    /// Must be 0 for interrupt and trap gates.
    #[bits(1)]
    pub s: bool,

    #[bits(2)]
    pub dpl: u8,

    #[bits(1)]
    pub present: bool,
}

impl IdtGateAttr {
    pub const INTERRUPT_GATE: u8 = 0xE;
    pub const TRAP_GATE: u8 = 0xF;

    /// Present, DPL 0 interrupt gate without IST.
    #[must_use]
    pub const fn kernel_interrupt_gate() -> Self {
        Self::new()
            .with_typ(Self::INTERRUPT_GATE)
            .with_s(false)
            .with_dpl(0)
            .with_present(true)
    }
}

#[repr(C, align(16))]
pub struct Idt {
    entries: [IdtEntry; 256],
}

impl Default for Idt {
    fn default() -> Self {
        Self::new()
    }
}

impl Idt {
    /// A table with every gate non-present.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: [IdtEntry::MISSING; 256],
        }
    }

    /// Points every gate at the matching stub address, as a present DPL 0
    /// interrupt gate using `selector`.
    pub fn fill(&mut self, stubs: &[u64; 256], selector: u16) {
        for (entry, &addr) in self.entries.iter_mut().zip(stubs) {
            entry.set_handler_addr(addr).selector(selector);
        }
    }

    /// Load this IDT into the IDTR.
    ///
    /// # Safety
    /// Must run at CPL0 and every present gate must point at valid handler
    /// code in an executable segment.
    #[cfg(target_arch = "x86_64")]
    #[allow(clippy::cast_possible_truncation)]
    pub unsafe fn load(&'static self) {
        let idtr = Idtr {
            limit: (size_of::<Self>() - 1) as u16,
            base: core::ptr::from_ref(self) as u64,
        };
        unsafe {
            core::arch::asm!(
                "lidt [{}]",
                in(reg) &raw const idtr,
                options(nostack, preserves_flags, readonly)
            );
        }
    }
}

impl Index<u8> for Idt {
    type Output = IdtEntry;
    fn index(&self, vector: u8) -> &Self::Output {
        &self.entries[usize::from(vector)]
    }
}

impl IndexMut<u8> for Idt {
    fn index_mut(&mut self, vector: u8) -> &mut Self::Output {
        &mut self.entries[usize::from(vector)]
    }
}

/// Operand format used by `lidt` (limit + base).
#[repr(C, packed)]
struct Idtr {
    limit: u16,
    base: u64,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct IdtEntry {
    offset_lo: u16,
    selector: u16,
    /// Raw [`IdtGateAttr`] bits.
    attr: u16,
    offset_mid: u16,
    offset_hi: u32,
    zero: u32,
}

impl IdtEntry {
    /// A zeroed, non-present entry.
    pub const MISSING: Self = Self {
        offset_lo: 0,
        selector: 0,
        attr: IdtGateAttr::new().into_bits(),
        offset_mid: 0,
        offset_hi: 0,
        zero: 0,
    };

    /// Points the gate at `addr` as a present kernel interrupt gate on
    /// [`KERNEL_CS`]. The returned builder adjusts the defaults.
    #[allow(clippy::cast_possible_truncation)]
    pub const fn set_handler_addr(&mut self, addr: u64) -> IdtEntryBuilder<'_> {
        self.offset_lo = addr as u16;
        self.offset_mid = (addr >> 16) as u16;
        self.offset_hi = (addr >> 32) as u32;
        self.selector = KERNEL_CS;
        self.attr = IdtGateAttr::kernel_interrupt_gate().into_bits();
        IdtEntryBuilder { entry: self }
    }

    #[must_use]
    pub const fn handler_addr(&self) -> u64 {
        (self.offset_lo as u64) | (self.offset_mid as u64) << 16 | (self.offset_hi as u64) << 32
    }

    #[must_use]
    pub const fn selector_value(&self) -> u16 {
        self.selector
    }

    #[must_use]
    pub const fn attributes(&self) -> IdtGateAttr {
        IdtGateAttr::from_bits(self.attr)
    }

    const fn update(&mut self, f: IdtGateAttr) {
        self.attr = f.into_bits();
    }
}

pub struct IdtEntryBuilder<'a> {
    entry: &'a mut IdtEntry,
}

impl IdtEntryBuilder<'_> {
    #[must_use]
    pub const fn present(self, p: bool) -> Self {
        self.entry.update(self.entry.attributes().with_present(p));
        self
    }

    /// Descriptor privilege level; 3 lets user mode `int n` into the gate.
    #[must_use]
    pub fn dpl(self, dpl: u8) -> Self {
        debug_assert!(dpl <= 3);
        self.entry.update(self.entry.attributes().with_dpl(dpl));
        self
    }

    /// Trap gate: IF stays as it was on entry.
    #[must_use]
    pub const fn gate_trap(self) -> Self {
        self.entry.update(self.entry.attributes().with_typ(IdtGateAttr::TRAP_GATE));
        self
    }

    #[must_use]
    pub fn ist(self, idx: u8) -> Self {
        debug_assert!(idx <= 7);
        self.entry.update(self.entry.attributes().with_ist(idx));
        self
    }

    #[allow(clippy::return_self_not_must_use)]
    pub const fn selector(self, sel: u16) -> Self {
        self.entry.selector = sel;
        self
    }
}

/// Read the current CS selector.
#[cfg(target_arch = "x86_64")]
#[must_use]
pub fn current_cs() -> u16 {
    let cs: u16;
    unsafe {
        core::arch::asm!("mov {0:x}, cs", out(reg) cs, options(nomem, nostack, preserves_flags));
    }
    cs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(entry: &IdtEntry) -> [u8; 16] {
        unsafe { core::mem::transmute_copy(entry) }
    }

    #[test]
    fn entry_layout_matches_hardware() {
        let mut e = IdtEntry::MISSING;
        let _ = e.set_handler_addr(0xFFFF_FFFF_8012_3456);

        let b = raw(&e);
        assert_eq!(u16::from_le_bytes([b[0], b[1]]), 0x3456);
        assert_eq!(u16::from_le_bytes([b[2], b[3]]), KERNEL_CS);
        assert_eq!(b[4], 0, "IST");
        assert_eq!(b[5], 0x8E, "P=1 DPL=0 type=0xE");
        assert_eq!(u16::from_le_bytes([b[6], b[7]]), 0x8012);
        assert_eq!(u32::from_le_bytes([b[8], b[9], b[10], b[11]]), 0xFFFF_FFFF);
        assert_eq!(&b[12..], &[0; 4]);
        assert_eq!(e.handler_addr(), 0xFFFF_FFFF_8012_3456);
    }

    #[test]
    fn builder_adjusts_attributes() {
        let mut e = IdtEntry::MISSING;
        let _ = e.set_handler_addr(0x1000).dpl(3).ist(2).gate_trap().selector(0x28);
        assert_eq!(raw(&e)[5], 0xEF);
        assert_eq!(e.attributes().ist(), 2);
        assert_eq!(e.selector_value(), 0x28);

        let _ = e.set_handler_addr(0x1000).present(false);
        assert!(!e.attributes().present());
    }

    #[test]
    fn fill_covers_every_vector() {
        let stubs: [u64; 256] = core::array::from_fn(|i| 0x10_0000 + 16 * i as u64);
        let mut idt = Box::new(Idt::new());
        idt.fill(&stubs, 0x08);
        assert_eq!(idt[0].handler_addr(), 0x10_0000);
        assert_eq!(idt[255].handler_addr(), 0x10_0000 + 16 * 255);
        assert!(idt[128].attributes().present());
        assert_eq!(Idt::new()[7], IdtEntry::MISSING);
    }
}
