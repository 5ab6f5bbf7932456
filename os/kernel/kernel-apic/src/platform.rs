use kernel_registers::msr::Msr;

/// The CPU services the APIC layer needs from the kernel.
pub trait CpuPlatform: Sync {
    /// CPUID.01h:ECX\[21\].
    fn has_x2apic(&self) -> bool;

    /// # Safety
    /// `msr` must exist on this CPU; the caller runs at CPL0.
    unsafe fn read_msr(&self, msr: Msr) -> u64;

    /// # Safety
    /// As [`read_msr`](Self::read_msr); the write must leave the CPU in a
    /// consistent state.
    unsafe fn write_msr(&self, msr: Msr, value: u64);

    /// Returns a virtual address at which `[phys, phys + len)` is mapped
    /// uncached.
    ///
    /// # Safety
    /// `phys` must be a device register block.
    unsafe fn map_mmio(&self, phys: u64, len: usize) -> usize;
}

/// Port-mapped I/O, for the legacy 8259 pair.
pub trait PortIo {
    /// # Safety
    /// Writing arbitrary ports can reconfigure any legacy device.
    unsafe fn outb(&self, port: u16, value: u8);

    /// # Safety
    /// Reads may have side effects on the device.
    unsafe fn inb(&self, port: u16) -> u8;
}

/// Busy-wait source for timing-sensitive sequences.
pub trait Delay {
    fn delay_us(&self, micros: u64);
}
