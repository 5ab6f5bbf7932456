#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InterruptError {
    #[error("no run of {count} free vectors at or after {base:#x}")]
    VectorUnavailable { base: u8, count: usize },
    #[error("vector {vector:#x} already has the maximum number of handlers")]
    VectorOversubscribed { vector: u8 },
    #[error("core is not dispatching an interrupt")]
    NotInInterrupt,
    #[error("core index {core} is out of range")]
    NoSuchCore { core: usize },
    #[error("no free core slot for APIC ID {apic_id}")]
    CoreTableFull { apic_id: u32 },
}
