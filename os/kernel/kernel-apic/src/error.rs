#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoutingError {
    #[error("no I/O APIC serves interrupt line {line}")]
    NoController { line: u32 },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SmpError {
    #[error("AP with APIC ID {apic_id} did not start")]
    StartupTimeout { apic_id: u32 },
}
