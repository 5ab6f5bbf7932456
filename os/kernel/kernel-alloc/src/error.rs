#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameAllocError {
    #[error("out of physical memory ({requested:#x} bytes requested)")]
    OutOfMemory { requested: u64 },
    #[error("zero-sized frame allocation")]
    ZeroSized,
    #[error("physical frame allocator is not initialized")]
    Uninitialized,
}
