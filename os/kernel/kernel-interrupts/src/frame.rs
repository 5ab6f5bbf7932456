//! The register image the interrupt stubs build on the stack.

/// CPU state at the moment of the interrupt, lowest address first.
///
/// The common entry pushes the general purpose registers on top of what
/// the per-vector stub (`vector`, `error_code`) and the CPU (`rip` .. `ss`)
/// pushed, so the field order is the reverse of the push order.
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct InterruptFrame {
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub r11: u64,
    pub r10: u64,
    pub r9: u64,
    pub r8: u64,
    pub rdi: u64,
    pub rsi: u64,
    pub rbp: u64,
    pub rdx: u64,
    pub rcx: u64,
    pub rbx: u64,
    pub rax: u64,
    /// Pushed by the stub.
    pub vector: u64,
    /// Pushed by the CPU for some exceptions; zero otherwise.
    pub error_code: u64,
    pub rip: u64,
    pub cs: u64,
    pub rflags: u64,
    pub rsp: u64,
    pub ss: u64,
}

/// A copy of an [`InterruptFrame`], detached from the stack it came from.
pub type RegisterState = InterruptFrame;

/// Offset of `vector` in the frame; the common entry relies on it.
pub const FRAME_VECTOR_OFFSET: usize = 15 * 8;

const _: () = assert!(size_of::<InterruptFrame>() == 22 * 8);
const _: () = assert!(core::mem::offset_of!(InterruptFrame, vector) == FRAME_VECTOR_OFFSET);
const _: () = assert!(core::mem::offset_of!(InterruptFrame, rip) == FRAME_VECTOR_OFFSET + 16);

/// Exceptions for which the CPU pushes an error code.
#[must_use]
pub const fn pushes_error_code(vector: u8) -> bool {
    matches!(vector, 8 | 10..=14 | 17 | 21 | 29 | 30)
}

impl InterruptFrame {
    pub const ZERO: Self = Self {
        r15: 0,
        r14: 0,
        r13: 0,
        r12: 0,
        r11: 0,
        r10: 0,
        r9: 0,
        r8: 0,
        rdi: 0,
        rsi: 0,
        rbp: 0,
        rdx: 0,
        rcx: 0,
        rbx: 0,
        rax: 0,
        vector: 0,
        error_code: 0,
        rip: 0,
        cs: 0,
        rflags: 0,
        rsp: 0,
        ss: 0,
    };

    #[allow(clippy::cast_possible_truncation)]
    #[must_use]
    pub const fn vector(&self) -> u8 {
        self.vector as u8
    }

    /// Requested privilege level of the interrupted code segment.
    #[must_use]
    pub const fn interrupted_ring(&self) -> u8 {
        (self.cs & 3) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_vectors() {
        let with: Vec<u8> = (0..=255).filter(|&v| pushes_error_code(v)).collect();
        assert_eq!(with, vec![8, 10, 11, 12, 13, 14, 17, 21, 29, 30]);
    }

    #[test]
    fn ring_from_cs() {
        let f = InterruptFrame {
            cs: 0x2B,
            ..InterruptFrame::default()
        };
        assert_eq!(f.interrupted_ring(), 3);
    }
}
