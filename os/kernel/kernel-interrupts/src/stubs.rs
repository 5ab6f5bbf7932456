//! Per-vector entry stubs and the shared register save path.
//!
//! Every vector gets a tiny naked stub that evens out the stack (a dummy
//! error code where the CPU does not push one), pushes its vector number and
//! jumps to [`interrupt_common`]. That saves the general purpose registers in
//! [`InterruptFrame`] order and calls into [`INTERRUPTS`].

use crate::INTERRUPTS;
use crate::frame::{InterruptFrame, pushes_error_code};

/// Raw entry point of a stub, as stored in an IDT gate.
pub type StubFn = unsafe extern "C" fn();

macro_rules! make_stub {
    ($vector:literal) => {{
        #[unsafe(naked)]
        unsafe extern "C" fn stub() {
            core::arch::naked_asm!(
                ".if {err} == 0",
                "push 0",
                ".endif",
                "push {vector}",
                "jmp {common}",
                err = const pushes_error_code($vector) as u8,
                vector = const $vector,
                common = sym interrupt_common,
            );
        }
        stub as StubFn
    }};
}

/// Expands to the whole array in one go; a macro in expression position
/// cannot splice a comma-separated list into an outer `[...]`.
macro_rules! make_stub_table {
    ($($vector:literal),* $(,)?) => {
        [$(make_stub!($vector)),*]
    };
}

/// `STUBS[v]` handles vector `v`.
pub static STUBS: [StubFn; 256] = make_stub_table![
    // CPU exceptions
      0,   1,   2,   3,   4,   5,   6,   7,   8,   9,  10,  11,  12,  13,  14,  15,
     16,  17,  18,  19,  20,  21,  22,  23,  24,  25,  26,  27,  28,  29,  30,  31,
    // ISA IRQs after remapping
     32,  33,  34,  35,  36,  37,  38,  39,  40,  41,  42,  43,  44,  45,  46,  47,
     48,  49,  50,  51,  52,  53,  54,  55,  56,  57,  58,  59,  60,  61,  62,  63,
     64,  65,  66,  67,  68,  69,  70,  71,  72,  73,  74,  75,  76,  77,  78,  79,
     80,  81,  82,  83,  84,  85,  86,  87,  88,  89,  90,  91,  92,  93,  94,  95,
     96,  97,  98,  99, 100, 101, 102, 103, 104, 105, 106, 107, 108, 109, 110, 111,
    112, 113, 114, 115, 116, 117, 118, 119, 120, 121, 122, 123, 124, 125, 126, 127,
    128, 129, 130, 131, 132, 133, 134, 135, 136, 137, 138, 139, 140, 141, 142, 143,
    144, 145, 146, 147, 148, 149, 150, 151, 152, 153, 154, 155, 156, 157, 158, 159,
    160, 161, 162, 163, 164, 165, 166, 167, 168, 169, 170, 171, 172, 173, 174, 175,
    176, 177, 178, 179, 180, 181, 182, 183, 184, 185, 186, 187, 188, 189, 190, 191,
    192, 193, 194, 195, 196, 197, 198, 199, 200, 201, 202, 203, 204, 205, 206, 207,
    208, 209, 210, 211, 212, 213, 214, 215, 216, 217, 218, 219, 220, 221, 222, 223,
    224, 225, 226, 227, 228, 229, 230, 231, 232, 233, 234, 235, 236, 237, 238, 239,
    // IPIs, timer, spurious
    240, 241, 242, 243, 244, 245, 246, 247, 248, 249, 250, 251, 252, 253, 254, 255,
];

/// Stub addresses in the form [`Idt::fill`](crate::idt::Idt::fill) takes.
#[must_use]
pub fn stub_addresses() -> [u64; 256] {
    core::array::from_fn(|v| STUBS[v] as usize as u64)
}

/// Shared tail of every stub.
///
/// On entry the stack holds `vector`, `error_code` and the CPU frame. The
/// pushes below complete an [`InterruptFrame`] whose address goes to
/// [`interrupt_entry`]. `rbx` keeps the unaligned stack pointer across the
/// call.
#[unsafe(naked)]
unsafe extern "C" fn interrupt_common() {
    core::arch::naked_asm!(
        "push rax", "push rbx", "push rcx", "push rdx", "push rbp", "push rsi", "push rdi",
        "push r8", "push r9", "push r10", "push r11", "push r12", "push r13", "push r14", "push r15",

        "cld",
        "mov rdi, rsp",
        "mov rbx, rsp",
        "and rsp, -16",
        "call {entry}",
        "mov rsp, rbx",

        "pop r15", "pop r14", "pop r13", "pop r12", "pop r11", "pop r10", "pop r9", "pop r8",
        "pop rdi", "pop rsi", "pop rbp", "pop rdx", "pop rcx", "pop rbx", "pop rax",

        // Drop vector and error code.
        "add rsp, 16",
        "iretq",

        entry = sym interrupt_entry,
    );
}

extern "C" fn interrupt_entry(frame: &mut InterruptFrame) {
    INTERRUPTS.dispatch(frame);
}
