//! # AP trampoline
//!
//! Real-mode code the STARTUP IPI points application processors at. It is
//! assembled into the kernel image, copied to
//! [`AP_TRAMPOLINE_PHYS`] and patched with a parameter block before each AP
//! is started.
//!
//! ```text
//!  +0x00  cli; jmp real_mode
//!  +0x08  GDT: null | 0x08 code64 | 0x10 data | 0x18 code32
//!  +0x28  GDT pointer
//!  +0x30  parameter block: cr3, cr4, stack top, entry
//!   ...   real mode ──► protected mode ──► long mode ──► entry(), on `stack`
//! ```
//!
//! The AP loads the BSP's CR3 while still in 32-bit mode, so the kernel page
//! tables must live below 4 GiB and identity-map the trampoline page.

use kernel_info::memory::{AP_TRAMPOLINE_PHYS, PAGE_SIZE, phys_to_virt};
use log::debug;

core::arch::global_asm!(
    ".pushsection .text.ap_trampoline, \"ax\"",
    ".global ap_trampoline_start",
    ".global ap_trampoline_params",
    ".global ap_trampoline_end",
    ".code16",
    "ap_trampoline_start:",
    "cli",
    "jmp 3f",

    ".balign 8",
    "2:",
    ".quad 0",
    ".quad 0x00AF9A000000FFFF",
    ".quad 0x00CF92000000FFFF",
    ".quad 0x00CF9A000000FFFF",
    "ap_trampoline_gdt_ptr:",
    ".word 31",
    ".long {base} + (2b - ap_trampoline_start)",
    ".balign 8",
    "ap_trampoline_params:",
    "ap_trampoline_cr3: .quad 0",
    "ap_trampoline_cr4: .quad 0",
    "ap_trampoline_stack: .quad 0",
    "ap_trampoline_entry: .quad 0",
    // Intel-syntax memory operands accept only one symbol.
    ".set ap_trampoline_off_gdt_ptr, ap_trampoline_gdt_ptr - ap_trampoline_start",
    ".set ap_trampoline_off_cr4, ap_trampoline_cr4 - ap_trampoline_start",
    ".set ap_trampoline_off_cr3, ap_trampoline_cr3 - ap_trampoline_start",
    ".set ap_trampoline_off_stack, ap_trampoline_stack - ap_trampoline_start",
    ".set ap_trampoline_off_entry, ap_trampoline_entry - ap_trampoline_start",

    "3:",
    "cld",
    "xor ax, ax",
    "mov ds, ax",
    "lgdt [{base} + ap_trampoline_off_gdt_ptr]",
    "mov eax, cr0",
    "or eax, 1",
    "mov cr0, eax",
    // ljmpl 0x18, protected mode
    ".byte 0x66, 0xEA",
    ".long {base} + (4f - ap_trampoline_start)",
    ".word 0x18",

    ".code32",
    "4:",
    "mov ax, 0x10",
    "mov ds, ax",
    "mov es, ax",
    "mov ss, ax",
    "mov eax, dword ptr [{base} + ap_trampoline_off_cr4]",
    // PAE on, PCIDE off until long mode is active.
    "or eax, 0x20",
    "and eax, 0xFFFDFFFF",
    "mov cr4, eax",
    "mov eax, dword ptr [{base} + ap_trampoline_off_cr3]",
    "mov cr3, eax",
    // EFER.LME | EFER.NXE
    "mov ecx, 0xC0000080",
    "rdmsr",
    "or eax, 0x900",
    "wrmsr",
    "mov eax, cr0",
    "or eax, 0x80000001",
    "mov cr0, eax",
    // ljmp 0x08, long mode
    ".byte 0xEA",
    ".long {base} + (5f - ap_trampoline_start)",
    ".word 0x08",

    ".code64",
    "5:",
    "mov ax, 0x10",
    "mov ds, ax",
    "mov es, ax",
    "mov ss, ax",
    "mov rsp, qword ptr [{base} + ap_trampoline_off_stack]",
    "mov rax, qword ptr [{base} + ap_trampoline_off_entry]",
    "xor ebp, ebp",
    "push 0",
    "jmp rax",
    "ap_trampoline_end:",
    ".popsection",
    base = const AP_TRAMPOLINE_PHYS,
);

unsafe extern "C" {
    static ap_trampoline_start: u8;
    static ap_trampoline_params: u8;
    static ap_trampoline_end: u8;
}

/// The block at `ap_trampoline_params`.
#[repr(C)]
struct Params {
    cr3: u64,
    cr4: u64,
    stack_top: u64,
    entry: u64,
}

/// The installed trampoline page.
pub struct Trampoline {
    params: *mut Params,
}

impl Trampoline {
    /// Copies the trampoline to its page and fills in the BSP's paging
    /// state and the AP entry point.
    ///
    /// # Safety
    /// The trampoline page must be reserved, identity-mapped and executable,
    /// and no AP may be running trampoline code.
    pub unsafe fn install(entry: extern "C" fn() -> !) -> Self {
        let start = &raw const ap_trampoline_start;
        let params = &raw const ap_trampoline_params;
        let end = &raw const ap_trampoline_end;

        let len = end as usize - start as usize;
        let params_offset = params as usize - start as usize;
        assert!(len as u64 <= PAGE_SIZE, "AP trampoline exceeds one page");

        #[allow(clippy::cast_possible_truncation)]
        let page = phys_to_virt(AP_TRAMPOLINE_PHYS) as usize as *mut u8;
        let (cr3, cr4) = control_registers();
        let params = unsafe {
            core::ptr::copy_nonoverlapping(start, page, len);
            page.add(params_offset).cast::<Params>()
        };
        unsafe {
            params.write_volatile(Params {
                cr3,
                cr4,
                stack_top: 0,
                entry: entry as usize as u64,
            });
        }
        debug!(
            "AP trampoline: {len} bytes at {AP_TRAMPOLINE_PHYS:#x}, CR3={cr3:#x}, CR4={cr4:#x}"
        );
        Self { params }
    }

    /// Sets the stack the next AP switches to.
    pub fn set_stack(&mut self, top: u64) {
        unsafe { (&raw mut (*self.params).stack_top).write_volatile(top) };
    }
}

fn control_registers() -> (u64, u64) {
    let (cr3, cr4): (u64, u64);
    unsafe {
        core::arch::asm!("mov {}, cr3", out(reg) cr3, options(nomem, nostack, preserves_flags));
        core::arch::asm!("mov {}, cr4", out(reg) cr4, options(nomem, nostack, preserves_flags));
    }
    (cr3, cr4)
}
