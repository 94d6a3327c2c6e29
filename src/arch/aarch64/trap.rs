//! EL1 exception vectors
//!
//! No interrupt controller is wired up yet, so every vector funnels into
//! one diagnostic panic: vector index plus the syndrome, fault address,
//! and return address registers. That turns a stray task fault or an
//! unexpectedly unmasked interrupt into a readable report instead of a
//! wild jump through a reset-value VBAR.

#[cfg(target_arch = "aarch64")]
core::arch::global_asm!(
    r#"
    // 16 vectors, 0x80 bytes apart: {{sync, irq, fiq, serror}} for
    // current-EL/SP0, current-EL/SPx, lower-EL/aarch64, lower-EL/aarch32
    .macro vector_entry index
    .balign 0x80
    mov     x0, #\index
    b       trap_dispatch
    .endm

    .text
    .balign 0x800
    .global exception_vectors
exception_vectors:
    .irp index, 0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15
    vector_entry \index
    .endr

trap_dispatch:
    mrs     x1, esr_el1
    mrs     x2, elr_el1
    mrs     x3, far_el1
    b       handle_exception
    "#
);

/// All vectors land here; the kernel has no recoverable exceptions yet.
#[no_mangle]
extern "C" fn handle_exception(vector: u64, esr: u64, elr: u64, far: u64) -> ! {
    let class = (esr >> 26) & 0x3F;
    panic!(
        "unhandled exception: vector {} class {:#x} esr {:#x} elr {:#x} far {:#x}",
        vector, class, esr, elr, far
    );
}

/// Point VBAR_EL1 at the table. Call once on each CPU, before anything
/// that can fault or take an ERET.
pub fn install_vectors() {
    #[cfg(target_arch = "aarch64")]
    unsafe {
        extern "C" {
            static exception_vectors: u8;
        }
        let base = core::ptr::addr_of!(exception_vectors) as u64;
        core::arch::asm!(
            "msr vbar_el1, {base}",
            "isb",
            base = in(reg) base,
            options(nomem, nostack)
        );
    }
}
