//! Assembly boot stub
//!
//! The GPU firmware drops us at `_start` on all four cores with the MMU
//! off and the device-tree pointer in x0. Core 0 gets a stack and a
//! zeroed BSS before `kernel_main` sees the world; the secondaries park
//! in WFE until SMP bring-up exists.

#[cfg(target_arch = "aarch64")]
core::arch::global_asm!(
    r#"
    .section ".text.boot"
    .global _start

_start:
    // All exceptions masked until the kernel decides otherwise
    msr     daifset, #0xf

    // Park everyone but core 0
    mrs     x1, mpidr_el1
    and     x1, x1, #0xFF
    cbz     x1, 2f
1:
    wfe
    b       1b

2:
    ldr     x1, =__kernel_stack_top
    mov     sp, x1

    // Zero BSS; kernel_main's contract says it is already clean
    ldr     x1, =__bss_start
    ldr     x2, =__bss_end
3:
    cmp     x1, x2
    b.ge    4f
    str     xzr, [x1], #8
    b       3b

4:
    // x0 still holds the DTB pointer from firmware
    bl      kernel_main

    // kernel_main never returns; spin if it somehow does
5:
    wfe
    b       5b
    "#
);
