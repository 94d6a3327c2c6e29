//! Context switch primitive
//!
//! The assembly below reads `Task` through its `#[repr(C)]` prefix; the
//! field offsets are pinned by compile-time assertions in
//! `process::task`:
//!
//! ```text
//! 0x00  stack_top       saved kernel SP
//! 0x08  entry           task entry point
//! 0x10  started         0 until the task has run once
//! 0x18  user_stack_top  SP_EL0 to install (0 for kernel tasks)
//! ```
//!
//! A task that has never run is entered with ERET: SP from `stack_top`,
//! ELR_EL1 set to the entry point, and SPSR_EL1 0x3C5 (EL1h, all
//! interrupts masked). The task unmasks interrupts itself once it is
//! ready. A task that has run resumes inside its previous
//! `context_switch` call with the callee-saved registers restored.
//!
//! x9/x10 are the only scratch registers; everything else is either
//! callee-saved (and spilled here) or dead across the call boundary.

use crate::process::task::Task;

#[cfg(target_arch = "aarch64")]
core::arch::global_asm!(
    r#"
    .text
    .global _context_switch
_context_switch:
    // x0 = prev Task* (may be null), x1 = next Task*
    cbz     x0, 1f

    // Spill callee-saved registers onto prev's kernel stack
    stp     x29, x30, [sp, #-0x10]!
    stp     x27, x28, [sp, #-0x10]!
    stp     x25, x26, [sp, #-0x10]!
    stp     x23, x24, [sp, #-0x10]!
    stp     x21, x22, [sp, #-0x10]!
    stp     x19, x20, [sp, #-0x10]!
    mov     x9, sp
    str     x9, [x0, #0x00]     // prev->stack_top = sp
    mov     x10, #1
    str     x10, [x0, #0x10]    // prev->started = 1

1:
    ldr     x9, [x1, #0x10]     // next->started
    cbz     x9, 2f

    // Resume: unwind the frame saved above
    ldr     x9, [x1, #0x00]
    mov     sp, x9
    ldp     x19, x20, [sp], #0x10
    ldp     x21, x22, [sp], #0x10
    ldp     x23, x24, [sp], #0x10
    ldp     x25, x26, [sp], #0x10
    ldp     x27, x28, [sp], #0x10
    ldp     x29, x30, [sp], #0x10
    ret

2:
    // First run: enter the task at its entry point via exception return
    ldr     x9, [x1, #0x00]     // fresh kernel stack top
    mov     sp, x9
    ldr     x9, [x1, #0x18]
    msr     sp_el0, x9
    ldr     x9, [x1, #0x08]
    msr     elr_el1, x9
    mov     x9, #0x3c5          // EL1h, DAIF masked
    msr     spsr_el1, x9
    eret
    "#
);

#[cfg(target_arch = "aarch64")]
extern "C" {
    #[allow(improper_ctypes)]
    fn _context_switch(prev: *mut Task, next: *mut Task);
}

/// Switch from `prev` (null on the very first switch) to `next`.
///
/// # Safety
///
/// `next` must point to a valid task with a usable stack, interrupts must
/// be masked, and no spinlock may be held across the call.
pub unsafe fn context_switch(prev: *mut Task, next: *mut Task) {
    #[cfg(target_arch = "aarch64")]
    unsafe {
        _context_switch(prev, next);
    }

    #[cfg(not(target_arch = "aarch64"))]
    {
        let _ = (prev, next);
        unimplemented!("context switch only exists on aarch64");
    }
}
