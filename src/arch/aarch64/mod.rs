//! AArch64 CPU primitives
//!
//! Thin wrappers over the system registers the rest of the kernel needs:
//! CPU identification, the DAIF interrupt mask, wait instructions, and
//! data-cache maintenance. Everything compiles to a no-op fallback on
//! non-aarch64 hosts so unit tests build.

pub mod context;
pub mod mmio;
pub mod trap;

/// Index of the executing CPU: the low 8 affinity bits of MPIDR_EL1.
#[inline(always)]
pub fn cpu_index() -> usize {
    #[cfg(target_arch = "aarch64")]
    unsafe {
        let mpidr: u64;
        core::arch::asm!("mrs {}, mpidr_el1", out(reg) mpidr, options(nomem, nostack));
        (mpidr & 0xFF) as usize
    }

    #[cfg(not(target_arch = "aarch64"))]
    {
        0
    }
}

/// Mask IRQ and FIQ on this CPU.
#[inline(always)]
pub fn irq_disable() {
    #[cfg(target_arch = "aarch64")]
    unsafe {
        core::arch::asm!("msr daifset, #3", options(nomem, nostack));
    }
}

/// Unmask IRQ and FIQ on this CPU.
///
/// Tasks start with all interrupts masked (SPSR 0x3C5); a task entry point
/// calls this once it is ready to take interrupts.
#[inline(always)]
pub fn irq_enable() {
    #[cfg(target_arch = "aarch64")]
    unsafe {
        core::arch::asm!("msr daifclr, #3", options(nomem, nostack));
    }
}

/// Save the current DAIF mask state and mask IRQ+FIQ.
///
/// The returned value is opaque; hand it back to [`irq_restore`] only.
#[inline(always)]
pub fn irq_save() -> u64 {
    #[cfg(target_arch = "aarch64")]
    unsafe {
        let daif: u64;
        core::arch::asm!(
            "mrs {}, daif",
            "msr daifset, #3",
            out(reg) daif,
            options(nomem, nostack)
        );
        daif
    }

    #[cfg(not(target_arch = "aarch64"))]
    {
        0
    }
}

/// Restore a DAIF mask state previously returned by [`irq_save`].
#[inline(always)]
pub fn irq_restore(flags: u64) {
    #[cfg(target_arch = "aarch64")]
    unsafe {
        core::arch::asm!("msr daif, {}", in(reg) flags, options(nomem, nostack));
    }

    #[cfg(not(target_arch = "aarch64"))]
    let _ = flags;
}

/// Wait for interrupt.
#[inline(always)]
pub fn wfi() {
    #[cfg(target_arch = "aarch64")]
    unsafe {
        core::arch::asm!("wfi", options(nomem, nostack));
    }
}

/// Wait for event.
#[inline(always)]
pub fn wfe() {
    #[cfg(target_arch = "aarch64")]
    unsafe {
        core::arch::asm!("wfe", options(nomem, nostack));
    }
}

/// Send event to all CPUs.
#[inline(always)]
pub fn sev() {
    #[cfg(target_arch = "aarch64")]
    unsafe {
        core::arch::asm!("sev", options(nomem, nostack));
    }
}

/// Cortex-A72 data cache line size in bytes.
const DCACHE_LINE: usize = 64;

/// Clean and invalidate the data cache for `[start, start + len)`.
///
/// Required before handing Normal (cacheable) memory to a DMA master; the
/// xHCI scratchpad pages are the one user. Buffers in the Device-mapped
/// DMA window never need this.
pub fn clean_dcache_range(start: usize, len: usize) {
    #[cfg(target_arch = "aarch64")]
    unsafe {
        let mut line = start & !(DCACHE_LINE - 1);
        let end = start + len;
        while line < end {
            core::arch::asm!("dc civac, {}", in(reg) line, options(nostack));
            line += DCACHE_LINE;
        }
        core::arch::asm!("dsb sy", options(nostack));
    }

    #[cfg(not(target_arch = "aarch64"))]
    {
        let _ = (start, len);
    }
}
