//! Time and delay utilities
//!
//! Timestamps come from the ARM generic timer (CNTPCT_EL0). The counter
//! frequency is firmware-set in CNTFRQ_EL0; if a misconfigured firmware
//! leaves it zero, delays fall back to a calibrated instruction loop,
//! which is inaccurate but good enough for the coarse millisecond-scale
//! timeouts the drivers use.

/// Get current timestamp in microseconds.
pub fn get_timestamp_us() -> u64 {
    #[cfg(target_arch = "aarch64")]
    unsafe {
        let cntpct: u64;
        core::arch::asm!("mrs {}, cntpct_el0", out(reg) cntpct, options(nomem, nostack));

        let cntfrq: u64;
        core::arch::asm!("mrs {}, cntfrq_el0", out(reg) cntfrq, options(nomem, nostack));

        if cntfrq > 0 {
            cntpct.wrapping_mul(1_000_000) / cntfrq
        } else {
            0
        }
    }

    #[cfg(not(target_arch = "aarch64"))]
    {
        0
    }
}

/// Roughly 150 no-ops burn a microsecond on a 1.5 GHz Cortex-A72.
const NOPS_PER_US: u64 = 150;

#[inline(never)]
fn delay_nops(us: u64) {
    for _ in 0..us.saturating_mul(NOPS_PER_US) {
        #[cfg(target_arch = "aarch64")]
        unsafe {
            core::arch::asm!("nop", options(nomem, nostack));
        }
        #[cfg(not(target_arch = "aarch64"))]
        core::hint::spin_loop();
    }
}

/// Busy-wait for `us` microseconds.
pub fn sleep_us(us: u64) {
    let start = get_timestamp_us();
    if start == 0 {
        // Counter frequency not programmed; fall back to counted no-ops
        delay_nops(us);
        return;
    }

    while get_timestamp_us().saturating_sub(start) < us {
        core::hint::spin_loop();
    }
}

/// Busy-wait for `ms` milliseconds.
pub fn sleep_ms(ms: u64) {
    sleep_us(ms * 1000);
}
