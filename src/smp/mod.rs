//! SMP support
//!
//! The BCM2711 carries four Cortex-A72 cores. Only CPU 0 is brought up
//! by this kernel core; secondaries stay parked in the boot stub until
//! PSCI bring-up lands. The scheduler is per-CPU regardless, so nothing
//! here changes when they arrive.

pub mod ipi;

use core::sync::atomic::{AtomicBool, Ordering};

/// Number of CPUs on the BCM2711.
pub const MAX_CPUS: usize = 4;

static CPU_ONLINE: [AtomicBool; MAX_CPUS] = [
    AtomicBool::new(true), // CPU 0 (boot CPU) is always online
    AtomicBool::new(false),
    AtomicBool::new(false),
    AtomicBool::new(false),
];

pub fn is_cpu_online(cpu: usize) -> bool {
    cpu < MAX_CPUS && CPU_ONLINE[cpu].load(Ordering::Acquire)
}
