// Synchronization primitives

mod spinlock;

pub use spinlock::{IrqSpinGuard, SpinGuard, SpinLock};

/// Scoped interrupt mask: construction saves the DAIF state and masks
/// IRQ+FIQ, drop restores. The saved state never leaves the guard.
pub struct IrqGuard {
    flags: u64,
}

impl IrqGuard {
    pub fn new() -> Self {
        Self {
            flags: crate::arch::irq_save(),
        }
    }
}

impl Default for IrqGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for IrqGuard {
    fn drop(&mut self) {
        crate::arch::irq_restore(self.flags);
    }
}
