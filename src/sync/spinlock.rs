//! Exclusive-monitor spinlock
//!
//! A single 32-bit lock word driven by `ldaxr`/`stxr`. The load-acquire
//! pairs with the store-release in the unlock path, so writes made under
//! the lock happen-before reads by the next holder.
//!
//! The acquire loop keeps the loaded value and the store-exclusive status
//! in two separate output operands. Binding both to one variable is a
//! latent bug: `stxr` overwrites the value `ldaxr` just loaded and the
//! loop condition tests garbage.
//!
//! Two rules keep this deadlock-free: never hold a lock across a context
//! switch, and use [`SpinLock::lock_irqsave`] in any path an interrupt
//! handler can also take.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::AtomicU32;

#[cfg(not(target_arch = "aarch64"))]
use core::sync::atomic::Ordering;

/// A spinlock protecting `T`.
pub struct SpinLock<T> {
    word: AtomicU32,
    inner: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for SpinLock<T> {}
unsafe impl<T: Send> Sync for SpinLock<T> {}

fn acquire(word: &AtomicU32) {
    #[cfg(target_arch = "aarch64")]
    unsafe {
        core::arch::asm!(
            "1:",
            "ldaxr {value:w}, [{ptr}]",
            "cbnz  {value:w}, 1b",
            "stxr  {status:w}, {one:w}, [{ptr}]",
            "cbnz  {status:w}, 1b",
            ptr = in(reg) word.as_ptr(),
            one = in(reg) 1u32,
            value = out(reg) _,
            status = out(reg) _,
            options(nostack)
        );
    }

    #[cfg(not(target_arch = "aarch64"))]
    while word
        .compare_exchange_weak(0, 1, Ordering::Acquire, Ordering::Relaxed)
        .is_err()
    {
        core::hint::spin_loop();
    }
}

fn release(word: &AtomicU32) {
    #[cfg(target_arch = "aarch64")]
    unsafe {
        core::arch::asm!(
            "stlr wzr, [{ptr}]",
            ptr = in(reg) word.as_ptr(),
            options(nostack)
        );
    }

    #[cfg(not(target_arch = "aarch64"))]
    word.store(0, Ordering::Release);
}

impl<T> SpinLock<T> {
    pub const fn new(data: T) -> Self {
        Self {
            word: AtomicU32::new(0),
            inner: UnsafeCell::new(data),
        }
    }

    /// Acquire the lock, spinning until it is free.
    ///
    /// Only for code that can never run in interrupt context; everything
    /// else wants [`Self::lock_irqsave`].
    pub fn lock(&self) -> SpinGuard<'_, T> {
        acquire(&self.word);
        SpinGuard { lock: self }
    }

    /// Mask IRQ+FIQ, then acquire the lock.
    ///
    /// Dropping the guard releases the lock first and then restores the
    /// saved mask state, so interrupts stay off for the whole critical
    /// section.
    pub fn lock_irqsave(&self) -> IrqSpinGuard<'_, T> {
        let irq = crate::sync::IrqGuard::new();
        acquire(&self.word);
        IrqSpinGuard { lock: self, _irq: irq }
    }
}

pub struct SpinGuard<'a, T> {
    lock: &'a SpinLock<T>,
}

impl<T> Deref for SpinGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.inner.get() }
    }
}

impl<T> DerefMut for SpinGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.inner.get() }
    }
}

impl<T> Drop for SpinGuard<'_, T> {
    fn drop(&mut self) {
        release(&self.lock.word);
    }
}

pub struct IrqSpinGuard<'a, T> {
    lock: &'a SpinLock<T>,
    /// Field drop runs after the `Drop` body releases the lock, so the
    /// mask restore comes second
    _irq: crate::sync::IrqGuard,
}

impl<T> Deref for IrqSpinGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.inner.get() }
    }
}

impl<T> DerefMut for IrqSpinGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.inner.get() }
    }
}

impl<T> Drop for IrqSpinGuard<'_, T> {
    fn drop(&mut self) {
        release(&self.lock.word);
        // _irq drops after this body, restoring the saved DAIF state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_guards_data() {
        let lock = SpinLock::new(5u32);
        {
            let mut guard = lock.lock();
            *guard += 1;
        }
        assert_eq!(*lock.lock(), 6);
    }

    #[test]
    fn test_word_clear_after_unlock() {
        let lock = SpinLock::new(());
        drop(lock.lock());
        assert_eq!(lock.word.load(core::sync::atomic::Ordering::Relaxed), 0);
    }

    #[test]
    fn test_mutual_exclusion() {
        use std::sync::Arc;

        let lock = Arc::new(SpinLock::new(0u64));
        let mut handles = std::vec::Vec::new();

        for _ in 0..2 {
            let lock = Arc::clone(&lock);
            handles.push(std::thread::spawn(move || {
                for _ in 0..10_000 {
                    *lock.lock() += 1;
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(*lock.lock(), 20_000);
    }
}
