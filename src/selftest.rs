//! Boot-time scheduler and lock smoke tests
//!
//! Spawned right before the scheduler takes over; the tasks run once
//! CPU 0 enters its idle loop. Covers the paths no host unit test can:
//! first-run entry through the context switch, yield, block/wakeup
//! across PIDs, and spinlock mutual exclusion under real contention.

use crate::process::scheduler;
use crate::process::TaskState;
use crate::sync::SpinLock;
use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

const INCREMENTS: u64 = 10_000;
const LOCKERS: u32 = 2;

static COUNTER: SpinLock<u64> = SpinLock::new(0);
static LOCKERS_DONE: AtomicU32 = AtomicU32::new(0);
static WAITER_PID: AtomicUsize = AtomicUsize::new(0);

extern "C" fn locker_entry() -> ! {
    // Task entry contract: we start with DAIF fully masked and unmask
    // once ready
    crate::arch::irq_enable();

    for _ in 0..INCREMENTS {
        *COUNTER.lock_irqsave() += 1;
    }
    LOCKERS_DONE.fetch_add(1, Ordering::Release);

    scheduler::task_block(TaskState::Zombie);
    unreachable!("zombie task resumed")
}

extern "C" fn waiter_entry() -> ! {
    crate::arch::irq_enable();

    scheduler::task_block(TaskState::Blocked);
    crate::info!("selftest: waiter woken");

    scheduler::task_block(TaskState::Zombie);
    unreachable!("zombie task resumed")
}

extern "C" fn reporter_entry() -> ! {
    crate::arch::irq_enable();

    while LOCKERS_DONE.load(Ordering::Acquire) < LOCKERS {
        scheduler::yield_now();
    }

    let counted = *COUNTER.lock_irqsave();
    if counted == INCREMENTS * LOCKERS as u64 {
        crate::info!("selftest: spinlock counter {} OK", counted);
    } else {
        crate::error!(
            "selftest: spinlock counter {} != {}",
            counted,
            INCREMENTS * LOCKERS as u64
        );
    }

    scheduler::task_wakeup(WAITER_PID.load(Ordering::Acquire));
    scheduler::yield_now();

    crate::info!(
        "selftest: done after {} schedules on CPU {}, xhci initialized: {}",
        scheduler::schedule_count(crate::arch::cpu_index()),
        crate::arch::cpu_index(),
        crate::drivers::usb::xhci::is_initialized()
    );
    scheduler::dump_tasks();

    scheduler::task_block(TaskState::Zombie);
    unreachable!("zombie task resumed")
}

/// Queue up the smoke tasks. They run after `scheduler::enter()`.
pub fn spawn() {
    let spawn_one = |name: &str, entry: extern "C" fn() -> !, priority: u8| {
        match scheduler::task_create(name, entry, priority, 1) {
            Ok(pid) => pid,
            Err(e) => panic!("selftest task '{}' creation failed: {:?}", name, e),
        }
    };

    spawn_one("lock-a", locker_entry, 100);
    spawn_one("lock-b", locker_entry, 100);
    let waiter = spawn_one("waiter", waiter_entry, 120);
    WAITER_PID.store(waiter, Ordering::Release);
    spawn_one("reporter", reporter_entry, 50);
}
