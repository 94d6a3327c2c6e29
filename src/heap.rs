//! Kernel heap
//!
//! A `linked_list_allocator` heap over the linker-reserved `.heap`
//! region, spinlocked process-wide. Tasks, kernel stacks, and xHCI
//! scratchpad pages all come from here; nothing allocates before
//! [`init`] runs.

use core::sync::atomic::{AtomicBool, Ordering};
use linked_list_allocator::LockedHeap;

#[cfg_attr(not(test), global_allocator)]
#[cfg_attr(test, allow(dead_code))]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

static HEAP_INIT_DONE: AtomicBool = AtomicBool::new(false);

#[cfg(target_arch = "aarch64")]
extern "C" {
    static __heap_start: u8;
    static __heap_end: u8;
}

/// Hand the linker-reserved region to the allocator. Second and later
/// calls are ignored.
pub fn init() {
    if HEAP_INIT_DONE.swap(true, Ordering::SeqCst) {
        return;
    }

    #[cfg(target_arch = "aarch64")]
    unsafe {
        let start = core::ptr::addr_of!(__heap_start) as usize;
        let end = core::ptr::addr_of!(__heap_end) as usize;
        ALLOCATOR.lock().init(start as *mut u8, end - start);
        crate::info!("heap: {} KiB at {:#x}", (end - start) / 1024, start);
    }
}
