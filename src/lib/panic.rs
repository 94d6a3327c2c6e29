// Kernel panic handler
//
// Emits one diagnostic block on the debug console and parks the CPU in a
// wait-for-interrupt loop. No crash dump, no reboot.

use core::panic::PanicInfo;
use core::sync::atomic::{AtomicBool, Ordering};

/// Global panic state - prevents recursive panics
static PANICKING: AtomicBool = AtomicBool::new(false);

pub fn panic_handler(info: &PanicInfo) -> ! {
    if PANICKING.swap(true, Ordering::SeqCst) {
        // Recursive panic - minimal output and halt
        crate::uart::write_bytes(b"\n!!! RECURSIVE PANIC !!!\n");
        halt();
    }

    crate::arch::irq_disable();

    crate::uart::write_bytes(b"\n!!! KERNEL PANIC \xE2\x80\x94 system halted !!!\n");

    if let Some(location) = info.location() {
        crate::error!(
            "panic at {}:{}: {}",
            location.file(),
            location.line(),
            info.message()
        );
    } else {
        crate::error!("panic: {}", info.message());
    }

    crate::uart::write_bytes(b"--- buffered log ---\n");
    crate::lib::printk::replay_buffered();

    halt()
}

fn halt() -> ! {
    loop {
        crate::arch::wfi();
    }
}
