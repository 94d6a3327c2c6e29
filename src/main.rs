#![cfg_attr(not(test), no_std)]
#![cfg_attr(not(test), no_main)]
// CI lint gate: when built with `--features strict`, fail on any warning
#![cfg_attr(feature = "strict", deny(warnings))]
#![cfg_attr(feature = "strict", deny(unsafe_op_in_unsafe_fn))]

// Required for heap allocation
extern crate alloc;

// Core library (logging, ring buffer, panic)
#[allow(special_module_name)]
pub mod lib;
// Architecture support (MMIO, CPU registers, context switch)
pub mod arch;
// Spinlock and interrupt-masked critical sections
pub mod sync;
// Memory management (identity page tables, DMA addressing)
pub mod mm;
// Task management and per-CPU scheduling
pub mod process;
// SMP support (CPU topology, inter-processor interrupts)
pub mod smp;
// Device drivers (errors, timeouts, xHCI)
pub mod drivers;
// Platform descriptors (BCM2711 memory map)
pub mod platform;
// Boot phase initialization
pub mod init;
// Generic timer clock and busy-wait delays
pub mod time;
// PL011 UART debug console
pub mod uart;
// Heap allocator
pub mod heap;
// Boot-time scheduler/lock smoke tests
pub mod selftest;

/// Device tree blob pointer handed over by the boot stub (may be null).
#[no_mangle]
pub static mut DTB_PTR: *const u8 = core::ptr::null();

/// First Rust code after the assembly boot stub.
///
/// Entered on CPU 0 at EL1 with the MMU and caches off, a valid stack, and
/// BSS already zeroed. `dtb` is the device-tree pointer from the firmware
/// and may be null.
#[no_mangle]
pub extern "C" fn kernel_main(dtb: *const u8) -> ! {
    unsafe {
        DTB_PTR = dtb;
    }

    uart::init();
    if cfg!(feature = "verbose") {
        lib::printk::set_level(lib::printk::LogLevel::Debug);
    }
    crate::info!("pi4_kernel booting on CPU {}", arch::cpu_index());
    if dtb.is_null() {
        crate::warn!("no device tree from firmware");
    }
    for range in platform::active().ram_ranges() {
        crate::info!(
            "DRAM: {:#x}..{:#x}",
            range.start,
            range.start + range.size
        );
    }
    for range in platform::active().mmio_ranges() {
        crate::info!(
            "MMIO: {:#x}..{:#x}",
            range.start,
            range.start + range.size
        );
    }

    arch::trap::install_vectors();

    // Identity map with Device windows, then caches on. Single core, IRQs
    // still masked from reset.
    unsafe {
        mm::mmu::init();
    }

    heap::init();

    process::scheduler::init();
    process::scheduler::init_cpu(arch::cpu_index());

    // Bring up the VL805 behind the PCIe window. A failed init leaves the
    // controller halted; the kernel carries on without USB.
    match drivers::usb::xhci::init(platform::active().xhci_base()) {
        Ok(summary) => {
            crate::info!(
                "xHCI: running, {} ports, {} slots, {} connected",
                summary.max_ports,
                summary.max_slots,
                summary.connected_ports
            );
        }
        Err(e) => {
            crate::error!("xHCI: init failed: {} (code={})", e.name(), e.code());
        }
    }

    selftest::spawn();

    process::scheduler::enter()
}

#[cfg(not(test))]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    crate::lib::panic::panic_handler(info)
}
