//! ARM PL011 UART driver
//!
//! Polled transmit path only: this UART is the kernel's debug console
//! and panic sink, nothing more. The base address and reference clock
//! come from the platform descriptor.

use crate::arch::mmio;
use core::sync::atomic::{AtomicUsize, Ordering};

// PL011 register offsets
const UART_DR: usize = 0x000;
const UART_FR: usize = 0x018;
const UART_IBRD: usize = 0x024;
const UART_FBRD: usize = 0x028;
const UART_LCRH: usize = 0x02C;
const UART_CR: usize = 0x030;
const UART_ICR: usize = 0x044;

// Flag Register bits
const UART_FR_TXFF: u32 = 1 << 5; // Transmit FIFO Full
const UART_FR_BUSY: u32 = 1 << 3; // UART Busy

// Line Control bits
const UART_LCRH_FEN: u32 = 1 << 4; // FIFO enable
const UART_LCRH_WLEN_8: u32 = 0b11 << 5;

// Control Register bits
const UART_CR_UARTEN: u32 = 1 << 0;
const UART_CR_TXE: u32 = 1 << 8;
const UART_CR_RXE: u32 = 1 << 9;

const BAUD_RATE: u32 = 115_200;

/// Runtime-configured base; zero until [`init`] runs, and writes before
/// that are dropped.
static UART_BASE: AtomicUsize = AtomicUsize::new(0);

/// Combined baud divisor: integer part in bits [21:6], 1/64 fractional
/// part in bits [5:0] (64 * clock / (16 * baud)).
fn baud_divisor(clock_hz: u32) -> u32 {
    4 * clock_hz / BAUD_RATE
}

/// Program the PL011 for 115200-8N1 and enable it.
pub fn init() {
    let desc = crate::platform::active().uart();

    // Disable while reconfiguring, drain any transmit in flight
    mmio::write32(desc.base + UART_CR, 0);
    while mmio::read32(desc.base + UART_FR) & UART_FR_BUSY != 0 {}

    let divisor = baud_divisor(desc.clock_hz);
    mmio::write32(desc.base + UART_IBRD, divisor >> 6);
    mmio::write32(desc.base + UART_FBRD, divisor & 0x3F);

    mmio::write32(desc.base + UART_LCRH, UART_LCRH_WLEN_8 | UART_LCRH_FEN);
    mmio::write32(desc.base + UART_ICR, 0x7FF); // clear stale interrupts
    mmio::write32(
        desc.base + UART_CR,
        UART_CR_UARTEN | UART_CR_TXE | UART_CR_RXE,
    );

    UART_BASE.store(desc.base, Ordering::Release);
}

/// Blocking write of one byte.
pub fn write_byte(byte: u8) {
    let base = UART_BASE.load(Ordering::Acquire);
    if base == 0 {
        return;
    }

    while mmio::read32(base + UART_FR) & UART_FR_TXFF != 0 {
        core::hint::spin_loop();
    }
    mmio::write32(base + UART_DR, byte as u32);
}

/// Blocking write, with LF expanded to CRLF for terminals.
pub fn write_bytes(bytes: &[u8]) {
    for &byte in bytes {
        if byte == b'\n' {
            write_byte(b'\r');
        }
        write_byte(byte);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_divisor_for_48mhz_clock() {
        // 48 MHz / (16 * 115200) = 26 + 2/64
        let divisor = baud_divisor(48_000_000);
        assert_eq!(divisor >> 6, 26);
        assert_eq!(divisor & 0x3F, 2);
    }
}
