// Kernel logging (printk) with ring buffer
//
// Messages are formatted into a fixed 256-byte record (no heap involved, so
// logging works before the allocator is up) and pushed into a ring buffer
// at every level; the level filter only gates what reaches the UART. The
// panic handler replays the buffer, so DEBUG context from just before a
// crash is not lost.

use super::ringbuf::RingBuffer;
use core::fmt::{self, Write};
use core::sync::atomic::{AtomicU8, Ordering};
use spin::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
        }
    }
}

/// Global log level filter (default: INFO)
static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);

/// Set the global log level
pub fn set_level(level: LogLevel) {
    LOG_LEVEL.store(level as u8, Ordering::Relaxed);
}

/// Get the current log level
pub fn get_level() -> LogLevel {
    match LOG_LEVEL.load(Ordering::Relaxed) {
        0 => LogLevel::Error,
        1 => LogLevel::Warn,
        2 => LogLevel::Info,
        _ => LogLevel::Debug,
    }
}

#[inline]
pub fn is_enabled(level: LogLevel) -> bool {
    level <= get_level()
}

#[derive(Copy, Clone)]
pub struct LogEntry {
    pub timestamp_us: u64,
    pub level: LogLevel,
    pub message: [u8; 256],
    pub len: usize,
}

static KERNEL_LOG: Mutex<RingBuffer<LogEntry, 256>> = Mutex::new(RingBuffer::new());

/// Write every buffered entry to the UART, oldest first. Panic path:
/// must not block on the log lock, so a held lock means no replay.
pub fn replay_buffered() {
    let Some(mut buffer) = KERNEL_LOG.try_lock() else {
        crate::uart::write_bytes(b"(log buffer busy, no replay)\n");
        return;
    };

    let mut writer = UartWriter;
    while let Some(entry) = buffer.pop() {
        let _ = write!(
            writer,
            "  [{:>10}us] [{}] ",
            entry.timestamp_us,
            entry.level.as_str()
        );
        crate::uart::write_bytes(&entry.message[..entry.len]);
        crate::uart::write_bytes(b"\n");
    }
}

struct UartWriter;

impl Write for UartWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        crate::uart::write_bytes(s.as_bytes());
        Ok(())
    }
}

pub fn log(level: LogLevel, args: fmt::Arguments) {
    let mut message: heapless::String<256> = heapless::String::new();
    // Truncation on overflow is fine for a log line
    let _ = write!(message, "{}", args);

    let mut record = [0u8; 256];
    let len = message.len();
    record[..len].copy_from_slice(message.as_bytes());

    KERNEL_LOG.lock().push(LogEntry {
        timestamp_us: crate::time::get_timestamp_us(),
        level,
        message: record,
        len,
    });

    if is_enabled(level) {
        let mut writer = UartWriter;
        let _ = write!(writer, "[{}] {}\n", level.as_str(), message);
    }
}

#[macro_export]
macro_rules! printk {
    ($level:expr, $($arg:tt)*) => {
        $crate::lib::printk::log($level, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        $crate::printk!($crate::lib::printk::LogLevel::Error, $($arg)*)
    };
}

#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        $crate::printk!($crate::lib::printk::LogLevel::Warn, $($arg)*)
    };
}

#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        $crate::printk!($crate::lib::printk::LogLevel::Info, $($arg)*)
    };
}

#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {
        $crate::printk!($crate::lib::printk::LogLevel::Debug, $($arg)*)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(LogLevel::Error < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Debug);
    }

    #[test]
    fn test_level_filter() {
        set_level(LogLevel::Warn);
        assert!(is_enabled(LogLevel::Error));
        assert!(is_enabled(LogLevel::Warn));
        assert!(!is_enabled(LogLevel::Info));
        set_level(LogLevel::Info);
    }
}
