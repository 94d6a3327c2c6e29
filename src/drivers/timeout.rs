//! Timeout utilities for driver operations
//!
//! Every hardware wait in the tree goes through a bounded [`Timeout`] so
//! a wedged device cannot hang the kernel.

use crate::time;

/// Timeout error
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TimeoutError {
    pub elapsed_us: u64,
    pub timeout_us: u64,
}

impl TimeoutError {
    pub fn new(elapsed_us: u64, timeout_us: u64) -> Self {
        Self {
            elapsed_us,
            timeout_us,
        }
    }
}

/// Timeout context for tracking elapsed time
pub struct Timeout {
    start_us: u64,
    timeout_us: u64,
}

impl Timeout {
    /// Start a timeout of `timeout_us` microseconds.
    pub fn new(timeout_us: u64) -> Self {
        Self {
            start_us: time::get_timestamp_us(),
            timeout_us,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.elapsed_us() >= self.timeout_us
    }

    pub fn elapsed_us(&self) -> u64 {
        time::get_timestamp_us().saturating_sub(self.start_us)
    }

    /// The matching error for an expired timeout.
    pub fn error(&self) -> TimeoutError {
        TimeoutError::new(self.elapsed_us(), self.timeout_us)
    }

    /// Spin until `condition` holds or the timeout expires.
    pub fn wait<F>(&self, mut condition: F) -> Result<(), TimeoutError>
    where
        F: FnMut() -> bool,
    {
        while !condition() {
            if self.is_expired() {
                return Err(self.error());
            }
            core::hint::spin_loop();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_success() {
        let mut calls = 0;
        let result = Timeout::new(1_000_000).wait(|| {
            calls += 1;
            calls >= 3
        });
        assert!(result.is_ok());
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_zero_timeout_expires_immediately() {
        let timeout = Timeout::new(0);
        assert!(timeout.is_expired());
        assert!(timeout.wait(|| false).is_err());
    }
}
