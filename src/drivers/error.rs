//! Common driver error types

use super::timeout::TimeoutError;

/// Common driver error type
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// Operation timed out
    Timeout(TimeoutError),

    /// Hardware not initialized
    NotInitialized,

    /// Invalid parameter or argument
    InvalidParameter,

    /// Hardware error or fault (e.g. host-system-error raised)
    HardwareError,

    /// Device not found or vanished (register reads return all-ones)
    DeviceNotFound,

    /// Invalid state for operation
    InvalidState,

    /// Allocation failed
    OutOfMemory,
}

impl DriverError {
    /// Get error code for logging
    pub fn code(&self) -> u32 {
        match self {
            Self::Timeout(_) => 1,
            Self::NotInitialized => 2,
            Self::InvalidParameter => 3,
            Self::HardwareError => 4,
            Self::DeviceNotFound => 5,
            Self::InvalidState => 6,
            Self::OutOfMemory => 7,
        }
    }

    /// Get error name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "Timeout",
            Self::NotInitialized => "NotInitialized",
            Self::InvalidParameter => "InvalidParameter",
            Self::HardwareError => "HardwareError",
            Self::DeviceNotFound => "DeviceNotFound",
            Self::InvalidState => "InvalidState",
            Self::OutOfMemory => "OutOfMemory",
        }
    }
}

impl From<TimeoutError> for DriverError {
    fn from(err: TimeoutError) -> Self {
        DriverError::Timeout(err)
    }
}

/// Result type for driver operations
pub type DriverResult<T> = Result<T, DriverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct() {
        let errors = [
            DriverError::Timeout(TimeoutError::new(0, 0)),
            DriverError::NotInitialized,
            DriverError::InvalidParameter,
            DriverError::HardwareError,
            DriverError::DeviceNotFound,
            DriverError::InvalidState,
            DriverError::OutOfMemory,
        ];
        for (i, a) in errors.iter().enumerate() {
            for b in errors.iter().skip(i + 1) {
                assert_ne!(a.code(), b.code());
            }
        }
    }

    #[test]
    fn test_timeout_conversion() {
        let err: DriverError = TimeoutError::new(150, 100).into();
        assert_eq!(err.name(), "Timeout");
    }
}
