//! Device drivers

pub mod error;
pub mod timeout;
pub mod usb;

pub use error::{DriverError, DriverResult};
