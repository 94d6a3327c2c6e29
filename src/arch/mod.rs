// Architecture support

pub mod aarch64;

pub use aarch64::*;
