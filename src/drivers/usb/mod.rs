//! USB host support
//!
//! Only the xHCI controller bring-up lives here; device enumeration and
//! class drivers are a later layer.

pub mod xhci;

/// Port speed as reported in PORTSC bits [13:10].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PortSpeed {
    Full,
    Low,
    High,
    Super,
    Unknown(u8),
}

impl PortSpeed {
    pub fn from_portsc(speed_id: u8) -> Self {
        match speed_id {
            1 => Self::Full,
            2 => Self::Low,
            3 => Self::High,
            4 => Self::Super,
            other => Self::Unknown(other),
        }
    }
}

/// Snapshot of one root-hub port after the power-up scan.
#[derive(Debug, Copy, Clone)]
pub struct PortInfo {
    pub port: u8,
    pub connected: bool,
    pub powered: bool,
    pub speed: PortSpeed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speed_decoding() {
        assert_eq!(PortSpeed::from_portsc(1), PortSpeed::Full);
        assert_eq!(PortSpeed::from_portsc(2), PortSpeed::Low);
        assert_eq!(PortSpeed::from_portsc(3), PortSpeed::High);
        assert_eq!(PortSpeed::from_portsc(4), PortSpeed::Super);
        assert_eq!(PortSpeed::from_portsc(9), PortSpeed::Unknown(9));
    }
}
