use crate::consts::tokens::WIDE_PAYLOAD_LEN;

use bitfield::bitfield;
use core::fmt;

/// Interface condition payload of R7.
pub type IfCondData = [u8; WIDE_PAYLOAD_LEN];

bitfield! {
    /// Interface condition returned by SEND_IF_COND.
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
    pub struct IfCond(u32);
    impl Debug;
    pub u8, command_version, _: 31, 28;
    pub u8, voltage_accepted_bits, _: 12, 8;
    pub u8, check_pattern, _: 7, 0;
}

impl From<IfCondData> for IfCond {
    fn from(if_cond_data: IfCondData) -> Self {
        IfCond(u32::from_be_bytes(if_cond_data))
    }
}

impl IfCond {
    pub fn voltage_accepted(&self) -> VoltageAccepted {
        VoltageAccepted::from(self.voltage_accepted_bits())
    }
}

/// Voltage range the card accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub enum VoltageAccepted {
    /// 2.7-3.6V.
    Standard,
    /// Low voltage range.
    LowVoltage,
    Reserved1,
    Reserved2,
    /// Any other pattern.
    Undefined(u8),
}

impl From<u8> for VoltageAccepted {
    fn from(bits: u8) -> Self {
        match bits {
            0b0001 => VoltageAccepted::Standard,
            0b0010 => VoltageAccepted::LowVoltage,
            0b0100 => VoltageAccepted::Reserved1,
            0b1000 => VoltageAccepted::Reserved2,
            other => VoltageAccepted::Undefined(other),
        }
    }
}

impl fmt::Display for VoltageAccepted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoltageAccepted::Standard => f.write_str("2.7-3.6V"),
            VoltageAccepted::LowVoltage => f.write_str("low voltage"),
            VoltageAccepted::Reserved1 | VoltageAccepted::Reserved2 => f.write_str("reserved"),
            VoltageAccepted::Undefined(bits) => write!(f, "not defined (0b{:05b})", bits),
        }
    }
}
