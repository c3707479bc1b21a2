use crate::{
    consts::tokens::{IDLE_FILL, WIDE_PAYLOAD_LEN},
    if_cond::IfCond,
    ocr::Ocr,
};

use bitfield::bitfield;
use core::fmt;

bitfield! {
    /// R1 response bitset.
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
    pub struct R1Response(u8);
    impl Debug;
    pub in_idle_state, _: 0;
    pub erase_reset, _: 1;
    pub illegal_command, _: 2;
    pub command_crc_error, _: 3;
    pub erase_sequence_error, _: 4;
    pub address_error, _: 5;
    pub parameter_error, _: 6;
    start_bit, _: 7;
}

impl From<u8> for R1Response {
    fn from(r1: u8) -> Self {
        R1Response(r1)
    }
}

impl R1Response {
    /// Card finished initialization.
    pub const READY_STATE: R1Response = R1Response(0x00);
    /// Card is idle, no error flags.
    pub const IN_IDLE_STATE: R1Response = R1Response(0x01);
    /// Nothing but idle-fill was read.
    pub const NO_RESPONSE: R1Response = R1Response(IDLE_FILL);

    pub fn bits(&self) -> u8 {
        self.0
    }

    /// A real R1 always has its most significant bit cleared.
    pub fn is_valid(&self) -> bool {
        !self.start_bit()
    }

    /// Any bit beyond the idle flag is set, including a missing response.
    pub fn has_error(&self) -> bool {
        self.0 > Self::IN_IDLE_STATE.0
    }

    /// Set flags with their labels, most significant first.
    fn flags(&self) -> impl Iterator<Item = &'static str> + '_ {
        [
            (self.parameter_error(), "Parameter Error"),
            (self.address_error(), "Address Error"),
            (self.erase_sequence_error(), "Erase Sequence Error"),
            (self.command_crc_error(), "CRC Error"),
            (self.illegal_command(), "Illegal Command"),
            (self.erase_reset(), "Erase Reset Error"),
            (self.in_idle_state(), "In Idle State"),
        ]
        .into_iter()
        .filter_map(|(set, label)| set.then_some(label))
    }
}

impl fmt::Display for R1Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_valid() {
            return write!(f, "0x{:02X} Error: MSB = 1", self.0);
        }

        write!(f, "0x{:02X} ", self.0)?;

        if *self == Self::READY_STATE {
            return f.write_str("Card Ready");
        }

        for (i, label) in self.flags().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(label)?;
        }

        Ok(())
    }
}

/// R3 or R7: R1 followed by a 4-byte payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub struct WideResponse {
    pub r1: R1Response,
    /// `None` when R1 reported an error and the payload was never read.
    pub payload: Option<[u8; WIDE_PAYLOAD_LEN]>,
}

impl WideResponse {
    /// Decodes the payload of R3.
    pub fn operating_conditions(&self) -> Option<Ocr> {
        self.payload.map(Ocr::from)
    }

    /// Decodes the payload of R7.
    pub fn interface_conditions(&self) -> Option<IfCond> {
        self.payload.map(IfCond::from)
    }

    /// Response as the five bytes it arrived as, payload zeroed if absent.
    pub fn to_bytes(&self) -> [u8; 1 + WIDE_PAYLOAD_LEN] {
        let payload = self.payload.unwrap_or_default();
        [self.r1.0, payload[0], payload[1], payload[2], payload[3]]
    }
}

/// Response of a single command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub enum Response {
    R1(R1Response),
    R3OrR7(WideResponse),
}

impl Response {
    /// Leading R1 of any response.
    pub fn r1(&self) -> R1Response {
        match self {
            Response::R1(r1) => *r1,
            Response::R3OrR7(wide) => wide.r1,
        }
    }

    /// Widens an R1 with an absent payload.
    pub fn into_wide(self) -> WideResponse {
        match self {
            Response::R1(r1) => WideResponse { r1, payload: None },
            Response::R3OrR7(wide) => wide,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_flag_is_one_bit() {
        let flags: [fn(&R1Response) -> bool; 7] = [
            R1Response::in_idle_state,
            R1Response::erase_reset,
            R1Response::illegal_command,
            R1Response::command_crc_error,
            R1Response::erase_sequence_error,
            R1Response::address_error,
            R1Response::parameter_error,
        ];

        for (bit, _) in flags.iter().enumerate() {
            let r1 = R1Response(1 << bit);
            for (other, flag) in flags.iter().enumerate() {
                assert_eq!(flag(&r1), bit == other);
            }
            assert!(r1.is_valid());
        }
    }

    #[test]
    fn idle_fill_is_not_a_valid_r1() {
        assert!(!R1Response::NO_RESPONSE.is_valid());
        assert!(R1Response::NO_RESPONSE.has_error());
        assert!(R1Response::IN_IDLE_STATE.is_valid());
    }

    #[test]
    fn error_threshold() {
        assert!(!R1Response::READY_STATE.has_error());
        assert!(!R1Response::IN_IDLE_STATE.has_error());
        assert!(R1Response(0x02).has_error());
        assert!(R1Response(0x05).has_error());
    }

    #[test]
    fn r1_labels() {
        assert_eq!(R1Response::READY_STATE.to_string(), "0x00 Card Ready");
        assert_eq!(R1Response::IN_IDLE_STATE.to_string(), "0x01 In Idle State");
        assert_eq!(
            R1Response(0x05).to_string(),
            "0x05 Illegal Command, In Idle State"
        );
        assert_eq!(
            R1Response(0x7F).to_string(),
            "0x7F Parameter Error, Address Error, Erase Sequence Error, CRC Error, \
             Illegal Command, Erase Reset Error, In Idle State"
        );
    }

    #[test]
    fn r1_with_msb_set_is_an_error() {
        assert_eq!(R1Response::NO_RESPONSE.to_string(), "0xFF Error: MSB = 1");
        assert_eq!(R1Response(0x80).to_string(), "0x80 Error: MSB = 1");
    }

    #[test]
    fn absent_payload_decodes_to_nothing() {
        let wide = Response::R1(R1Response(0x05)).into_wide();

        assert_eq!(wide.operating_conditions(), None);
        assert_eq!(wide.interface_conditions(), None);
        assert_eq!(wide.to_bytes(), [0x05, 0, 0, 0, 0]);
    }

    #[test]
    fn wide_response_keeps_its_bytes() {
        let wide = WideResponse {
            r1: R1Response::IN_IDLE_STATE,
            payload: Some([0x00, 0x00, 0x01, 0xAA]),
        };
        let response = Response::R3OrR7(wide);

        assert_eq!(response.r1(), R1Response::IN_IDLE_STATE);
        assert_eq!(response.into_wide().to_bytes(), [0x01, 0x00, 0x00, 0x01, 0xAA]);
        assert_eq!(
            wide.interface_conditions().map(|c| c.check_pattern()),
            Some(0xAA)
        );
    }
}
