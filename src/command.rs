use crate::{
    consts::{arguments, commands},
    crc::crc7,
};

/// Response format a command is answered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub enum ResponseKind {
    R1,
    R3,
    R7,
}

/// Frame length of every command.
pub const FRAME_LEN: usize = 6;

/// Encoded command frame.
pub type Frame = [u8; FRAME_LEN];

/// SD command in SPI mode.
///
/// Index, argument and CRC are fixed per command, the CRC is evaluated at
/// compile time for every constructor used in a const context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub struct Command {
    index: u8,
    argument: u32,
    crc: u8,
    response: ResponseKind,
}

impl Command {
    /// Creates a command, the CRC byte is the CRC-7 of the first five frame
    /// bytes, shifted into bits 7..1.
    ///
    /// Only the low 6 bits of `index` are kept.
    pub const fn new(index: u8, argument: u32, response: ResponseKind) -> Self {
        let index = index & commands::CMD_INDEX_MASK;
        let head = [
            commands::CMD_BASE | index,
            (argument >> 24) as u8,
            (argument >> 16) as u8,
            (argument >> 8) as u8,
            argument as u8,
        ];

        Command {
            index,
            argument,
            crc: crc7(&head) << 1,
            response,
        }
    }

    /// CMD0, GO_IDLE_STATE.
    pub const fn go_idle_state() -> Self {
        Self::new(commands::CMD0, 0x0000_0000, ResponseKind::R1)
    }

    /// CMD8, SEND_IF_COND with 2.7-3.6V supplied and `check_pattern` to echo.
    pub const fn send_if_cond(check_pattern: u8) -> Self {
        Self::new(
            commands::CMD8,
            arguments::IF_COND_VHS_27_36 | check_pattern as u32,
            ResponseKind::R7,
        )
    }

    /// CMD55, APP_CMD.
    pub const fn app_cmd() -> Self {
        Self::new(commands::CMD55, 0x0000_0000, ResponseKind::R1)
    }

    /// ACMD41, SD_SEND_OP_COMD announcing host capacity support.
    pub const fn sd_send_op_cond() -> Self {
        Self::new(commands::ACMD41, arguments::OP_COND_HCS, ResponseKind::R1)
    }

    /// CMD58, READ_OCR.
    pub const fn read_ocr() -> Self {
        Self::new(commands::CMD58, 0x0000_0000, ResponseKind::R3)
    }

    pub const fn index(&self) -> u8 {
        self.index
    }

    pub const fn argument(&self) -> u32 {
        self.argument
    }

    pub const fn crc(&self) -> u8 {
        self.crc
    }

    pub const fn response(&self) -> ResponseKind {
        self.response
    }

    /// Serializes the command into its 6-byte frame.
    pub const fn encode(&self) -> Frame {
        encode(self.index, self.argument, self.crc)
    }
}

/// Frames `index`, `argument` and `crc`: start and transmission bits, 6-bit
/// index, big-endian argument, CRC with the stop bit forced.
///
/// Bits of `index` above the low 6 are dropped.
pub const fn encode(index: u8, argument: u32, crc: u8) -> Frame {
    let arg = argument.to_be_bytes();

    [
        commands::CMD_BASE | (index & commands::CMD_INDEX_MASK),
        arg[0],
        arg[1],
        arg[2],
        arg[3],
        crc | commands::CMD_STOP_BIT,
    ]
}
