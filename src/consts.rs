pub mod commands {
    /// Start and transmission bits of the first command byte.
    pub const CMD_BASE: u8 = 0x40;
    /// Command index bits of the first command byte.
    pub const CMD_INDEX_MASK: u8 = 0x3F;
    /// End bit of the last command byte.
    pub const CMD_STOP_BIT: u8 = 0x01;
    /// GO_IDLE_STATE - init card in spi mode if CS low.
    pub const CMD0: u8 = 0;
    /// SEND_IF_COND - verify SD Memory Card interface operating condition.
    pub const CMD8: u8 = 8;
    /// APP_CMD - escape for application specific command.
    pub const CMD55: u8 = 55;
    /// READ_OCR - read the OCR register of a card.
    pub const CMD58: u8 = 58;
    /// SD_SEND_OP_COMD - Sends host capacity support information and activates
    /// the card's initialization process.
    pub const ACMD41: u8 = 41;
}

pub mod arguments {
    /// Supplied voltage 2.7-3.6V, placed above the check pattern of SEND_IF_COND.
    pub const IF_COND_VHS_27_36: u32 = 0x0000_0100;
    /// Host capacity support bit of SD_SEND_OP_COMD.
    pub const OP_COND_HCS: u32 = 0x4000_0000;
}

pub mod tokens {
    /// Byte clocked out when nothing is sent, and returned by an idle card.
    pub const IDLE_FILL: u8 = 0xFF;
    /// Count of idle-fill bytes that give the card its 74+ power up clocks.
    pub const POWER_UP_CLOCK_BYTES: usize = 10;
    /// Count of bytes following R1 in R3 and R7.
    pub const WIDE_PAYLOAD_LEN: usize = 4;
}
