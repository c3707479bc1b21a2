/// CRC-7 calculation.
///
/// Evaluated in const context, so the CRC of every fixed command is baked in at
/// compile time.
pub const fn crc7(data: &[u8]) -> u8 {
    let mut crc: u8 = 0;
    let mut i = 0;
    while i < data.len() {
        let mut byte = data[i];
        let mut bit = 0;
        while bit < 8 {
            crc <<= 1;
            if ((byte & 0x80) ^ (crc & 0x80)) != 0 {
                crc ^= 0x09;
            }
            byte <<= 1;
            bit += 1;
        }
        i += 1;
    }
    crc & 0x7F
}
