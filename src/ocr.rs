use crate::consts::tokens::WIDE_PAYLOAD_LEN;

use bitfield::bitfield;
use core::fmt;

/// OCR payload of R3.
pub type OcrData = [u8; WIDE_PAYLOAD_LEN];

bitfield! {
    /// Operation Conditions Register.
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
    pub struct Ocr(u32);
    impl Debug;
    pub power_up_complete, _: 31;
    pub card_capacity_status, _: 30;
    pub u16, voltage_window_bits, _: 23, 15;
}

impl From<OcrData> for Ocr {
    fn from(ocr_data: OcrData) -> Self {
        Ocr(u32::from_be_bytes(ocr_data))
    }
}

impl Ocr {
    /// Capacity support, meaningful only once power up is complete.
    pub fn capacity_support(&self) -> Option<bool> {
        self.power_up_complete()
            .then(|| self.card_capacity_status())
    }

    /// Supported supply voltage bands.
    pub fn voltage_window(&self) -> VoltageWindow {
        VoltageWindow(self.voltage_window_bits())
    }
}

impl fmt::Display for Ocr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.capacity_support() {
            Some(ccs) => write!(f, "power up READY, CCS {}", ccs as u8)?,
            None => f.write_str("power up BUSY")?,
        }

        write!(f, ", VDD window {}", self.voltage_window())
    }
}

/// One 100 mV supply band of the OCR voltage window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[repr(u8)]
pub enum VoltageBand {
    V27To28 = 0,
    V28To29,
    V29To30,
    V30To31,
    V31To32,
    V32To33,
    V33To34,
    V34To35,
    V35To36,
}

impl VoltageBand {
    /// Every band, lowest first.
    pub const ALL: [VoltageBand; 9] = [
        VoltageBand::V27To28,
        VoltageBand::V28To29,
        VoltageBand::V29To30,
        VoltageBand::V30To31,
        VoltageBand::V31To32,
        VoltageBand::V32To33,
        VoltageBand::V33To34,
        VoltageBand::V34To35,
        VoltageBand::V35To36,
    ];

    /// Band bounds in millivolts, `(low, high)`.
    pub const fn millivolts(self) -> (u16, u16) {
        let low = 2700 + 100 * self as u16;
        (low, low + 100)
    }

    const fn mask(self) -> u16 {
        1 << self as u8
    }
}

impl fmt::Display for VoltageBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (low, high) = self.millivolts();
        write!(
            f,
            "{}.{}-{}.{}V",
            low / 1000,
            (low % 1000) / 100,
            high / 1000,
            (high % 1000) / 100
        )
    }
}

/// Set of [`VoltageBand`]s the card operates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub struct VoltageWindow(u16);

impl VoltageWindow {
    /// Window covering 2.7-3.6V.
    pub const FULL: VoltageWindow = VoltageWindow(0x01FF);

    pub fn contains(&self, band: VoltageBand) -> bool {
        self.0 & band.mask() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn is_full(&self) -> bool {
        *self == Self::FULL
    }

    /// Supported bands, lowest first.
    pub fn iter(&self) -> impl Iterator<Item = VoltageBand> + '_ {
        VoltageBand::ALL
            .into_iter()
            .filter(move |band| self.contains(*band))
    }
}

impl fmt::Display for VoltageWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }

        for (i, band) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", band)?;
        }

        Ok(())
    }
}

impl FromIterator<VoltageBand> for VoltageWindow {
    fn from_iter<I: IntoIterator<Item = VoltageBand>>(iter: I) -> Self {
        VoltageWindow(iter.into_iter().fold(0, |bits, band| bits | band.mask()))
    }
}
