use core::fmt;
use embedded_hal::spi::{Mode, Phase, Polarity, MODE_0};

/// Represents config for [`SdCardSpi`](crate::SdCardSpi).
pub trait SdCardSpiConfig {
    /// Max reads while waiting for a non idle-fill R1 byte.
    const READ_R1_ATTEMPTS: usize;
    /// Max attempts to bring the card into the idle state.
    const GO_IDLE_ATTEMPTS: usize;
    /// Max attempts of the APP_CMD + SD_SEND_OP_COND pair.
    const OP_COND_ATTEMPTS: usize;
    /// Settle delay before the card is clocked, ms.
    const POWER_UP_DELAY_MS: u8;
    /// Delay between SD_SEND_OP_COND attempts, ms.
    const OP_COND_DELAY_MS: u8;
    /// Check pattern echoed back by SEND_IF_COND.
    const IF_COND_CHECK_PATTERN: u8;
}

/// Default implementation of [`SdCardSpiConfig`](crate::SdCardSpiConfig).
pub struct DefaultSdCardSpiConfig;

impl SdCardSpiConfig for DefaultSdCardSpiConfig {
    const READ_R1_ATTEMPTS: usize = 9;
    const GO_IDLE_ATTEMPTS: usize = 11;
    const OP_COND_ATTEMPTS: usize = 101;
    const POWER_UP_DELAY_MS: u8 = 10;
    const OP_COND_DELAY_MS: u8 = 10;
    const IF_COND_CHECK_PATTERN: u8 = 0xAA;
}

/// Bus settings a transport is set up with before it is handed to the driver.
///
/// The driver itself never looks at these, the SPI implementation owns them.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct BusConfig {
    /// Clock polarity and phase.
    pub mode: Mode,
    /// Word size.
    pub bits_per_word: u8,
    /// Clock rate during initialization.
    pub max_speed_hz: u32,
}

impl BusConfig {
    /// Identification mode settings: mode 0, 8-bit words, 400 kHz.
    pub const fn new() -> Self {
        BusConfig {
            mode: MODE_0,
            bits_per_word: 8,
            max_speed_hz: 400_000,
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self::new()
    }
}

// `Mode` has no `Debug` impl in embedded-hal 0.2.
impl fmt::Debug for BusConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let polarity = match self.mode.polarity {
            Polarity::IdleLow => "IdleLow",
            Polarity::IdleHigh => "IdleHigh",
        };
        let phase = match self.mode.phase {
            Phase::CaptureOnFirstTransition => "CaptureOnFirstTransition",
            Phase::CaptureOnSecondTransition => "CaptureOnSecondTransition",
        };

        f.debug_struct("BusConfig")
            .field("polarity", &polarity)
            .field("phase", &phase)
            .field("bits_per_word", &self.bits_per_word)
            .field("max_speed_hz", &self.max_speed_hz)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bus_config_defaults_to_identification_mode() {
        let config = BusConfig::default();

        assert!(config.mode.polarity == Polarity::IdleLow);
        assert!(config.mode.phase == Phase::CaptureOnFirstTransition);
        assert_eq!(config.bits_per_word, 8);
        assert_eq!(config.max_speed_hz, 400_000);
        assert!(config == BusConfig::new());
    }

    #[test]
    fn bus_config_debug_names_mode() {
        assert_eq!(
            format!("{:?}", BusConfig::new()),
            "BusConfig { polarity: \"IdleLow\", phase: \"CaptureOnFirstTransition\", \
             bits_per_word: 8, max_speed_hz: 400000 }"
        );
    }

    #[test]
    fn default_bounds() {
        assert_eq!(DefaultSdCardSpiConfig::READ_R1_ATTEMPTS, 9);
        assert_eq!(DefaultSdCardSpiConfig::GO_IDLE_ATTEMPTS, 11);
        assert_eq!(DefaultSdCardSpiConfig::OP_COND_ATTEMPTS, 101);
    }
}
