//! SD card SPI-mode bring-up written in Embedded Rust, a sibling of [sdmmc-spi](https://crates.io/crates/sdmmc-spi).
//!
//! This crate powers an SD card up, switches it into SPI mode and negotiates its
//! operating conditions over an SPI bus and a chip select switch.
//!
//! ## Features
//!
//! * `log` (default): log through the [log](https://crates.io/crates/log) facade.
//! * `defmt-log`: turn the default features off and enable this one to log over
//!   defmt instead.

#![cfg_attr(not(test), no_std)]

mod command;
mod config;
mod consts;
mod crc;
mod if_cond;
mod ocr;
mod response;
mod retry;
#[cfg(test)]
mod testutils;

pub use crate::command::{encode, Command, Frame, ResponseKind, FRAME_LEN};
pub use crate::config::{BusConfig, DefaultSdCardSpiConfig, SdCardSpiConfig};
pub use crate::if_cond::{IfCond, IfCondData, VoltageAccepted};
pub use crate::ocr::{Ocr, OcrData, VoltageBand, VoltageWindow};
pub use crate::response::{R1Response, Response, WideResponse};
pub use crate::retry::{retry, Retry};
pub use diskio::{
    BlockSize, DiskioDevice, Error as DiskioError, IoctlCmd, Lba, Status, StatusFlag,
};

use crate::consts::tokens::{IDLE_FILL, POWER_UP_CLOCK_BYTES, WIDE_PAYLOAD_LEN};

use core::{fmt, marker::PhantomData};
#[cfg(feature = "defmt-log")]
use defmt::{debug, error, info, warn};
use embedded_hal::blocking::{delay::DelayMs, spi::Transfer};
#[cfg(feature = "log")]
use log::{debug, error, info, warn};
use switch_hal::OutputSwitch;

#[cfg(all(feature = "defmt-log", feature = "log"))]
compile_error!("Cannot enable both log and defmt-log");

#[cfg(all(not(feature = "defmt-log"), not(feature = "log")))]
compile_error!("Must enable either log or defmt-log");

/// [`SdCardSpi`] result error.
///
/// `T` - transport error type.
/// `S` - select switch type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error<T, S> {
    /// Error from the SPI peripheral.
    Transport(T),
    /// Couldn't set a select.
    SelectError(S),
    /// The card did not come up.
    Init(InitError),
}

impl<T, S> From<InitError> for Error<T, S> {
    fn from(error: InitError) -> Self {
        Error::Init(error)
    }
}

/// Step of the initialization that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub enum InitError {
    /// GO_IDLE_STATE never answered with the idle state.
    IdleTimeout,
    /// SEND_IF_COND answered with something other than the idle state.
    InterfaceConditionRejected(R1Response),
    /// SEND_IF_COND returned a different check pattern.
    EchoMismatch { sent: u8, received: u8 },
    /// SD_SEND_OP_COMD never reported the ready state.
    OperatingConditionTimeout,
    /// READ_OCR answered with error flags.
    ReadOcrRejected(R1Response),
    /// OCR power up status bit is clear.
    PowerUpIncomplete,
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitError::IdleTimeout => f.write_str("card did not enter the idle state"),
            InitError::InterfaceConditionRejected(r1) => {
                write!(f, "interface condition rejected, R1 {}", r1)
            }
            InitError::EchoMismatch { sent, received } => write!(
                f,
                "check pattern mismatch, sent 0x{:02X}, received 0x{:02X}",
                sent, received
            ),
            InitError::OperatingConditionTimeout => f.write_str("card never left the idle state"),
            InitError::ReadOcrRejected(r1) => {
                write!(f, "OCR read rejected, R1 {}", r1)
            }
            InitError::PowerUpIncomplete => f.write_str("card power up is not complete"),
        }
    }
}

/// Last initialization stage the card got through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub enum InitState {
    /// Nothing accepted yet.
    PoweringUp,
    /// GO_IDLE_STATE answered with the idle state.
    Idle,
    /// SEND_IF_COND echoed the check pattern.
    InterfaceCheck,
    /// SD_SEND_OP_COMD reported the ready state.
    Negotiating,
    /// OCR reports power up complete.
    ReadOcr,
    Ready,
    Failed(InitError),
}

/// What the card reported on its way to the ready state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub struct CardConditions {
    /// Block addressing is used for data commands.
    pub capacity_support: bool,
    /// Supply voltage bands the card operates in.
    pub voltage_window: VoltageWindow,
    /// Raw OCR.
    pub ocr: Ocr,
    /// Interface condition of SEND_IF_COND.
    pub if_cond: IfCond,
    /// GO_IDLE_STATE attempts it took.
    pub idle_attempts: usize,
    /// SD_SEND_OP_COMD attempts it took.
    pub op_cond_attempts: usize,
}

/// Result of one initialization attempt.
pub type InitOutcome<T, S> = Result<CardConditions, Error<T, S>>;

/// Error type alias.
type ErrorFor<T> = <T as DiskioDevice>::HardwareError;

/// SD Card SPI initialization driver.
///
/// `Spi` - SPI.
/// `Cs` - Chip select output switch, `on` asserts.
/// `Delay` - Millisecond delay.
/// `Config` - Config implementation of driver config trait.
pub struct SdCardSpi<Spi, Cs, Delay, Config>
where
    Spi: Transfer<u8>,
    Cs: OutputSwitch,
    Delay: DelayMs<u8>,
    Config: SdCardSpiConfig,
{
    spi: Spi,
    cs: Cs,
    delay: Delay,
    status: Status,
    state: InitState,
    conditions: Option<CardConditions>,
    config: PhantomData<Config>,
}

impl<Spi, Cs, Delay, Config> SdCardSpi<Spi, Cs, Delay, Config>
where
    Spi: Transfer<u8>,
    Cs: OutputSwitch,
    Delay: DelayMs<u8>,
    Config: SdCardSpiConfig,
    Spi::Error: core::fmt::Debug,
    Cs::Error: core::fmt::Debug,
{
    /// SEND_IF_COND with the configured check pattern.
    const SEND_IF_COND: Command = Command::send_if_cond(Config::IF_COND_CHECK_PATTERN);

    /// Creates a new [`SdCardSpi<Spi, Cs, Delay, Config>`].
    ///
    /// `spi` - SPI instance, already set up per [`BusConfig`].
    /// `cs` - chip select output switch.
    /// `delay` - delay provider.
    pub fn new(spi: Spi, cs: Cs, delay: Delay) -> Self {
        SdCardSpi {
            spi,
            cs,
            delay,
            status: StatusFlag::NotInitialized.into(),
            state: InitState::PoweringUp,
            conditions: None,
            config: PhantomData::<Config>,
        }
    }

    /// Gives the bus back.
    pub fn release(self) -> (Spi, Cs, Delay) {
        (self.spi, self.cs, self.delay)
    }

    /// Current initialization state.
    pub fn state(&self) -> InitState {
        self.state
    }

    /// Conditions of the last successful initialization.
    pub fn conditions(&self) -> Option<CardConditions> {
        self.conditions
    }

    /// Activate chip select.
    fn select(&mut self) -> Result<(), ErrorFor<Self>> {
        self.cs.on().map_err(Error::SelectError)
    }

    /// Deactivate chip select.
    fn unselect(&mut self) -> Result<(), ErrorFor<Self>> {
        self.cs.off().map_err(Error::SelectError)
    }

    /// CS scope, padded with an idle-fill byte on each side of both edges.
    fn cs_scope_mut<O, F>(&mut self, f: F) -> Result<O, ErrorFor<Self>>
    where
        F: FnOnce(&mut Self) -> Result<O, ErrorFor<Self>>,
    {
        self.select()?;
        let result = self
            .skip_byte()
            .and_then(|_| f(self))
            .and_then(|out| self.skip_byte().map(|_| out));
        self.unselect()?;
        self.skip_byte()?;

        result
    }

    /// Send one byte and receive one byte.
    fn transfer(&mut self, data: u8) -> Result<u8, ErrorFor<Self>> {
        self.spi
            .transfer(&mut [data])
            .map(|b| b[0])
            .map_err(Error::Transport)
    }

    /// Receive a byte from the SD card by clocking in an idle-fill byte.
    fn receive(&mut self) -> Result<u8, ErrorFor<Self>> {
        self.transfer(IDLE_FILL)
    }

    /// Send a byte to the SD card.
    fn send(&mut self, data: u8) -> Result<(), ErrorFor<Self>> {
        self.transfer(data).map(|_| ())
    }

    /// Receive a slice from the SD card.
    fn receive_slice(&mut self, data: &mut [u8]) -> Result<(), ErrorFor<Self>> {
        for byte in data.iter_mut() {
            *byte = self.receive()?;
        }

        Ok(())
    }

    /// Send a slice to the SD card.
    fn send_slice(&mut self, data: &[u8]) -> Result<(), ErrorFor<Self>> {
        for byte in data.iter() {
            self.send(*byte)?;
        }

        Ok(())
    }

    /// Skip byte.
    fn skip_byte(&mut self) -> Result<(), ErrorFor<Self>> {
        self.receive().map(|_| ())
    }

    /// Polls for R1. Returns [`R1Response::NO_RESPONSE`] if every read was idle-fill.
    pub fn read_r1(&mut self) -> Result<R1Response, Error<Spi::Error, Cs::Error>> {
        retry(
            Config::READ_R1_ATTEMPTS,
            |_| self.receive(),
            |&byte| byte != IDLE_FILL,
        )
        .map(|r1| R1Response::from(r1.into_inner()))
    }

    /// Reads the payload of R3 or R7 following `r1`, unless `r1` reports an error.
    pub fn read_r3_or_r7(
        &mut self,
        r1: R1Response,
    ) -> Result<WideResponse, Error<Spi::Error, Cs::Error>> {
        if r1.has_error() {
            return Ok(WideResponse { r1, payload: None });
        }

        let mut payload = [0; WIDE_PAYLOAD_LEN];
        self.receive_slice(&mut payload)?;

        Ok(WideResponse {
            r1,
            payload: Some(payload),
        })
    }

    /// Send command and read its response, chip select must be active.
    fn send_command(&mut self, cmd: Command) -> Result<Response, ErrorFor<Self>> {
        self.send_slice(&cmd.encode())?;

        let r1 = self.read_r1()?;
        let response = match cmd.response() {
            ResponseKind::R1 => Response::R1(r1),
            ResponseKind::R3 | ResponseKind::R7 => Response::R3OrR7(self.read_r3_or_r7(r1)?),
        };

        debug!("CMD{} response: {:?}", cmd.index(), response);

        Ok(response)
    }

    /// Runs one command in its own chip select scope.
    pub fn command(&mut self, cmd: Command) -> Result<Response, Error<Spi::Error, Cs::Error>> {
        self.cs_scope_mut(|s| s.send_command(cmd))
    }

    /// Power up sequence: settle, then 74+ clocks with the card deselected.
    pub fn power_up(&mut self) -> Result<(), Error<Spi::Error, Cs::Error>> {
        self.unselect()?;
        self.delay.delay_ms(Config::POWER_UP_DELAY_MS);

        for _ in 0..POWER_UP_CLOCK_BYTES {
            self.send(IDLE_FILL)?;
        }

        Ok(())
    }

    /// Send GO_IDLE_STATE.
    pub fn go_idle_state(&mut self) -> Result<R1Response, Error<Spi::Error, Cs::Error>> {
        self.command(Command::go_idle_state()).map(|r| r.r1())
    }

    /// Send SEND_IF_COND with the configured check pattern.
    pub fn send_if_cond(&mut self) -> Result<WideResponse, Error<Spi::Error, Cs::Error>> {
        self.command(Self::SEND_IF_COND).map(Response::into_wide)
    }

    /// Send READ_OCR.
    pub fn read_ocr(&mut self) -> Result<WideResponse, Error<Spi::Error, Cs::Error>> {
        self.command(Command::read_ocr()).map(Response::into_wide)
    }

    /// Send APP_CMD.
    pub fn app_cmd(&mut self) -> Result<R1Response, Error<Spi::Error, Cs::Error>> {
        self.command(Command::app_cmd()).map(|r| r.r1())
    }

    /// Send SD_SEND_OP_COMD, only meaningful right after [`Self::app_cmd`].
    pub fn send_op_cond(&mut self) -> Result<R1Response, Error<Spi::Error, Cs::Error>> {
        self.command(Command::sd_send_op_cond()).map(|r| r.r1())
    }

    /// Bring the card to the idle state.
    fn enter_idle_state(&mut self) -> Result<usize, ErrorFor<Self>> {
        let outcome = retry(
            Config::GO_IDLE_ATTEMPTS,
            |attempt| {
                debug!("Enter SD idle state, attempt: {}", attempt);
                self.go_idle_state()
            },
            |&r1| r1 == R1Response::IN_IDLE_STATE,
        )?;

        match outcome {
            Retry::Accepted { attempts, .. } => {
                info!("{} attempts for GO_IDLE_STATE", attempts);
                Ok(attempts)
            }
            Retry::Exhausted(r1) => {
                warn!("Wrong response from CMD0: {}", r1);
                Err(InitError::IdleTimeout.into())
            }
        }
    }

    /// Verify SD Memory Card interface operating condition.
    fn check_interface_condition(&mut self) -> Result<IfCond, ErrorFor<Self>> {
        let response = self.send_if_cond()?;

        if response.r1 != R1Response::IN_IDLE_STATE {
            warn!("Wrong response from CMD8: {}", response.r1);
            return Err(InitError::InterfaceConditionRejected(response.r1).into());
        }

        let if_cond = response
            .interface_conditions()
            .ok_or(InitError::InterfaceConditionRejected(response.r1))?;

        if if_cond.check_pattern() != Config::IF_COND_CHECK_PATTERN {
            return Err(InitError::EchoMismatch {
                sent: Config::IF_COND_CHECK_PATTERN,
                received: if_cond.check_pattern(),
            }
            .into());
        }

        info!(
            "SD command version: {}, voltage accepted: {}",
            if_cond.command_version(),
            if_cond.voltage_accepted()
        );

        Ok(if_cond)
    }

    /// Activate the card's initialization process.
    fn negotiate_operating_condition(&mut self) -> Result<usize, ErrorFor<Self>> {
        let outcome = retry(
            Config::OP_COND_ATTEMPTS,
            |_| -> Result<R1Response, ErrorFor<Self>> {
                let mut r1 = self.app_cmd()?;

                if !r1.has_error() {
                    r1 = self.send_op_cond()?;
                }

                self.delay.delay_ms(Config::OP_COND_DELAY_MS);

                Ok(r1)
            },
            |&r1| r1 == R1Response::READY_STATE,
        )?;

        match outcome {
            Retry::Accepted { attempts, .. } => {
                info!("{} attempts for SD_SEND_OP_COND", attempts);
                Ok(attempts)
            }
            Retry::Exhausted(r1) => {
                warn!("Wrong response from ACMD41: {}", r1);
                Err(InitError::OperatingConditionTimeout.into())
            }
        }
    }

    /// Read OCR and check power up status.
    fn check_operating_condition(&mut self) -> Result<Ocr, ErrorFor<Self>> {
        let response = self.read_ocr()?;

        let ocr = response
            .operating_conditions()
            .ok_or(InitError::ReadOcrRejected(response.r1))?;

        info!("SD OCR: {}", ocr);

        if !ocr.power_up_complete() {
            return Err(InitError::PowerUpIncomplete.into());
        }

        Ok(ocr)
    }

    /// Initialization sequence, tracking [`InitState`].
    fn init_sequence(&mut self) -> Result<CardConditions, ErrorFor<Self>> {
        self.state = InitState::PoweringUp;
        self.power_up()?;
        let idle_attempts = self.enter_idle_state()?;

        self.state = InitState::Idle;
        let if_cond = self.check_interface_condition()?;

        self.state = InitState::InterfaceCheck;
        let op_cond_attempts = self.negotiate_operating_condition()?;

        self.state = InitState::Negotiating;
        let ocr = self.check_operating_condition()?;

        self.state = InitState::ReadOcr;

        Ok(CardConditions {
            capacity_support: ocr.card_capacity_status(),
            voltage_window: ocr.voltage_window(),
            ocr,
            if_cond,
            idle_attempts,
            op_cond_attempts,
        })
    }

    /// Initialize SD.
    pub fn init(&mut self) -> InitOutcome<Spi::Error, Cs::Error> {
        info!("SD initialize started");

        let result = self.init_sequence();

        self.status = match &result {
            Ok(conditions) => {
                info!(
                    "SD successfully initialized, capacity support: {}, voltage window: {}",
                    conditions.capacity_support, conditions.voltage_window
                );
                self.state = InitState::Ready;
                self.conditions = Some(*conditions);
                Status::default()
            }
            Err(err) => {
                match err {
                    Error::Init(reason) => {
                        error!("Failed to initialize SD: {}", reason);
                        self.state = InitState::Failed(*reason);
                    }
                    _ => error!("Failed to initialize SD: bus fault"),
                }
                self.conditions = None;
                StatusFlag::ErrorOccured | StatusFlag::NotInitialized
            }
        };

        result
    }
}

impl<Spi, Cs, Delay, Config> DiskioDevice for SdCardSpi<Spi, Cs, Delay, Config>
where
    Spi: Transfer<u8>,
    Cs: OutputSwitch,
    Delay: DelayMs<u8>,
    Config: SdCardSpiConfig,
    Spi::Error: core::fmt::Debug,
    Cs::Error: core::fmt::Debug,
{
    type HardwareError = Error<Spi::Error, Cs::Error>;

    fn status(&self) -> Status {
        self.status
    }

    fn reset(&mut self) {
        info!("SD reset invoked");
        self.status = StatusFlag::NotInitialized.into();
        self.state = InitState::PoweringUp;
        self.conditions = None;
    }

    fn initialize(&mut self) -> Result<(), DiskioError<Self::HardwareError>> {
        if !self.status.contains(StatusFlag::NotInitialized) {
            warn!("SD already is initialized");
            return Err(DiskioError::AlreadyInitialized);
        }

        self.init().map(|_| ()).map_err(DiskioError::Hardware)
    }

    fn read(&self, _buf: &mut [u8], _lba: Lba) -> Result<(), DiskioError<Self::HardwareError>> {
        Err(DiskioError::NotSupported)
    }

    fn write(&self, _buf: &[u8], _lba: Lba) -> Result<(), DiskioError<Self::HardwareError>> {
        Err(DiskioError::NotSupported)
    }

    fn ioctl(&self, _cmd: IoctlCmd) -> Result<(), DiskioError<Self::HardwareError>> {
        Err(DiskioError::NotSupported)
    }
}
