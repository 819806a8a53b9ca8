//! Unified error and fault types for the heater controller.
//!
//! Control-path faults are never returned as `Err`: channels and the safety
//! manager latch them as state and publish them. The `Error` enum exists for
//! the fallible edges (startup, storage, peripheral init). All variants are
//! `Copy` so they can be handed across contexts without allocation.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::app::ports::StorageError;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation outside the control path funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A thermocouple could not be read or reported a wiring fault.
    Sensor(SensorFault),
    /// A channel left closed-loop control because of a fault.
    Control(ControlFault),
    /// A safety interlock tripped.
    Safety(SafetyFault),
    /// Relay autotune did not produce usable gains.
    Autotune(AutotuneError),
    /// Settings could not be loaded or saved.
    Storage(StorageError),
    /// Peripheral initialisation failed.
    Init(&'static str),
    /// Configuration is invalid.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sensor(e) => write!(f, "sensor: {e}"),
            Self::Control(e) => write!(f, "control: {e}"),
            Self::Safety(e) => write!(f, "safety: {e}"),
            Self::Autotune(e) => write!(f, "autotune: {e}"),
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Sensor faults
// ---------------------------------------------------------------------------

/// Thermocouple read failures. Recoverable: the consecutive-error counter
/// resets on the next good read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SensorFault {
    /// Thermocouple not connected.
    OpenCircuit,
    /// Thermocouple shorted to ground.
    ShortToGround,
    /// Thermocouple shorted to supply.
    ShortToSupply,
    /// SPI transfer failed or returned garbage.
    CommError,
    /// No conversion completed yet.
    NotReady,
}

impl fmt::Display for SensorFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenCircuit => write!(f, "open circuit"),
            Self::ShortToGround => write!(f, "short to GND"),
            Self::ShortToSupply => write!(f, "short to VCC"),
            Self::CommError => write!(f, "comm error"),
            Self::NotReady => write!(f, "not ready"),
        }
    }
}

impl From<SensorFault> for Error {
    fn from(e: SensorFault) -> Self {
        Self::Sensor(e)
    }
}

// ---------------------------------------------------------------------------
// Control faults
// ---------------------------------------------------------------------------

/// Why a channel entered `Fault`. Latched until an explicit disable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlFault {
    /// Sensor failed too many consecutive reads while heating.
    SensorErrorLimit,
    /// Reading at or above the absolute maximum.
    OverTemperature,
}

impl ControlFault {
    /// Safety bit raised for this channel fault.
    pub const fn safety_fault(self) -> SafetyFault {
        match self {
            Self::SensorErrorLimit => SafetyFault::SensorError,
            Self::OverTemperature => SafetyFault::OverTemperature,
        }
    }
}

impl fmt::Display for ControlFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SensorErrorLimit => write!(f, "sensor error limit reached"),
            Self::OverTemperature => write!(f, "absolute max temperature exceeded"),
        }
    }
}

impl From<ControlFault> for Error {
    fn from(e: ControlFault) -> Self {
        Self::Control(e)
    }
}

// ---------------------------------------------------------------------------
// Safety faults
// ---------------------------------------------------------------------------

/// Safety faults are accumulated in a bitfield by the safety manager so
/// several can be active at once and cleared individually.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum SafetyFault {
    /// A channel reading reached the absolute maximum.
    OverTemperature = 0b0000_0001,
    /// A channel thermocouple failed persistently.
    SensorError = 0b0000_0010,
    /// No operator activity within the idle timeout.
    IdleTimeout = 0b0000_0100,
    /// Control context stopped acknowledging; hardware reset follows.
    Watchdog = 0b0000_1000,
    /// Output suspected stuck on. No detector yet.
    SsrStuck = 0b0001_0000,
    /// Supply fault. No detector yet.
    PowerError = 0b0010_0000,
}

impl SafetyFault {
    pub const ALL: [SafetyFault; 6] = [
        Self::OverTemperature,
        Self::SensorError,
        Self::IdleTimeout,
        Self::Watchdog,
        Self::SsrStuck,
        Self::PowerError,
    ];

    /// Return the bitmask for this fault.
    pub const fn mask(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for SafetyFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OverTemperature => write!(f, "over temperature"),
            Self::SensorError => write!(f, "thermocouple error"),
            Self::IdleTimeout => write!(f, "idle timeout"),
            Self::Watchdog => write!(f, "watchdog"),
            Self::SsrStuck => write!(f, "SSR stuck"),
            Self::PowerError => write!(f, "power error"),
        }
    }
}

impl From<SafetyFault> for Error {
    fn from(e: SafetyFault) -> Self {
        Self::Safety(e)
    }
}

// ---------------------------------------------------------------------------
// Autotune failures
// ---------------------------------------------------------------------------

/// Non-fatal: the channel resumes heating with its previous gains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutotuneError {
    /// Not enough oscillations before the timeout.
    Timeout,
    /// Oscillations too small or too fast to derive gains from.
    DegenerateOscillation,
}

impl fmt::Display for AutotuneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timed out"),
            Self::DegenerateOscillation => write!(f, "degenerate oscillation"),
        }
    }
}

impl From<AutotuneError> for Error {
    fn from(e: AutotuneError) -> Self {
        Self::Autotune(e)
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
