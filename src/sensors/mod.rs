//! Temperature sensing.
//!
//! One thermocouple amplifier per heater channel. Each driver implements
//! [`TemperatureSensor`](crate::app::ports::TemperatureSensor) and is owned
//! by its channel.

pub mod thermocouple;

use serde::{Deserialize, Serialize};

use crate::config::CALIBRATION_MAX_OFFSET_F;
use crate::error::SensorFault;

pub use thermocouple::Max31855;

/// Health of the last sensor read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SensorStatus {
    Ok,
    Fault(SensorFault),
}

impl SensorStatus {
    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }

    pub fn fault(self) -> Option<SensorFault> {
        match self {
            Self::Ok => None,
            Self::Fault(f) => Some(f),
        }
    }

    /// Short label for displays and logs.
    pub fn label(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Fault(SensorFault::OpenCircuit) => "OPEN",
            Self::Fault(SensorFault::ShortToGround) => "SHORT_GND",
            Self::Fault(SensorFault::ShortToSupply) => "SHORT_VCC",
            Self::Fault(SensorFault::CommError) => "READ_ERR",
            Self::Fault(SensorFault::NotReady) => "NOT_READY",
        }
    }
}

impl Default for SensorStatus {
    fn default() -> Self {
        Self::Fault(SensorFault::NotReady)
    }
}

/// Per-channel offset for a coil whose thermocouple reads off. Shifts the
/// published reading only; control and safety use the raw value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub offset_f: f32,
    pub enabled: bool,
}

impl Calibration {
    pub const fn offset(offset_f: f32) -> Self {
        Self {
            offset_f,
            enabled: true,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.offset_f.is_finite() && self.offset_f.abs() <= CALIBRATION_MAX_OFFSET_F
    }

    pub fn apply(&self, raw_f: f32) -> f32 {
        if self.enabled { raw_f + self.offset_f } else { raw_f }
    }
}
