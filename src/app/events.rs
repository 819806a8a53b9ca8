//! Outbound snapshots published by the control core.
//!
//! Everything here is `Copy` and immutable once published. Temperature
//! updates and the safety status are latest-value-wins; fault events go
//! through a bounded queue and are dropped when it is full.

use serde::{Deserialize, Serialize};

use crate::channel::ChannelState;
use crate::error::SafetyFault;
use crate::sensors::{Calibration, SensorStatus};

/// Wire value for a fault that is not tied to one channel.
pub const GLOBAL_CHANNEL: u8 = 0xFF;

/// Per-channel state published after every control cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempUpdate {
    pub channel: u8,
    /// Calibrated reading in °F; 0 while the sensor is faulted.
    pub current_temp_f: f32,
    /// Reading the controller acted on, before calibration.
    pub raw_temp_f: f32,
    pub target_temp_f: f32,
    /// Duty being applied (PID output, or relay output while autotuning).
    pub output_percent: f32,
    pub state: ChannelState,
    pub sensor_status: SensorStatus,
    pub calibration: Calibration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultScope {
    Channel(u8),
    Global,
}

impl FaultScope {
    pub const fn wire_channel(self) -> u8 {
        match self {
            Self::Channel(ch) => ch,
            Self::Global => GLOBAL_CHANNEL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaultEvent {
    pub fault: SafetyFault,
    pub scope: FaultScope,
    /// Reading that triggered the fault (0 for global faults).
    pub temperature_f: f32,
    pub timestamp_ms: u64,
}

/// Safety manager state, published every safety cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyStatus {
    pub faults: u8,
    pub shutdown: bool,
    pub idle_timed_out: bool,
    /// Time left before idle shutdown; `None` when disabled or already tripped.
    pub idle_remaining_ms: Option<u64>,
}

impl SafetyStatus {
    pub fn has_fault(&self, fault: SafetyFault) -> bool {
        self.faults & fault.mask() != 0
    }
}

/// Everything a telemetry consumer can receive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AppEvent {
    Temperature(TempUpdate),
    Fault(FaultEvent),
    Safety(SafetyStatus),
}
