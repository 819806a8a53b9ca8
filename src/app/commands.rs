//! Inbound operator commands.
//!
//! Display, network and startup code push these into the command queue;
//! only the control context drains it. Every command targets one channel
//! and is idempotent or overridable, so dropping one on a full queue is
//! harmless.

use serde::{Deserialize, Serialize};

use crate::sensors::Calibration;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CommandKind {
    Enable,
    Disable,
    /// Absolute target (°F), clamped to the device range.
    SetTemp { value: f32 },
    /// Relative target change (°F).
    AdjustTemp { delta: f32 },
    /// User-facing gains.
    SetPid { kp: f32, ki: f32, kd: f32 },
    StartAutotune,
    CancelAutotune,
    LoadProfile { index: u8 },
    /// Leave `Fault` (same effect as `Disable`).
    ClearFault,
    /// Display offset (°F) for the published reading.
    SetCalibration { offset: f32, enabled: bool },
}

/// Command addressed to one channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub channel: u8,
    pub kind: CommandKind,
}

impl Command {
    pub const fn new(channel: u8, kind: CommandKind) -> Self {
        Self { channel, kind }
    }

    pub const fn enable(channel: u8) -> Self {
        Self::new(channel, CommandKind::Enable)
    }

    pub const fn disable(channel: u8) -> Self {
        Self::new(channel, CommandKind::Disable)
    }

    pub const fn set_temp(channel: u8, value: f32) -> Self {
        Self::new(channel, CommandKind::SetTemp { value })
    }

    pub const fn set_pid(channel: u8, kp: f32, ki: f32, kd: f32) -> Self {
        Self::new(channel, CommandKind::SetPid { kp, ki, kd })
    }

    pub const fn set_calibration(channel: u8, calibration: Calibration) -> Self {
        Self::new(
            channel,
            CommandKind::SetCalibration {
                offset: calibration.offset_f,
                enabled: calibration.enabled,
            },
        )
    }
}
