//! Port traits: the hexagonal boundary between the control core and the
//! outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Channel / SafetyManager / ControlLoop
//! ```
//!
//! Drivers (thermocouples, SSRs, buzzer, watchdog) and collaborators
//! (profile table, settings store, telemetry sinks) implement these
//! traits. The core consumes them via generics, so it never touches
//! hardware directly and runs unchanged on the host under test.

use heapless::String;
use serde::{Deserialize, Serialize};

use super::events::{AppEvent, FaultEvent};
use crate::sensors::{Calibration, SensorStatus};

// ───────────────────────────────────────────────────────────────
// Sensor port (driven adapter: hardware → channel)
// ───────────────────────────────────────────────────────────────

/// One thermocouple channel. Polled by its channel every control cycle.
pub trait TemperatureSensor {
    /// Refresh the reading if the conversion interval has elapsed.
    fn update(&mut self, now_ms: u64);

    /// Last good reading in °F. Meaningless unless [`is_ok`](Self::is_ok).
    fn temperature_f(&self) -> f32;

    fn status(&self) -> SensorStatus;

    fn is_ok(&self) -> bool {
        self.status() == SensorStatus::Ok
    }

    /// Consecutive failed reads since the last good one.
    fn error_count(&self) -> u8;
}

// ───────────────────────────────────────────────────────────────
// Output ports (driven adapter: core → hardware)
// ───────────────────────────────────────────────────────────────

/// Solid-state relay. Callers drive it on transitions only.
pub trait SsrOutput {
    fn set(&mut self, on: bool);
}

/// Hardware owned by the safety context.
pub trait SafetyPort {
    /// Acknowledge the hardware task watchdog.
    fn feed_watchdog(&mut self);

    /// Start a tone at `freq_hz`; 0 silences the buzzer.
    fn set_tone(&mut self, freq_hz: u16);

    fn set_status_led(&mut self, on: bool);

    /// Drive every SSR to its inactive level now, regardless of channel state.
    fn force_outputs_off(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Event ports (core → collaborators)
// ───────────────────────────────────────────────────────────────

/// Best-effort fault delivery. Returns `false` when the event was dropped.
pub trait FaultSink {
    fn try_send_fault(&self, event: FaultEvent) -> bool;
}

impl<T: FaultSink + ?Sized> FaultSink for &T {
    fn try_send_fault(&self, event: FaultEvent) -> bool {
        (**self).try_send_fault(event)
    }
}

impl<T: FaultSink + ?Sized> FaultSink for std::sync::Arc<T> {
    fn try_send_fault(&self, event: FaultEvent) -> bool {
        (**self).try_send_fault(event)
    }
}

/// Consumers of published state (serial log, display, network).
pub trait EventSink {
    fn emit(&mut self, event: &AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Profile store (read-only, consulted on LoadProfile)
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String<16>,
    pub target_f: f32,
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    /// Apply the gains as well as the target.
    pub has_custom_pid: bool,
}

pub trait ProfileStore {
    fn profile(&self, channel: u8, index: u8) -> Option<Profile>;
}

// ───────────────────────────────────────────────────────────────
// Settings store (startup load, persisted outside the control context)
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelSettings {
    pub target_f: f32,
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    pub calibration: Calibration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalSettings {
    pub idle_timeout_min: u16,
    pub active_profile: u8,
}

/// Persistent settings. Implementations validate on load and fall back to
/// defaults for out-of-range fields.
pub trait SettingsStore {
    fn load_channel(&self, channel: u8) -> Result<ChannelSettings, StorageError>;
    fn save_channel(&mut self, channel: u8, settings: &ChannelSettings) -> Result<(), StorageError>;
    fn load_global(&self) -> Result<GlobalSettings, StorageError>;
    fn save_global(&mut self, settings: &GlobalSettings) -> Result<(), StorageError>;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`SettingsStore`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist (first boot).
    NotFound,
    /// Stored blob failed to deserialize.
    Corrupted,
    /// Storage partition is full.
    Full,
    /// Generic I/O error from the backend.
    IoError,
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "not found"),
            Self::Corrupted => write!(f, "corrupted"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}
