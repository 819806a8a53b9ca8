//! Controller configuration parameters
//!
//! All tunable parameters for the heater controller core. Defaults match
//! the shipping hardware (K-type thermocouples, 1 s SSR window, °F units).
//! Per-channel target/gains can be overridden from the settings store at
//! startup; everything else is fixed for the lifetime of the firmware.

use serde::{Deserialize, Serialize};

/// Hard upper bound on heater channels supported by one controller.
pub const MAX_CHANNELS: usize = 4;
/// Depth of the operator command queue drained by the control context.
pub const COMMAND_QUEUE_DEPTH: usize = 16;
/// Depth of the best-effort fault-event queue.
pub const FAULT_QUEUE_DEPTH: usize = 8;
/// Slots in the alert-tone ring buffer.
pub const ALERT_QUEUE_DEPTH: usize = 8;
/// Stored heat profiles per channel.
pub const MAX_PROFILES_PER_CHANNEL: usize = 8;
/// Largest accepted calibration offset magnitude (°F).
pub const CALIBRATION_MAX_OFFSET_F: f32 = 100.0;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Number of populated channels (1..=MAX_CHANNELS).
    pub num_channels: u8,
    pub channel: ChannelConfig,
    pub pid: PidConfig,
    pub autotune: AutotuneConfig,
    pub safety: SafetyConfig,
    pub tasks: TaskConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            num_channels: 2,
            channel: ChannelConfig::default(),
            pid: PidConfig::default(),
            autotune: AutotuneConfig::default(),
            safety: SafetyConfig::default(),
            tasks: TaskConfig::default(),
        }
    }
}

impl ControllerConfig {
    /// Channel count clamped to what the hardware can carry.
    pub fn channel_count(&self) -> usize {
        (self.num_channels as usize).clamp(1, MAX_CHANNELS)
    }
}

/// Per-channel temperature limits and output shaping (°F / ms).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChannelConfig {
    // --- Temperature range ---
    pub temp_min_f: f32,
    pub temp_max_f: f32,
    /// Target applied when nothing else is configured.
    pub temp_default_f: f32,
    /// Hard limit: at or above this reading an active channel faults.
    pub temp_abs_max_f: f32,

    // --- Hysteresis ---
    /// |error| below this moves Heating -> Holding.
    pub holding_band_f: f32,
    /// |error| above this moves Holding -> Heating.
    pub heating_band_f: f32,
    /// Cooldown ends once the coil drops below this.
    pub cooldown_threshold_f: f32,

    // --- SSR ---
    pub ssr_period_ms: u32,
    /// On-times shorter than this are dropped to zero for the window.
    pub ssr_min_on_ms: u32,

    // --- Sensor ---
    /// Consecutive failed reads that escalate to a channel fault.
    pub sensor_error_limit: u8,
    pub sensor_poll_interval_ms: u32,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            temp_min_f: 0.0,
            temp_max_f: 999.0,
            temp_default_f: 710.0,
            temp_abs_max_f: 1050.0,

            holding_band_f: 10.0,
            heating_band_f: 20.0,
            cooldown_threshold_f: 150.0,

            ssr_period_ms: 1000,
            ssr_min_on_ms: 50,

            sensor_error_limit: 10,
            sensor_poll_interval_ms: 250,
        }
    }
}

impl ChannelConfig {
    /// NaN maps to the bottom of the range.
    pub fn clamp_target(&self, temp_f: f32) -> f32 {
        if temp_f.is_nan() {
            return self.temp_min_f;
        }
        temp_f.clamp(self.temp_min_f, self.temp_max_f)
    }
}

/// PID gains and limits. Gains are user-facing (per second).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PidConfig {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    pub sample_ms: u32,
    pub output_min: f32,
    pub output_max: f32,
    /// Derivative low-pass coefficient (0.01..=1.0, 1.0 = unfiltered).
    pub derivative_alpha: f32,
}

impl Default for PidConfig {
    fn default() -> Self {
        Self {
            kp: 8.0,
            ki: 0.2,
            kd: 2.0,
            sample_ms: 250,
            output_min: 0.0,
            output_max: 100.0,
            derivative_alpha: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AutotuneConfig {
    /// Full oscillations averaged before synthesising gains.
    pub oscillations: u8,
    pub timeout_ms: u32,
    /// Relay levels (percent duty).
    pub output_high: f32,
    pub output_low: f32,
}

impl Default for AutotuneConfig {
    fn default() -> Self {
        Self {
            oscillations: 5,
            timeout_ms: 300_000, // 5 min
            output_high: 100.0,
            output_low: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SafetyConfig {
    /// Idle shutdown after this many minutes without operator activity (0 = off).
    pub idle_timeout_min: u16,
    pub idle_timeout_max_min: u16,
    /// Warning tone this long before the idle timeout fires.
    pub idle_warning_lead_ms: u32,
    /// Hardware task-watchdog timeout.
    pub watchdog_timeout_ms: u32,
    /// Control heartbeat older than this stops watchdog acknowledgement.
    pub control_stall_timeout_ms: u32,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            idle_timeout_min: 60,
            idle_timeout_max_min: 120,
            idle_warning_lead_ms: 300_000,
            watchdog_timeout_ms: 10_000,
            control_stall_timeout_ms: 2_000,
        }
    }
}

/// Execution-context layout. Priorities are FreeRTOS priorities.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TaskConfig {
    pub control_period_ms: u32,
    pub control_priority: u8,
    pub control_stack_kb: usize,

    pub safety_period_ms: u32,
    pub safety_priority: u8,
    pub safety_stack_kb: usize,

    pub monitor_period_ms: u32,
    pub monitor_priority: u8,
    pub monitor_stack_kb: usize,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            control_period_ms: 250,
            control_priority: 5,
            control_stack_kb: 8,

            safety_period_ms: 100,
            safety_priority: 6,
            safety_stack_kb: 4,

            monitor_period_ms: 1000,
            monitor_priority: 2,
            monitor_stack_kb: 6,
        }
    }
}
