//! Mock hardware adapters for integration tests.
//!
//! Records every output call so tests can assert on the full history
//! without touching real GPIO/LEDC registers.

use coilctl::app::ports::{Profile, ProfileStore, SafetyPort, SsrOutput, TemperatureSensor};
use coilctl::channel::Channel;
use coilctl::config::ControllerConfig;
use coilctl::error::SensorFault;
use coilctl::sensors::SensorStatus;

// ── Thermocouple ──────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MockSensor {
    pub temp_f: f32,
    pub fault: Option<SensorFault>,
    pub errors: u8,
    pub reads: u32,
}

#[allow(dead_code)]
impl MockSensor {
    pub fn at(temp_f: f32) -> Self {
        Self {
            temp_f,
            ..Self::default()
        }
    }

    /// Simulate `errors` consecutive failed reads.
    pub fn fail(&mut self, errors: u8) {
        self.fault = Some(SensorFault::OpenCircuit);
        self.errors = errors;
    }

    pub fn recover(&mut self) {
        self.fault = None;
        self.errors = 0;
    }
}

impl TemperatureSensor for MockSensor {
    fn update(&mut self, _now_ms: u64) {
        self.reads += 1;
    }

    fn temperature_f(&self) -> f32 {
        self.temp_f
    }

    fn status(&self) -> SensorStatus {
        self.fault.map_or(SensorStatus::Ok, SensorStatus::Fault)
    }

    fn error_count(&self) -> u8 {
        self.errors
    }
}

// ── SSR ───────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct RecordingSsr {
    pub history: Vec<bool>,
}

#[allow(dead_code)]
impl RecordingSsr {
    pub fn is_on(&self) -> bool {
        self.history.last().copied().unwrap_or(false)
    }

    pub fn ever_on(&self) -> bool {
        self.history.iter().any(|&on| on)
    }
}

impl SsrOutput for RecordingSsr {
    fn set(&mut self, on: bool) {
        self.history.push(on);
    }
}

// ── Safety board ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum SafetyCall {
    Feed,
    Tone(u16),
    Led(bool),
    OutputsOff,
}

#[derive(Debug, Default)]
pub struct MockSafetyPort {
    pub calls: Vec<SafetyCall>,
}

#[allow(dead_code)]
impl MockSafetyPort {
    pub fn feeds(&self) -> usize {
        self.calls.iter().filter(|c| **c == SafetyCall::Feed).count()
    }

    pub fn outputs_killed(&self) -> bool {
        self.calls.contains(&SafetyCall::OutputsOff)
    }

    pub fn tones(&self) -> Vec<u16> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                SafetyCall::Tone(f) => Some(*f),
                _ => None,
            })
            .collect()
    }
}

impl SafetyPort for MockSafetyPort {
    fn feed_watchdog(&mut self) {
        self.calls.push(SafetyCall::Feed);
    }

    fn set_tone(&mut self, freq_hz: u16) {
        self.calls.push(SafetyCall::Tone(freq_hz));
    }

    fn set_status_led(&mut self, on: bool) {
        self.calls.push(SafetyCall::Led(on));
    }

    fn force_outputs_off(&mut self) {
        self.calls.push(SafetyCall::OutputsOff);
    }
}

// ── Profiles ──────────────────────────────────────────────────

/// Slot 0: target only. Slot 1: target plus gains.
pub struct TwoProfiles;

impl ProfileStore for TwoProfiles {
    fn profile(&self, _channel: u8, index: u8) -> Option<Profile> {
        let mut name = heapless::String::new();
        match index {
            0 => {
                name.push_str("Warm").ok()?;
                Some(Profile {
                    name,
                    target_f: 450.0,
                    kp: 1.0,
                    ki: 1.0,
                    kd: 1.0,
                    has_custom_pid: false,
                })
            }
            1 => {
                name.push_str("Tuned").ok()?;
                Some(Profile {
                    name,
                    target_f: 600.0,
                    kp: 12.0,
                    ki: 0.4,
                    kd: 3.0,
                    has_custom_pid: true,
                })
            }
            _ => None,
        }
    }
}

pub fn mock_channel(index: u8, temp_f: f32, config: &ControllerConfig) -> Channel<MockSensor, RecordingSsr> {
    Channel::new(index, MockSensor::at(temp_f), RecordingSsr::default(), config)
}
