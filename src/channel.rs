//! Heater channel state machine.
//!
//! A channel owns one thermocouple, one SSR, a PID controller and an
//! autotuner. `update` is called once per control cycle:
//!
//! 1. refresh the sensor
//! 2. evaluate fault conditions (before any control action)
//! 3. Off / Cooldown / Fault: SSR forced off
//! 4. Autotuning: relay output drives the SSR directly
//! 5. Heating / Holding: PID output, time-proportioned onto the SSR
//!
//! ```text
//!            enable                 |err| < hold band
//!   Off ───────────────▶ Heating ─────────────────────▶ Holding
//!    ▲                      ▲  ◀─────────────────────────   │
//!    │ < cooldown           │      |err| > heat band        │
//!  Cooldown ◀── disable ────┴── (any active) ───────────────┘
//!                           │
//!                 sensor errors / abs max
//!                           ▼
//!                         Fault ── disable ──▶ Off / Cooldown
//! ```

use core::fmt;

use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::app::events::TempUpdate;
use crate::app::ports::{SsrOutput, TemperatureSensor};
use crate::config::{AutotuneConfig, ChannelConfig, ControllerConfig};
use crate::control::{AutotunePhase, AutotuneResult, Autotuner, PidController, TimeProportioner};
use crate::error::ControlFault;
use crate::sensors::Calibration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelState {
    Off,
    Heating,
    Holding,
    Cooldown,
    Autotuning,
    Fault,
}

impl ChannelState {
    /// Heater may be energised in this state.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Heating | Self::Holding | Self::Autotuning)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::Heating => "HEAT",
            Self::Holding => "HOLD",
            Self::Cooldown => "COOL",
            Self::Autotuning => "TUNE",
            Self::Fault => "FAULT",
        }
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

pub struct Channel<S, O> {
    index: u8,
    config: ChannelConfig,
    autotune_config: AutotuneConfig,
    sensor: S,
    ssr: O,
    pid: PidController,
    autotuner: Autotuner,
    window: TimeProportioner,
    state: ChannelState,
    target_f: f32,
    output_percent: f32,
    ssr_on: bool,
    fault: Option<ControlFault>,
    last_autotune: Option<AutotuneResult>,
    calibration: Calibration,
}

impl<S: TemperatureSensor, O: SsrOutput> Channel<S, O> {
    /// Build an idle channel. The SSR is driven off once here so the pin
    /// state matches the cached state.
    pub fn new(index: u8, sensor: S, mut ssr: O, config: &ControllerConfig) -> Self {
        ssr.set(false);
        let ch = config.channel;
        let mut pid = PidController::new(&config.pid, (ch.temp_min_f, ch.temp_max_f));
        pid.set_setpoint(ch.temp_default_f);
        Self {
            index,
            config: ch,
            autotune_config: config.autotune,
            sensor,
            ssr,
            pid,
            autotuner: Autotuner::new(&config.autotune),
            window: TimeProportioner::new(&ch),
            state: ChannelState::Off,
            target_f: ch.clamp_target(ch.temp_default_f),
            output_percent: 0.0,
            ssr_on: false,
            fault: None,
            last_autotune: None,
            calibration: Calibration::default(),
        }
    }

    // ── Control cycle ─────────────────────────────────────────

    pub fn update(&mut self, now_ms: u64) {
        self.sensor.update(now_ms);
        self.check_faults();

        match self.state {
            ChannelState::Off | ChannelState::Cooldown | ChannelState::Fault => {
                self.output_percent = 0.0;
                self.drive_ssr(false);
            }
            ChannelState::Autotuning => self.update_autotune(now_ms),
            ChannelState::Heating | ChannelState::Holding => self.update_control(now_ms),
        }
    }

    fn check_faults(&mut self) {
        if self.state.is_active() {
            if self.sensor.error_count() >= self.config.sensor_error_limit {
                self.enter_fault(ControlFault::SensorErrorLimit);
                return;
            }
            if self.sensor.is_ok() && self.sensor.temperature_f() >= self.config.temp_abs_max_f {
                self.enter_fault(ControlFault::OverTemperature);
                return;
            }
        }

        if self.state == ChannelState::Cooldown
            && self.sensor.is_ok()
            && self.sensor.temperature_f() < self.config.cooldown_threshold_f
        {
            self.transition(ChannelState::Off);
        }
    }

    fn enter_fault(&mut self, fault: ControlFault) {
        error!(
            "CH{}: FAULT {} (temp={:.1}F, sensor={}, errors={})",
            self.index,
            fault,
            self.sensor.temperature_f(),
            self.sensor.status().label(),
            self.sensor.error_count()
        );
        self.autotuner.cancel();
        self.pid.set_enabled(false);
        self.output_percent = 0.0;
        self.drive_ssr(false);
        self.fault = Some(fault);
        self.transition(ChannelState::Fault);
    }

    fn update_control(&mut self, now_ms: u64) {
        if self.sensor.is_ok() {
            let temp = self.sensor.temperature_f();
            self.pid.compute(temp, now_ms);

            let error = (self.target_f - temp).abs();
            match self.state {
                ChannelState::Heating if error < self.config.holding_band_f => {
                    self.transition(ChannelState::Holding);
                }
                ChannelState::Holding if error > self.config.heating_band_f => {
                    self.transition(ChannelState::Heating);
                }
                _ => {}
            }
        }

        self.output_percent = if self.pid.is_enabled() { self.pid.output() } else { 0.0 };
        let on = self.window.is_on(self.output_percent, now_ms);
        self.drive_ssr(on);
    }

    fn update_autotune(&mut self, now_ms: u64) {
        if !self.sensor.is_ok() {
            self.output_percent = 0.0;
            self.drive_ssr(false);
            return;
        }

        let relay = self.autotuner.update(self.sensor.temperature_f(), now_ms);
        match *self.autotuner.phase() {
            AutotunePhase::Complete(result) => {
                if result.valid {
                    self.pid.set_tunings(result.kp, result.ki, result.kd);
                    info!(
                        "CH{}: applied autotune gains kp={:.3} ki={:.4} kd={:.3}",
                        self.index, result.kp, result.ki, result.kd
                    );
                } else {
                    warn!("CH{}: autotune result unusable, keeping gains", self.index);
                }
                self.last_autotune = Some(result);
                self.resume_after_autotune(now_ms);
            }
            AutotunePhase::Failed(e) => {
                warn!("CH{}: autotune failed ({}), keeping gains", self.index, e);
                self.resume_after_autotune(now_ms);
            }
            AutotunePhase::Idle | AutotunePhase::WaitingCross | AutotunePhase::Oscillating(_) => {
                self.output_percent = relay;
                let on = self.window.is_on(relay, now_ms);
                self.drive_ssr(on);
            }
        }
    }

    /// Relay released; PID takes over from zero output next cycle.
    fn resume_after_autotune(&mut self, now_ms: u64) {
        self.output_percent = 0.0;
        self.drive_ssr(false);
        self.enable(now_ms);
    }

    // ── Operator operations ───────────────────────────────────

    /// Start closed-loop heating at the current target. Refused in `Fault`.
    pub fn enable(&mut self, _now_ms: u64) {
        if self.state == ChannelState::Fault {
            warn!("CH{}: enable refused while faulted", self.index);
            return;
        }
        if self.autotuner.is_running() {
            self.autotuner.cancel();
        }
        self.pid.set_setpoint(self.target_f);
        self.pid.set_enabled(true);
        self.pid.reset();
        self.window.restart();
        self.transition(ChannelState::Heating);
    }

    /// Stop heating. Also the only way out of `Fault`.
    pub fn disable(&mut self) {
        self.autotuner.cancel();
        self.pid.set_enabled(false);
        self.output_percent = 0.0;
        self.drive_ssr(false);
        if let Some(fault) = self.fault.take() {
            info!("CH{}: fault cleared ({})", self.index, fault);
        }

        let hot = self.sensor.is_ok()
            && self.sensor.temperature_f() > self.config.cooldown_threshold_f;
        self.transition(if hot { ChannelState::Cooldown } else { ChannelState::Off });
    }

    pub fn set_target_temp(&mut self, temp_f: f32) {
        self.target_f = self.config.clamp_target(temp_f);
        self.pid.set_setpoint(self.target_f);
    }

    pub fn adjust_target_temp(&mut self, delta_f: f32) {
        self.set_target_temp(self.target_f + delta_f);
    }

    pub fn set_pid_tunings(&mut self, kp: f32, ki: f32, kd: f32) {
        self.pid.set_tunings(kp, ki, kd);
    }

    /// Set the display offset. Rejected if the offset is out of range.
    pub fn set_calibration(&mut self, calibration: Calibration) -> bool {
        if !calibration.is_valid() {
            warn!("CH{}: calibration offset {} rejected", self.index, calibration.offset_f);
            return false;
        }
        if calibration != self.calibration {
            info!(
                "CH{}: calibration {:+.1}F ({})",
                self.index,
                calibration.offset_f,
                if calibration.enabled { "on" } else { "off" }
            );
        }
        self.calibration = calibration;
        true
    }

    /// Begin relay autotune around the current target. Refused in `Fault`.
    pub fn start_autotune(&mut self, now_ms: u64) {
        if self.state == ChannelState::Fault {
            warn!("CH{}: autotune refused while faulted", self.index);
            return;
        }
        self.autotuner.begin(
            self.target_f,
            self.autotune_config.output_high,
            self.autotune_config.output_low,
            now_ms,
        );
        self.pid.set_enabled(false);
        self.window.restart();
        self.transition(ChannelState::Autotuning);
    }

    /// Abort autotune and resume heating with unchanged gains.
    pub fn cancel_autotune(&mut self, now_ms: u64) {
        if self.state != ChannelState::Autotuning {
            return;
        }
        self.autotuner.cancel();
        self.enable(now_ms);
    }

    // ── Internal ──────────────────────────────────────────────

    fn transition(&mut self, to: ChannelState) {
        if self.state != to {
            info!("CH{}: {} -> {}", self.index, self.state, to);
            self.state = to;
        }
    }

    fn drive_ssr(&mut self, on: bool) {
        if on != self.ssr_on {
            self.ssr.set(on);
            self.ssr_on = on;
        }
    }

    // ── Accessors ─────────────────────────────────────────────

    /// Snapshot for publication. Only `current_temp_f` is calibrated.
    pub fn snapshot(&self) -> TempUpdate {
        let raw = self.current_temp_f();
        let shown = if self.sensor.is_ok() { self.calibration.apply(raw) } else { raw };
        TempUpdate {
            channel: self.index,
            current_temp_f: shown,
            raw_temp_f: raw,
            target_temp_f: self.target_f,
            output_percent: self.output_percent,
            state: self.state,
            sensor_status: self.sensor.status(),
            calibration: self.calibration,
        }
    }

    pub fn index(&self) -> u8 {
        self.index
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    pub fn is_faulted(&self) -> bool {
        self.state == ChannelState::Fault
    }

    pub fn fault(&self) -> Option<ControlFault> {
        self.fault
    }

    /// Reading in °F, or 0 when the sensor is not OK.
    pub fn current_temp_f(&self) -> f32 {
        if self.sensor.is_ok() { self.sensor.temperature_f() } else { 0.0 }
    }

    pub fn calibration(&self) -> Calibration {
        self.calibration
    }

    pub fn target_temp_f(&self) -> f32 {
        self.target_f
    }

    pub fn output_percent(&self) -> f32 {
        self.output_percent
    }

    pub fn is_ssr_on(&self) -> bool {
        self.ssr_on
    }

    pub fn pid(&self) -> &PidController {
        &self.pid
    }

    pub fn autotune_phase(&self) -> &AutotunePhase {
        self.autotuner.phase()
    }

    pub fn autotune_progress(&self) -> f32 {
        self.autotuner.progress()
    }

    pub fn last_autotune(&self) -> Option<AutotuneResult> {
        self.last_autotune
    }

    pub fn sensor(&self) -> &S {
        &self.sensor
    }

    pub fn sensor_mut(&mut self) -> &mut S {
        &mut self.sensor
    }

    pub fn ssr(&self) -> &O {
        &self.ssr
    }
}
