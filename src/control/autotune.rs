//! Relay-feedback PID autotune
//!
//! Drives the coil with a two-level relay around the setpoint, measures the
//! resulting limit cycle and synthesises gains with the classic
//! Ziegler–Nichols rules:
//!
//! ```text
//! Ku = 4·d / (π·a)      d = relay swing, a = peak-to-peak amplitude
//! Tu = oscillation period
//! kp = 0.6·Ku   ki = 1.2·Ku/Tu   kd = 0.075·Ku·Tu
//! ```
//!
//! Tu is estimated on each downward crossing as twice the time spent above
//! the setpoint since the preceding upward crossing.

use core::f32::consts::PI;

use log::{info, warn};

use crate::config::AutotuneConfig;
use crate::error::AutotuneError;

/// Amplitude (°F) and period (s) at or below this are unusable.
const MIN_MEASURABLE: f32 = 0.1;

/// Gains and process characteristics from one autotune run.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AutotuneResult {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    /// Ultimate gain Ku.
    pub ultimate_gain: f32,
    /// Ultimate period Tu in seconds.
    pub ultimate_period_s: f32,
    pub valid: bool,
}

/// Limit-cycle measurements, live only while oscillating.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Oscillation {
    above: bool,
    peak_high: f32,
    peak_low: f32,
    last_cross_ms: u64,
    period_sum_s: f32,
    amplitude_sum: f32,
    count: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Crossing {
    Up,
    Down,
}

impl Oscillation {
    fn new(measurement: f32, now_ms: u64) -> Self {
        Self {
            above: true,
            peak_high: measurement,
            peak_low: f32::INFINITY,
            last_cross_ms: now_ms,
            period_sum_s: 0.0,
            amplitude_sum: 0.0,
            count: 0,
        }
    }

    fn track(&mut self, measurement: f32, setpoint: f32, now_ms: u64) -> Option<Crossing> {
        let above = measurement > setpoint;
        if above {
            self.peak_high = self.peak_high.max(measurement);
        } else {
            self.peak_low = self.peak_low.min(measurement);
        }
        if above == self.above {
            return None;
        }
        self.above = above;
        let since_cross_s = now_ms.saturating_sub(self.last_cross_ms) as f32 / 1000.0;
        self.last_cross_ms = now_ms;

        if above {
            self.peak_high = measurement;
            return Some(Crossing::Up);
        }

        self.period_sum_s += 2.0 * since_cross_s;
        self.amplitude_sum += self.peak_high - self.peak_low;
        self.count = self.count.saturating_add(1);
        self.peak_low = measurement;
        Some(Crossing::Down)
    }

    pub fn count(&self) -> u8 {
        self.count
    }
}

/// Autotune state machine
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AutotunePhase {
    Idle,
    /// Relay held high until the measurement first exceeds the setpoint.
    WaitingCross,
    Oscillating(Oscillation),
    Complete(AutotuneResult),
    Failed(AutotuneError),
}

impl AutotunePhase {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::WaitingCross => "waiting",
            Self::Oscillating(_) => "oscillating",
            Self::Complete(_) => "complete",
            Self::Failed(_) => "failed",
        }
    }
}

/// Relay autotuner
#[derive(Debug, Clone)]
pub struct Autotuner {
    phase: AutotunePhase,
    setpoint: f32,
    output_high: f32,
    output_low: f32,
    output: f32,
    target_oscillations: u8,
    timeout_ms: u32,
    started_ms: u64,
}

impl Autotuner {
    pub fn new(config: &AutotuneConfig) -> Self {
        Self {
            phase: AutotunePhase::Idle,
            setpoint: 0.0,
            output_high: config.output_high,
            output_low: config.output_low,
            output: 0.0,
            target_oscillations: config.oscillations.max(1),
            timeout_ms: config.timeout_ms,
            started_ms: 0,
        }
    }

    pub fn set_oscillations(&mut self, count: u8) {
        self.target_oscillations = count.max(1);
    }

    pub fn set_timeout(&mut self, timeout_ms: u32) {
        self.timeout_ms = timeout_ms;
    }

    /// Start a run. Any run in progress is discarded.
    pub fn begin(&mut self, setpoint: f32, output_high: f32, output_low: f32, now_ms: u64) {
        self.setpoint = setpoint;
        self.output_high = output_high;
        self.output_low = output_low;
        self.output = output_high;
        self.started_ms = now_ms;
        self.phase = AutotunePhase::WaitingCross;
        info!(
            "Autotune: start (setpoint={:.1}, relay {:.0}/{:.0}, {} cycles)",
            setpoint, output_high, output_low, self.target_oscillations
        );
    }

    /// Feed one measurement; returns the relay output to apply.
    pub fn update(&mut self, measurement: f32, now_ms: u64) -> f32 {
        let oscillation = match self.phase {
            AutotunePhase::Idle | AutotunePhase::Complete(_) | AutotunePhase::Failed(_) => {
                self.output = 0.0;
                return 0.0;
            }
            AutotunePhase::WaitingCross => None,
            AutotunePhase::Oscillating(osc) => Some(osc),
        };

        if now_ms.saturating_sub(self.started_ms) > u64::from(self.timeout_ms) {
            warn!("Autotune: {}", AutotuneError::Timeout);
            self.phase = AutotunePhase::Failed(AutotuneError::Timeout);
            self.output = 0.0;
            return 0.0;
        }

        match oscillation {
            None => {
                if measurement > self.setpoint {
                    self.output = self.output_low;
                    self.phase = AutotunePhase::Oscillating(Oscillation::new(measurement, now_ms));
                }
            }
            Some(mut osc) => {
                match osc.track(measurement, self.setpoint, now_ms) {
                    Some(Crossing::Up) => self.output = self.output_low,
                    Some(Crossing::Down) => self.output = self.output_high,
                    None => {}
                }
                if osc.count >= self.target_oscillations {
                    self.finish(&osc);
                } else {
                    self.phase = AutotunePhase::Oscillating(osc);
                }
            }
        }
        self.output
    }

    fn finish(&mut self, osc: &Oscillation) {
        let n = f32::from(osc.count.max(1));
        let avg_period_s = osc.period_sum_s / n;
        let avg_amplitude = osc.amplitude_sum / n;

        let mut result = AutotuneResult {
            ultimate_period_s: avg_period_s,
            ..AutotuneResult::default()
        };
        if avg_amplitude > MIN_MEASURABLE && avg_period_s > MIN_MEASURABLE {
            let ku = 4.0 * (self.output_high - self.output_low) / (PI * avg_amplitude);
            let tu = avg_period_s;
            result = AutotuneResult {
                kp: 0.6 * ku,
                ki: 1.2 * ku / tu,
                kd: 0.075 * ku * tu,
                ultimate_gain: ku,
                ultimate_period_s: tu,
                valid: true,
            };
            info!(
                "Autotune: complete Ku={:.3} Tu={:.1}s -> kp={:.3} ki={:.4} kd={:.3}",
                ku, tu, result.kp, result.ki, result.kd
            );
        } else {
            warn!(
                "Autotune: {} (amplitude={:.2}, period={:.2}s)",
                AutotuneError::DegenerateOscillation,
                avg_amplitude,
                avg_period_s
            );
        }

        self.phase = AutotunePhase::Complete(result);
        self.output = 0.0;
    }

    /// Abort immediately.
    pub fn cancel(&mut self) {
        if self.is_running() {
            info!("Autotune: cancelled");
        }
        self.phase = AutotunePhase::Idle;
        self.output = 0.0;
    }

    pub fn phase(&self) -> &AutotunePhase {
        &self.phase
    }

    pub fn is_running(&self) -> bool {
        matches!(
            self.phase,
            AutotunePhase::WaitingCross | AutotunePhase::Oscillating(_)
        )
    }

    /// Finished, successfully or not.
    pub fn is_finished(&self) -> bool {
        matches!(
            self.phase,
            AutotunePhase::Complete(_) | AutotunePhase::Failed(_)
        )
    }

    /// Result of the last completed run; invalid unless `Complete` and usable.
    pub fn result(&self) -> AutotuneResult {
        match self.phase {
            AutotunePhase::Complete(result) => result,
            _ => AutotuneResult::default(),
        }
    }

    /// 0.0 ..= 1.0
    pub fn progress(&self) -> f32 {
        match self.phase {
            AutotunePhase::Idle | AutotunePhase::WaitingCross | AutotunePhase::Failed(_) => 0.0,
            AutotunePhase::Oscillating(osc) => {
                f32::from(osc.count) / f32::from(self.target_oscillations)
            }
            AutotunePhase::Complete(_) => 1.0,
        }
    }

    pub fn output(&self) -> f32 {
        self.output
    }
}
