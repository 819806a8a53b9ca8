//! PID controller for coil temperature
//!
//! Fixed-sample-period PID with integral clamping, derivative on
//! measurement and a one-pole filter on the derivative term. Gains are
//! stored pre-scaled by the sample period so `compute` is a handful of
//! multiply-adds.

use log::warn;

use crate::config::PidConfig;

/// PID controller
#[derive(Debug, Clone)]
pub struct PidController {
    // User-facing gains, kept so a sample-period change can rescale.
    kp: f32,
    ki: f32,
    kd: f32,
    // Gains scaled by the sample period.
    ki_scaled: f32,
    kd_scaled: f32,

    setpoint: f32,
    setpoint_min: f32,
    setpoint_max: f32,
    output_min: f32,
    output_max: f32,
    alpha: f32,
    sample_ms: u32,

    integral: f32,
    prev_measurement: f32,
    last_error: f32,
    p_term: f32,
    i_term: f32,
    d_term: f32,
    output: f32,

    last_compute_ms: Option<u64>,
    enabled: bool,
    first_run: bool,
}

impl PidController {
    /// Build a disabled controller. `setpoint_range` bounds every setpoint.
    pub fn new(config: &PidConfig, setpoint_range: (f32, f32)) -> Self {
        let mut pid = Self {
            kp: 0.0,
            ki: 0.0,
            kd: 0.0,
            ki_scaled: 0.0,
            kd_scaled: 0.0,
            setpoint: setpoint_range.0,
            setpoint_min: setpoint_range.0,
            setpoint_max: setpoint_range.1,
            output_min: 0.0,
            output_max: 100.0,
            alpha: 0.1,
            sample_ms: config.sample_ms.max(1),
            integral: 0.0,
            prev_measurement: 0.0,
            last_error: 0.0,
            p_term: 0.0,
            i_term: 0.0,
            d_term: 0.0,
            output: 0.0,
            last_compute_ms: None,
            enabled: false,
            first_run: true,
        };
        pid.set_output_limits(config.output_min, config.output_max);
        pid.set_derivative_filter(config.derivative_alpha);
        pid.set_tunings(config.kp, config.ki, config.kd);
        pid
    }

    /// Set user-facing gains. Negative or non-finite gains are rejected.
    pub fn set_tunings(&mut self, kp: f32, ki: f32, kd: f32) {
        let dt_s = self.sample_ms as f32 / 1000.0;
        let (ki_scaled, kd_scaled) = (ki * dt_s, kd / dt_s);
        let usable = |g: f32| g.is_finite() && g >= 0.0;
        if ![kp, ki, kd, ki_scaled, kd_scaled].into_iter().all(usable) {
            warn!("PID: rejected tunings ({kp}, {ki}, {kd})");
            return;
        }
        self.kp = kp;
        self.ki = ki;
        self.kd = kd;
        self.ki_scaled = ki_scaled;
        self.kd_scaled = kd_scaled;
    }

    /// Change the sample period and rescale the stored gains to match.
    pub fn set_sample_time(&mut self, sample_ms: u32) {
        if sample_ms == 0 {
            return;
        }
        self.sample_ms = sample_ms;
        self.set_tunings(self.kp, self.ki, self.kd);
    }

    /// Set output limits. Ignored unless `min < max`.
    pub fn set_output_limits(&mut self, min: f32, max: f32) {
        if !(min.is_finite() && max.is_finite() && min < max) {
            return;
        }
        self.output_min = min;
        self.output_max = max;
        self.integral = self.integral.clamp(min, max);
        self.output = self.output.clamp(min, max);
    }

    /// Update setpoint, clamped to the device range.
    pub fn set_setpoint(&mut self, setpoint: f32) {
        if setpoint.is_nan() {
            return;
        }
        self.setpoint = setpoint.clamp(self.setpoint_min, self.setpoint_max);
    }

    pub fn set_derivative_filter(&mut self, alpha: f32) {
        if alpha.is_nan() {
            return;
        }
        self.alpha = alpha.clamp(0.01, 1.0);
    }

    /// Enable or disable. Enabling from disabled is a bumpless transfer.
    pub fn set_enabled(&mut self, enabled: bool) {
        if enabled && !self.enabled {
            self.reset();
        }
        if !enabled {
            self.output = 0.0;
        }
        self.enabled = enabled;
    }

    /// Run one control step if enabled and a sample period has elapsed.
    /// Otherwise returns the previous output untouched, as it does for a
    /// non-finite measurement.
    pub fn compute(&mut self, measurement: f32, now_ms: u64) -> f32 {
        if !self.enabled || !measurement.is_finite() {
            return self.output;
        }
        if let Some(last) = self.last_compute_ms {
            if now_ms.saturating_sub(last) < u64::from(self.sample_ms) {
                return self.output;
            }
        }
        self.last_compute_ms = Some(now_ms);

        if self.first_run {
            self.prev_measurement = measurement;
            self.first_run = false;
            return self.output;
        }

        let error = self.setpoint - measurement;
        self.last_error = error;

        self.p_term = self.kp * error;

        self.integral = (self.integral + self.ki_scaled * error)
            .clamp(self.output_min, self.output_max);
        self.i_term = self.integral;

        let raw_d = -self.kd_scaled * (measurement - self.prev_measurement);
        self.d_term = self.alpha * raw_d + (1.0 - self.alpha) * self.d_term;
        self.prev_measurement = measurement;

        self.output =
            (self.p_term + self.i_term + self.d_term).clamp(self.output_min, self.output_max);
        self.output
    }

    /// Clear transient state. Gains and setpoint are kept.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.prev_measurement = 0.0;
        self.last_error = 0.0;
        self.p_term = 0.0;
        self.i_term = 0.0;
        self.d_term = 0.0;
        self.output = 0.0;
        self.last_compute_ms = None;
        self.first_run = true;
    }

    // ── Accessors ─────────────────────────────────────────────

    pub fn output(&self) -> f32 {
        self.output
    }

    pub fn setpoint(&self) -> f32 {
        self.setpoint
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// User-facing (kp, ki, kd).
    pub fn tunings(&self) -> (f32, f32, f32) {
        (self.kp, self.ki, self.kd)
    }

    pub fn sample_ms(&self) -> u32 {
        self.sample_ms
    }

    pub fn integral(&self) -> f32 {
        self.integral
    }

    pub fn last_error(&self) -> f32 {
        self.last_error
    }

    /// Most recent (P, I, D) contributions.
    pub fn terms(&self) -> (f32, f32, f32) {
        (self.p_term, self.i_term, self.d_term)
    }
}
