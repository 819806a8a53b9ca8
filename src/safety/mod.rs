//! Safety manager.
//!
//! Runs in the highest-priority context at a short fixed period and owns
//! everything that must keep working when the control loop does not:
//!
//! - **Watchdog.** The hardware watchdog is acknowledged only while the
//!   control context's heartbeat is fresh. A stale heartbeat latches the
//!   `Watchdog` fault, shuts the outputs down and stops acknowledging, so
//!   the hardware resets the device.
//! - **Idle timeout.** No operator activity for the configured minutes
//!   latches `IdleTimeout`. A single warning beep is queued once when the
//!   remaining time crosses the warning lead.
//! - **Fault bitmask.** Independent bits, set/cleared individually. Each
//!   `set_fault` also pushes a [`FaultEvent`] (dropped if the queue is full;
//!   the bit stays set regardless).
//! - **Alerts** and the status LED.
//! - **Emergency shutdown.** Idempotent and sticky for the rest of uptime.

pub mod alerts;

use log::{error, info, warn};

use crate::app::events::{FaultEvent, FaultScope, SafetyStatus};
use crate::app::ports::{FaultSink, SafetyPort};
use crate::config::SafetyConfig;
use crate::error::SafetyFault;
use alerts::{ALARM, AlertSequencer, CONFIRM, WARNING};

/// Status LED blink half-period while a fault is latched.
const FAULT_BLINK_MS: u64 = 250;

pub struct SafetyManager<P, F> {
    port: P,
    events: F,
    config: SafetyConfig,
    /// Latched fault bitmask.
    faults: u8,
    shutdown: bool,
    idle_timeout_min: u16,
    idle_timed_out: bool,
    idle_warned: bool,
    last_activity_ms: u64,
    started_ms: u64,
    alerts: AlertSequencer,
    led_on: Option<bool>,
}

impl<P: SafetyPort, F: FaultSink> SafetyManager<P, F> {
    pub fn new(port: P, events: F, config: &SafetyConfig, now_ms: u64) -> Self {
        let mut mgr = Self {
            port,
            events,
            config: *config,
            faults: 0,
            shutdown: false,
            idle_timeout_min: 0,
            idle_timed_out: false,
            idle_warned: false,
            last_activity_ms: now_ms,
            started_ms: now_ms,
            alerts: AlertSequencer::new(),
            led_on: None,
        };
        mgr.set_idle_timeout(config.idle_timeout_min);
        mgr
    }

    /// Periodic tick. `control_heartbeat_ms` is the control context's last
    /// completed cycle, `None` if it has not run yet.
    pub fn update(&mut self, now_ms: u64, control_heartbeat_ms: Option<u64>) {
        self.check_heartbeat(now_ms, control_heartbeat_ms);

        let port = &mut self.port;
        self.alerts.update(now_ms, |freq| port.set_tone(freq));

        self.check_idle(now_ms);
        self.update_led(now_ms);
    }

    fn check_heartbeat(&mut self, now_ms: u64, heartbeat_ms: Option<u64>) {
        if self.has(SafetyFault::Watchdog) {
            return;
        }
        let last = heartbeat_ms.unwrap_or(self.started_ms);
        let age = now_ms.saturating_sub(last);
        if age > u64::from(self.config.control_stall_timeout_ms) {
            error!("Control loop stalled for {} ms, withholding watchdog", age);
            self.set_fault(SafetyFault::Watchdog, FaultScope::Global, 0.0, now_ms);
            self.emergency_shutdown();
            return;
        }
        self.port.feed_watchdog();
    }

    fn check_idle(&mut self, now_ms: u64) {
        if self.idle_timeout_min == 0 || self.idle_timed_out {
            return;
        }
        let timeout_ms = self.idle_timeout_ms();
        let elapsed = now_ms.saturating_sub(self.last_activity_ms);
        let lead = u64::from(self.config.idle_warning_lead_ms);

        if !self.idle_warned && timeout_ms > lead && elapsed >= timeout_ms - lead {
            self.idle_warned = true;
            warn!("Idle shutdown in {} s", (timeout_ms - elapsed) / 1000);
            self.alerts.play(&WARNING);
        }

        if elapsed >= timeout_ms {
            self.idle_timed_out = true;
            warn!("Idle timeout after {} min", self.idle_timeout_min);
            self.set_fault(SafetyFault::IdleTimeout, FaultScope::Global, 0.0, now_ms);
            self.alerts.play(&ALARM);
        }
    }

    fn update_led(&mut self, now_ms: u64) {
        let on = if self.shutdown {
            false
        } else if self.has_fault() {
            (now_ms / FAULT_BLINK_MS) % 2 == 0
        } else {
            true
        };
        if self.led_on != Some(on) {
            self.port.set_status_led(on);
            self.led_on = Some(on);
        }
    }

    // ── Idle timeout ──────────────────────────────────────────

    /// Operator interaction. Clears a latched idle timeout.
    pub fn reset_idle_timer(&mut self, now_ms: u64) {
        self.last_activity_ms = now_ms;
        self.idle_warned = false;
        if self.idle_timed_out {
            info!("Idle timeout cleared by activity");
            self.idle_timed_out = false;
            self.clear_fault(SafetyFault::IdleTimeout);
        }
    }

    /// Minutes, 0 disables. Clamped to the configured maximum.
    pub fn set_idle_timeout(&mut self, minutes: u16) {
        self.idle_timeout_min = minutes.min(self.config.idle_timeout_max_min);
    }

    pub fn idle_timeout_min(&self) -> u16 {
        self.idle_timeout_min
    }

    fn idle_timeout_ms(&self) -> u64 {
        u64::from(self.idle_timeout_min) * 60_000
    }

    pub fn is_idle_timed_out(&self) -> bool {
        self.idle_timed_out
    }

    /// `None` when the timeout is disabled or has already fired.
    pub fn idle_remaining_ms(&self, now_ms: u64) -> Option<u64> {
        if self.idle_timeout_min == 0 || self.idle_timed_out {
            return None;
        }
        let elapsed = now_ms.saturating_sub(self.last_activity_ms);
        Some(self.idle_timeout_ms().saturating_sub(elapsed))
    }

    // ── Fault bitmask ─────────────────────────────────────────

    /// Latch a fault bit and report it.
    pub fn set_fault(&mut self, fault: SafetyFault, scope: FaultScope, temperature_f: f32, now_ms: u64) {
        if self.faults & fault.mask() == 0 {
            error!("SAFETY FAULT SET: {fault} ({:?})", scope);
        }
        self.faults |= fault.mask();
        self.events.try_send_fault(FaultEvent {
            fault,
            scope,
            temperature_f,
            timestamp_ms: now_ms,
        });
    }

    pub fn clear_fault(&mut self, fault: SafetyFault) {
        if self.faults & fault.mask() != 0 {
            info!("SAFETY FAULT CLEARED: {fault}");
        }
        self.faults &= !fault.mask();
    }

    /// Current fault bitmask.
    pub fn faults(&self) -> u8 {
        self.faults
    }

    /// True if **any** fault is active.
    pub fn has_fault(&self) -> bool {
        self.faults != 0
    }

    /// Check if a specific fault is active.
    pub fn has(&self, fault: SafetyFault) -> bool {
        self.faults & fault.mask() != 0
    }

    // ── Shutdown & alerts ─────────────────────────────────────

    /// Force every output off and latch the shutdown flag. Repeat calls
    /// do nothing.
    pub fn emergency_shutdown(&mut self) {
        if self.shutdown {
            return;
        }
        self.shutdown = true;
        error!("EMERGENCY SHUTDOWN: all outputs forced off");
        self.port.force_outputs_off();
        self.alerts.clear();
        self.alerts.play(&ALARM);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown
    }

    pub fn play_confirm(&mut self) {
        self.alerts.play(&CONFIRM);
    }

    pub fn play_alarm(&mut self) {
        self.alerts.play(&ALARM);
    }

    pub fn status(&self, now_ms: u64) -> SafetyStatus {
        SafetyStatus {
            faults: self.faults,
            shutdown: self.shutdown,
            idle_timed_out: self.idle_timed_out,
            idle_remaining_ms: self.idle_remaining_ms(now_ms),
        }
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn events(&self) -> &F {
        &self.events
    }
}
