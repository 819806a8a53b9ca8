//! Per-context cycle logic: the hexagonal core.
//!
//! [`ControlLoop`] owns the channel array and is the only consumer of the
//! command queue. [`SafetyLoop`] owns the [`SafetyManager`]. Both talk to
//! each other and to collaborators exclusively through [`Links`], and both
//! take `now_ms` from the caller, so the task wrappers stay thin and
//! everything here runs on the host.
//!
//! ```text
//!  commands ──▶ ┌─────────────┐ ──▶ temps[ch], heartbeat
//!               │ ControlLoop │
//!  safety ────▶ └─────────────┘
//!
//!  activity, heartbeat, temps ──▶ ┌────────────┐ ──▶ faults, safety
//!                                 │ SafetyLoop │
//!                                 └────────────┘
//! ```

use heapless::Vec;
use log::{info, warn};

use crate::channel::{Channel, ChannelState};
use crate::config::{ControllerConfig, MAX_CHANNELS};
use crate::error::{Error, Result, SafetyFault};
use crate::link::Links;
use crate::safety::SafetyManager;
use crate::sensors::Calibration;

use super::commands::{Command, CommandKind};
use super::events::FaultScope;
use super::ports::{FaultSink, ProfileStore, SafetyPort, SsrOutput, TemperatureSensor};

// ───────────────────────────────────────────────────────────────
// ControlLoop
// ───────────────────────────────────────────────────────────────

pub struct ControlLoop<S, O, P> {
    channels: Vec<Channel<S, O>, MAX_CHANNELS>,
    profiles: P,
    /// Last observed idle-timeout flag, for edge detection.
    idle_seen: bool,
    shutdown_seen: bool,
    cycles: u64,
}

impl<S: TemperatureSensor, O: SsrOutput, P: ProfileStore> ControlLoop<S, O, P> {
    pub fn new(profiles: P) -> Self {
        Self {
            channels: Vec::new(),
            profiles,
            idle_seen: false,
            shutdown_seen: false,
            cycles: 0,
        }
    }

    /// Register the next channel. Its index must match its position.
    pub fn add_channel(&mut self, channel: Channel<S, O>) -> Result<()> {
        if usize::from(channel.index()) != self.channels.len() {
            return Err(Error::Config("channel index out of order"));
        }
        self.channels
            .push(channel)
            .map_err(|_| Error::Config("too many channels"))
    }

    /// One control cycle: commands, safety reaction, channel updates,
    /// publication, heartbeat.
    pub fn run_cycle(&mut self, links: &Links, now_ms: u64) {
        self.cycles += 1;
        let safety = links.safety_status();

        while let Some(cmd) = links.try_recv_command() {
            if self.apply(cmd, now_ms, safety.shutdown) {
                links.note_activity(now_ms);
            }
        }

        if safety.idle_timed_out && !self.idle_seen {
            warn!("Idle timeout: disabling all channels");
            self.disable_active();
        }
        self.idle_seen = safety.idle_timed_out;

        if safety.shutdown {
            if !self.shutdown_seen {
                warn!("Shutdown latched: channels held disabled");
            }
            self.disable_active();
        }
        self.shutdown_seen = safety.shutdown;

        for ch in &mut self.channels {
            ch.update(now_ms);
        }
        for ch in &self.channels {
            links.publish_temp(ch.snapshot());
        }
        links.stamp_heartbeat(now_ms);
    }

    /// Apply one command. Returns `false` if it was ignored.
    pub fn apply(&mut self, cmd: Command, now_ms: u64, shutdown: bool) -> bool {
        let Some(ch) = self.channels.get_mut(usize::from(cmd.channel)) else {
            warn!("Command for unknown channel {} ignored", cmd.channel);
            return false;
        };

        match cmd.kind {
            CommandKind::Enable | CommandKind::StartAutotune if shutdown => {
                warn!("CH{}: {:?} ignored after shutdown", cmd.channel, cmd.kind);
                return false;
            }
            CommandKind::Enable => ch.enable(now_ms),
            CommandKind::Disable | CommandKind::ClearFault => ch.disable(),
            CommandKind::SetTemp { value } => ch.set_target_temp(value),
            CommandKind::AdjustTemp { delta } => ch.adjust_target_temp(delta),
            CommandKind::SetPid { kp, ki, kd } => ch.set_pid_tunings(kp, ki, kd),
            CommandKind::StartAutotune => ch.start_autotune(now_ms),
            CommandKind::CancelAutotune => ch.cancel_autotune(now_ms),
            CommandKind::SetCalibration { offset, enabled } => {
                return ch.set_calibration(Calibration {
                    offset_f: offset,
                    enabled,
                });
            }
            CommandKind::LoadProfile { index } => {
                let Some(profile) = self.profiles.profile(cmd.channel, index) else {
                    warn!("CH{}: no profile {}", cmd.channel, index);
                    return false;
                };
                info!("CH{}: loading profile '{}'", cmd.channel, profile.name);
                ch.set_target_temp(profile.target_f);
                if profile.has_custom_pid {
                    ch.set_pid_tunings(profile.kp, profile.ki, profile.kd);
                }
            }
        }
        true
    }

    fn disable_active(&mut self) {
        for ch in self.channels.iter_mut().filter(|c| c.is_active()) {
            ch.disable();
        }
    }

    pub fn channels(&self) -> &[Channel<S, O>] {
        &self.channels
    }

    pub fn channel(&self, index: u8) -> Option<&Channel<S, O>> {
        self.channels.get(usize::from(index))
    }

    pub fn channel_mut(&mut self, index: u8) -> Option<&mut Channel<S, O>> {
        self.channels.get_mut(usize::from(index))
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }
}

// ───────────────────────────────────────────────────────────────
// SafetyLoop
// ───────────────────────────────────────────────────────────────

pub struct SafetyLoop<P, F> {
    manager: SafetyManager<P, F>,
    channel_count: usize,
    abs_max_f: f32,
    /// Channel was in `Fault` at the previous check.
    faulted: [bool; MAX_CHANNELS],
}

impl<P: SafetyPort, F: FaultSink> SafetyLoop<P, F> {
    pub fn new(manager: SafetyManager<P, F>, config: &ControllerConfig) -> Self {
        Self {
            manager,
            channel_count: config.channel_count(),
            abs_max_f: config.channel.temp_abs_max_f,
            faulted: [false; MAX_CHANNELS],
        }
    }

    pub fn run_cycle(&mut self, links: &Links, now_ms: u64) {
        if let Some(at) = links.take_activity() {
            self.manager.reset_idle_timer(at);
        }

        self.manager.update(now_ms, links.last_heartbeat());
        self.check_channels(links, now_ms);

        links.publish_safety(self.manager.status(now_ms));
    }

    fn check_channels(&mut self, links: &Links, now_ms: u64) {
        let mut any_faulted = false;
        for ch in 0..self.channel_count {
            let Some(update) = links.latest_temp(ch as u8) else {
                any_faulted |= self.faulted[ch];
                continue;
            };
            let faulted = update.state == ChannelState::Fault;
            any_faulted |= faulted;

            if faulted && !self.faulted[ch] {
                let fault = if update.sensor_status.is_ok()
                    && update.raw_temp_f >= self.abs_max_f
                {
                    SafetyFault::OverTemperature
                } else {
                    SafetyFault::SensorError
                };
                self.manager.set_fault(
                    fault,
                    FaultScope::Channel(ch as u8),
                    update.raw_temp_f,
                    now_ms,
                );
            }
            self.faulted[ch] = faulted;
        }

        if !any_faulted {
            self.manager.clear_fault(SafetyFault::OverTemperature);
            self.manager.clear_fault(SafetyFault::SensorError);
        }
    }

    pub fn manager(&self) -> &SafetyManager<P, F> {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut SafetyManager<P, F> {
        &mut self.manager
    }
}
