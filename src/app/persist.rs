//! Settings bridge between the store and the core.
//!
//! The control context never touches storage. At startup, stored settings
//! are turned into `SetTemp`/`SetPid`/`SetCalibration` commands; afterwards
//! the monitor context watches published snapshots and writes changed
//! targets and calibrations back.
//! Every store access goes through one `Mutex`.

use std::sync::{Arc, Mutex, MutexGuard};

use heapless::Vec;
use log::{info, warn};

use super::commands::{Command, CommandKind};
use super::events::TempUpdate;
use super::ports::{GlobalSettings, SettingsStore, StorageError};
use crate::adapters::settings::{default_channel, default_global};
use crate::config::{ControllerConfig, MAX_CHANNELS};
use crate::sensors::Calibration;

pub type SharedStore<S> = Arc<Mutex<S>>;

/// A poisoned lock only means another context panicked mid-call; the
/// store itself stays usable.
fn lock<S>(store: &Mutex<S>) -> MutexGuard<'_, S> {
    store.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Startup commands restoring each channel, plus the global settings.
/// Missing or unreadable records fall back to defaults.
pub fn restore<S: SettingsStore>(
    store: &Mutex<S>,
    config: &ControllerConfig,
) -> (Vec<Command, { MAX_CHANNELS * 3 }>, GlobalSettings) {
    let store = lock(store);
    let mut commands = Vec::new();

    for ch in 0..config.channel_count() as u8 {
        let settings = match store.load_channel(ch) {
            Ok(s) => {
                info!("CH{}: restored target={:.0}F kp={} ki={} kd={}", ch, s.target_f, s.kp, s.ki, s.kd);
                s
            }
            Err(StorageError::NotFound) => default_channel(config),
            Err(e) => {
                warn!("CH{}: settings load failed ({}), using defaults", ch, e);
                default_channel(config)
            }
        };
        // Capacity is exactly three per channel.
        let _ = commands.push(Command::set_temp(ch, settings.target_f));
        let _ = commands.push(Command::set_pid(ch, settings.kp, settings.ki, settings.kd));
        let _ = commands.push(Command::set_calibration(ch, settings.calibration));
    }

    let global = match store.load_global() {
        Ok(g) => g,
        Err(StorageError::NotFound) => default_global(config),
        Err(e) => {
            warn!("Global settings load failed ({}), using defaults", e);
            default_global(config)
        }
    };
    (commands, global)
}

/// Writes a channel's target and calibration back when they change.
pub struct SettingsPersister<S> {
    store: SharedStore<S>,
    config: ControllerConfig,
    saved: [Saved; MAX_CHANNELS],
}

#[derive(Debug, Clone, Copy, Default)]
struct Saved {
    target_f: Option<f32>,
    calibration: Option<Calibration>,
}

impl<S: SettingsStore> SettingsPersister<S> {
    pub fn new(store: SharedStore<S>, config: &ControllerConfig) -> Self {
        Self {
            store,
            config: config.clone(),
            saved: [Saved::default(); MAX_CHANNELS],
        }
    }

    /// Record what is already stored so the first snapshot does not
    /// trigger a write.
    pub fn seed(&mut self, commands: &[Command]) {
        for cmd in commands {
            let Some(slot) = self.saved.get_mut(usize::from(cmd.channel)) else {
                continue;
            };
            match cmd.kind {
                CommandKind::SetTemp { value } => {
                    slot.target_f = Some(self.config.channel.clamp_target(value));
                }
                CommandKind::SetCalibration { offset, enabled } => {
                    slot.calibration = Some(Calibration {
                        offset_f: offset,
                        enabled,
                    });
                }
                _ => {}
            }
        }
    }

    /// Persist the snapshot's target and calibration if either differs
    /// from the last save. Returns `true` when a write happened.
    pub fn observe(&mut self, update: &TempUpdate) -> bool {
        let Some(saved) = self.saved.get_mut(usize::from(update.channel)) else {
            return false;
        };
        if saved.target_f == Some(update.target_temp_f)
            && saved.calibration == Some(update.calibration)
        {
            return false;
        }

        let mut store = lock(&self.store);
        let mut settings = store
            .load_channel(update.channel)
            .unwrap_or_else(|_| default_channel(&self.config));
        settings.target_f = update.target_temp_f;
        settings.calibration = update.calibration;
        match store.save_channel(update.channel, &settings) {
            Ok(()) => {
                saved.target_f = Some(update.target_temp_f);
                saved.calibration = Some(update.calibration);
                true
            }
            Err(e) => {
                warn!("CH{}: settings save failed ({})", update.channel, e);
                false
            }
        }
    }

    pub fn store(&self) -> &SharedStore<S> {
        &self.store
    }
}
