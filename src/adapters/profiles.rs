//! Built-in heating profiles.
//!
//! Every channel gets the same eight slots: four named presets and four
//! "Custom" slots at the default target. None carries its own gains, so
//! loading a profile only moves the target.

use heapless::String;

use crate::app::ports::{Profile, ProfileStore};
use crate::config::{ControllerConfig, MAX_CHANNELS, MAX_PROFILES_PER_CHANNEL};

const PRESETS: [(&str, f32); 4] = [
    ("Low Temp", 500.0),
    ("Medium", 620.0),
    ("Standard", 710.0),
    ("Hot", 800.0),
];

pub struct BuiltinProfiles {
    table: [[Profile; MAX_PROFILES_PER_CHANNEL]; MAX_CHANNELS],
    channels: usize,
}

impl BuiltinProfiles {
    pub fn new(config: &ControllerConfig) -> Self {
        let make = |slot: usize| {
            let (name, target_f) = PRESETS
                .get(slot)
                .copied()
                .unwrap_or(("Custom", config.channel.temp_default_f));
            let mut label = String::new();
            let _ = label.push_str(name);
            Profile {
                name: label,
                target_f,
                kp: config.pid.kp,
                ki: config.pid.ki,
                kd: config.pid.kd,
                has_custom_pid: false,
            }
        };
        Self {
            table: core::array::from_fn(|_| core::array::from_fn(&make)),
            channels: config.channel_count(),
        }
    }

    /// Overwrite one slot (e.g. a user-saved custom profile).
    pub fn set(&mut self, channel: u8, index: u8, profile: Profile) -> bool {
        match self.slot_mut(channel, index) {
            Some(slot) => {
                *slot = profile;
                true
            }
            None => false,
        }
    }

    fn slot_mut(&mut self, channel: u8, index: u8) -> Option<&mut Profile> {
        if usize::from(channel) >= self.channels {
            return None;
        }
        self.table
            .get_mut(usize::from(channel))?
            .get_mut(usize::from(index))
    }
}

impl ProfileStore for BuiltinProfiles {
    fn profile(&self, channel: u8, index: u8) -> Option<Profile> {
        if usize::from(channel) >= self.channels {
            return None;
        }
        self.table
            .get(usize::from(channel))?
            .get(usize::from(index))
            .cloned()
    }
}
