//! NVS-backed settings store.
//!
//! Implements [`SettingsStore`]: one postcard blob per channel
//! (`ch0`..`ch3`) plus a `global` blob, all in the `coilctl` namespace.
//!
//! - **`target_os = "espidf"`**: raw `nvs_*` calls; each commit is atomic.
//! - **otherwise**: in-memory map, for host tests and simulation.
//!
//! Loads are validated field by field: anything out of range falls back to
//! its default instead of failing the whole record, so a partially bad
//! blob never keeps a channel from starting.

use log::{info, warn};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::app::ports::{ChannelSettings, GlobalSettings, SettingsStore, StorageError};
use crate::config::{ControllerConfig, MAX_PROFILES_PER_CHANNEL};
use crate::sensors::Calibration;

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

const NAMESPACE: &str = "coilctl";
const GLOBAL_KEY: &str = "global";
const MAX_BLOB_SIZE: usize = 64;

const KP_RANGE: core::ops::RangeInclusive<f32> = 0.0..=100.0;
const KI_RANGE: core::ops::RangeInclusive<f32> = 0.0..=50.0;
const KD_RANGE: core::ops::RangeInclusive<f32> = 0.0..=100.0;

// ── Validation ────────────────────────────────────────────────

/// Replace out-of-range fields with defaults.
pub fn validate_channel(raw: ChannelSettings, config: &ControllerConfig) -> ChannelSettings {
    let ch = &config.channel;
    let pid = &config.pid;
    let pick = |v: f32, range: core::ops::RangeInclusive<f32>, default: f32, what: &str| {
        if range.contains(&v) {
            v
        } else {
            warn!("Settings: {} {} out of range, using {}", what, v, default);
            default
        }
    };
    ChannelSettings {
        target_f: pick(raw.target_f, ch.temp_min_f..=ch.temp_max_f, ch.temp_default_f, "target"),
        kp: pick(raw.kp, KP_RANGE, pid.kp, "kp"),
        ki: pick(raw.ki, KI_RANGE, pid.ki, "ki"),
        kd: pick(raw.kd, KD_RANGE, pid.kd, "kd"),
        calibration: if raw.calibration.is_valid() {
            raw.calibration
        } else {
            warn!("Settings: calibration offset {} out of range, cleared", raw.calibration.offset_f);
            Calibration::default()
        },
    }
}

pub fn validate_global(raw: GlobalSettings, config: &ControllerConfig) -> GlobalSettings {
    let safety = &config.safety;
    GlobalSettings {
        idle_timeout_min: if raw.idle_timeout_min > safety.idle_timeout_max_min {
            warn!("Settings: idle timeout {} min too long", raw.idle_timeout_min);
            safety.idle_timeout_min
        } else {
            raw.idle_timeout_min
        },
        active_profile: if usize::from(raw.active_profile) < MAX_PROFILES_PER_CHANNEL {
            raw.active_profile
        } else {
            0
        },
    }
}

/// Defaults used when nothing is stored yet.
pub fn default_channel(config: &ControllerConfig) -> ChannelSettings {
    ChannelSettings {
        target_f: config.channel.temp_default_f,
        kp: config.pid.kp,
        ki: config.pid.ki,
        kd: config.pid.kd,
        calibration: Calibration::default(),
    }
}

pub fn default_global(config: &ControllerConfig) -> GlobalSettings {
    GlobalSettings {
        idle_timeout_min: config.safety.idle_timeout_min,
        active_profile: 0,
    }
}

// ── Adapter ───────────────────────────────────────────────────

pub struct NvsSettings {
    config: ControllerConfig,
    #[cfg(not(target_os = "espidf"))]
    store: HashMap<String, Vec<u8>>,
}

impl NvsSettings {
    /// Initialise NVS flash. A full or outdated partition is erased and
    /// re-initialised.
    pub fn new(config: &ControllerConfig) -> Result<Self, StorageError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: called once from main() before any other NVS access.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                warn!("NVS: erasing and re-initialising flash partition");
                if unsafe { nvs_flash_erase() } != ESP_OK || unsafe { nvs_flash_init() } != ESP_OK {
                    return Err(StorageError::IoError);
                }
            } else if ret != ESP_OK {
                return Err(StorageError::IoError);
            }
            info!("NvsSettings: ESP-IDF NVS initialised");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("NvsSettings: simulation backend");

        Ok(Self {
            config: config.clone(),
            #[cfg(not(target_os = "espidf"))]
            store: HashMap::new(),
        })
    }

    fn channel_key(channel: u8) -> heapless::String<8> {
        let mut key = heapless::String::new();
        // "ch" + at most three digits always fits.
        let _ = core::fmt::write(&mut key, format_args!("ch{}", channel));
        key
    }

    fn load_blob<T: DeserializeOwned>(&self, key: &str) -> Result<T, StorageError> {
        let mut buf = [0u8; MAX_BLOB_SIZE];
        let len = self.read_raw(key, &mut buf)?;
        postcard::from_bytes(&buf[..len]).map_err(|_| StorageError::Corrupted)
    }

    fn save_blob<T: Serialize>(&mut self, key: &str, value: &T) -> Result<(), StorageError> {
        let mut buf = [0u8; MAX_BLOB_SIZE];
        let bytes = postcard::to_slice(value, &mut buf).map_err(|_| StorageError::Full)?;
        self.write_raw(key, bytes)
    }

    #[cfg(not(target_os = "espidf"))]
    fn read_raw(&self, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        let data = self.store.get(key).ok_or(StorageError::NotFound)?;
        let len = data.len().min(buf.len());
        buf[..len].copy_from_slice(&data[..len]);
        Ok(len)
    }

    #[cfg(not(target_os = "espidf"))]
    fn write_raw(&mut self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.store.insert(key.to_owned(), data.to_vec());
        Ok(())
    }

    #[cfg(test)]
    fn write_raw_for_test(&mut self, key: &str, data: &[u8]) {
        self.store.insert(key.to_owned(), data.to_vec());
    }

    /// Open the namespace, run `f` with the handle, close it.
    #[cfg(target_os = "espidf")]
    fn with_nvs_handle<F, T>(write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let mut ns_buf = [0u8; 16];
        let len = NAMESPACE.len().min(15);
        ns_buf[..len].copy_from_slice(&NAMESPACE.as_bytes()[..len]);

        let mut handle: nvs_handle_t = 0;
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };

        // SAFETY: ns_buf is NUL-terminated; handle is closed below.
        let ret = unsafe { nvs_open(ns_buf.as_ptr().cast(), mode, &mut handle) };
        if ret != ESP_OK {
            return Err(ret);
        }
        let result = f(handle);
        unsafe { nvs_close(handle) };
        result
    }

    #[cfg(target_os = "espidf")]
    fn key_buf(key: &str) -> [u8; 16] {
        let mut buf = [0u8; 16];
        let len = key.len().min(15);
        buf[..len].copy_from_slice(&key.as_bytes()[..len]);
        buf
    }

    #[cfg(target_os = "espidf")]
    fn read_raw(&self, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        let key_buf = Self::key_buf(key);
        let result = Self::with_nvs_handle(false, |handle| {
            let mut size = buf.len();
            // SAFETY: key_buf is NUL-terminated; size bounds the write into buf.
            let ret = unsafe {
                nvs_get_blob(handle, key_buf.as_ptr().cast(), buf.as_mut_ptr().cast(), &mut size)
            };
            if ret != ESP_OK {
                return Err(ret);
            }
            Ok(size)
        });
        match result {
            Ok(size) => Ok(size),
            Err(e) if e == ESP_ERR_NVS_NOT_FOUND => Err(StorageError::NotFound),
            Err(e) if e == ESP_ERR_NVS_INVALID_LENGTH => Err(StorageError::Corrupted),
            Err(e) => {
                warn!("NvsSettings: read '{}' failed ({})", key, e);
                Err(StorageError::IoError)
            }
        }
    }

    #[cfg(target_os = "espidf")]
    fn write_raw(&mut self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        let key_buf = Self::key_buf(key);
        let result = Self::with_nvs_handle(true, |handle| {
            // SAFETY: key_buf is NUL-terminated; data outlives the call.
            let ret = unsafe {
                nvs_set_blob(handle, key_buf.as_ptr().cast(), data.as_ptr().cast(), data.len())
            };
            if ret != ESP_OK {
                return Err(ret);
            }
            let ret = unsafe { nvs_commit(handle) };
            if ret != ESP_OK {
                return Err(ret);
            }
            Ok(())
        });
        result.map_err(|e| {
            warn!("NvsSettings: write '{}' failed ({})", key, e);
            if e == ESP_ERR_NVS_NOT_ENOUGH_SPACE {
                StorageError::Full
            } else {
                StorageError::IoError
            }
        })
    }
}

impl SettingsStore for NvsSettings {
    fn load_channel(&self, channel: u8) -> Result<ChannelSettings, StorageError> {
        let raw: ChannelSettings = self.load_blob(&Self::channel_key(channel))?;
        Ok(validate_channel(raw, &self.config))
    }

    fn save_channel(&mut self, channel: u8, settings: &ChannelSettings) -> Result<(), StorageError> {
        let clean = validate_channel(*settings, &self.config);
        self.save_blob(&Self::channel_key(channel), &clean)?;
        info!("NvsSettings: CH{} saved (target={:.0}F)", channel, clean.target_f);
        Ok(())
    }

    fn load_global(&self) -> Result<GlobalSettings, StorageError> {
        let raw: GlobalSettings = self.load_blob(GLOBAL_KEY)?;
        Ok(validate_global(raw, &self.config))
    }

    fn save_global(&mut self, settings: &GlobalSettings) -> Result<(), StorageError> {
        let clean = validate_global(*settings, &self.config);
        self.save_blob(GLOBAL_KEY, &clean)
    }
}
