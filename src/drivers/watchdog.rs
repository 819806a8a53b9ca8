//! Task Watchdog Timer (TWDT).
//!
//! Subscribed from the safety context only. The safety manager decides
//! whether to call [`Watchdog::feed`] based on the control heartbeat, so a
//! stalled control loop ends in a hardware reset after `timeout_ms`.

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::{
    ESP_OK, esp_task_wdt_add, esp_task_wdt_config_t, esp_task_wdt_reconfigure,
    esp_task_wdt_reset,
};

use log::{info, warn};

pub struct Watchdog {
    subscribed: bool,
    feeds: u64,
}

impl Watchdog {
    /// Reconfigure the TWDT and subscribe the calling task.
    pub fn new(timeout_ms: u32) -> Self {
        #[cfg(target_os = "espidf")]
        let subscribed = {
            // SAFETY: FFI calls on the current task handle (null = self).
            unsafe {
                let cfg = esp_task_wdt_config_t {
                    timeout_ms,
                    idle_core_mask: 0,
                    trigger_panic: true,
                };
                let ret = esp_task_wdt_reconfigure(&cfg);
                if ret != ESP_OK {
                    warn!("TWDT reconfigure returned {} (may already be configured)", ret);
                }
                esp_task_wdt_add(core::ptr::null_mut()) == ESP_OK
            }
        };

        #[cfg(not(target_os = "espidf"))]
        let subscribed = true;

        if subscribed {
            info!("Watchdog: subscribed ({} ms timeout, panic on trigger)", timeout_ms);
        } else {
            warn!("Watchdog: failed to subscribe");
        }
        Self { subscribed, feeds: 0 }
    }

    pub fn feed(&mut self) {
        if !self.subscribed {
            return;
        }
        self.feeds += 1;
        #[cfg(target_os = "espidf")]
        // SAFETY: resets the TWDT entry of the subscribed task.
        unsafe {
            esp_task_wdt_reset();
        }
    }

    pub fn feeds(&self) -> u64 {
        self.feeds
    }
}
