//! Board adapter for the safety context.
//!
//! Owns the watchdog subscription, buzzer and status LED, and exposes them
//! through [`SafetyPort`]. Emergency output kill goes through the SSR
//! inhibit latch, which also drives every SSR pin low directly.

use crate::app::ports::SafetyPort;
use crate::drivers::buzzer::Buzzer;
use crate::drivers::ssr;
use crate::drivers::status_led::StatusLed;
use crate::drivers::watchdog::Watchdog;

pub struct BoardSafety {
    watchdog: Watchdog,
    buzzer: Buzzer,
    led: StatusLed,
}

impl BoardSafety {
    /// Must be constructed on the safety context's own thread: the
    /// watchdog subscribes the calling task.
    pub fn new(watchdog: Watchdog, buzzer: Buzzer, led: StatusLed) -> Self {
        Self { watchdog, buzzer, led }
    }

    pub fn watchdog(&self) -> &Watchdog {
        &self.watchdog
    }
}

impl SafetyPort for BoardSafety {
    fn feed_watchdog(&mut self) {
        self.watchdog.feed();
    }

    fn set_tone(&mut self, freq_hz: u16) {
        self.buzzer.tone(freq_hz);
    }

    fn set_status_led(&mut self, on: bool) {
        self.led.set(on);
    }

    fn force_outputs_off(&mut self) {
        ssr::inhibit_all();
    }
}
