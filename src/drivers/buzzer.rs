//! Piezo buzzer on the LEDC channel configured by `hw_init`.

use crate::drivers::hw_init;

pub struct Buzzer {
    freq_hz: u16,
}

impl Default for Buzzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Buzzer {
    pub fn new() -> Self {
        hw_init::buzzer_tone(0);
        Self { freq_hz: 0 }
    }

    /// Start a tone; 0 silences.
    pub fn tone(&mut self, freq_hz: u16) {
        if freq_hz != self.freq_hz {
            hw_init::buzzer_tone(freq_hz);
            self.freq_hz = freq_hz;
        }
    }

    pub fn frequency(&self) -> u16 {
        self.freq_hz
    }
}
