//! GPIO / peripheral pin assignments for the four-channel heater board.
//!
//! Single source of truth: drivers and startup code reference this module
//! rather than hard-coding pin numbers.

use crate::config::MAX_CHANNELS;

// ---------------------------------------------------------------------------
// Solid-state relays (active HIGH, opto-isolated)
// ---------------------------------------------------------------------------

/// SSR drive outputs, indexed by channel.
pub const SSR_GPIOS: [i32; MAX_CHANNELS] = [38, 39, 40, 41];

// ---------------------------------------------------------------------------
// Thermocouple amplifiers (MAX31855, shared SPI2 bus, read-only)
// ---------------------------------------------------------------------------

pub const TC_SCK_GPIO: i32 = 12;
pub const TC_MISO_GPIO: i32 = 13;
/// The driver needs a MOSI pin; the MAX31855 has no input, so this one is
/// left unconnected.
pub const TC_MOSI_GPIO: i32 = 11;
/// Chip selects, indexed by channel.
pub const TC_CS_GPIOS: [i32; MAX_CHANNELS] = [10, 9, 46, 3];
/// MAX31855 tops out at 5 MHz.
pub const TC_SPI_BAUD_HZ: u32 = 4_000_000;

// ---------------------------------------------------------------------------
// Piezo buzzer (LEDC PWM)
// ---------------------------------------------------------------------------

pub const BUZZER_GPIO: i32 = 21;
/// Duty resolution for the buzzer timer; half of full scale gives a square wave.
pub const BUZZER_DUTY_BITS: u32 = 10;

// ---------------------------------------------------------------------------
// Status LED (active HIGH)
// ---------------------------------------------------------------------------

pub const STATUS_LED_GPIO: i32 = 48;
