//! Output drivers, hardware initialisation, and context spawning.

pub mod buzzer;
pub mod hw_init;
pub mod ssr;
pub mod status_led;
pub mod task_pin;
pub mod watchdog;
