//! Solid-state relay output.
//!
//! [`SsrDriver`] wraps any `embedded_hal` output pin. A process-wide
//! inhibit latch, set by emergency shutdown, makes every driver refuse
//! on-requests from then on, so a channel that has not yet noticed the
//! shutdown cannot re-energise its heater.

use core::convert::Infallible;
use core::sync::atomic::{AtomicBool, Ordering};

use embedded_hal::digital::{ErrorType, OutputPin};
use log::{error, warn};

use crate::app::ports::SsrOutput;
use crate::drivers::hw_init;

static OUTPUTS_INHIBITED: AtomicBool = AtomicBool::new(false);

/// Latch all SSRs off and drive their pins low directly.
pub fn inhibit_all() {
    OUTPUTS_INHIBITED.store(true, Ordering::SeqCst);
    hw_init::force_all_ssr_off();
}

pub fn outputs_inhibited() -> bool {
    OUTPUTS_INHIBITED.load(Ordering::SeqCst)
}

pub struct SsrDriver<P> {
    pin: P,
    channel: u8,
    on: bool,
}

impl<P: OutputPin> SsrDriver<P> {
    pub fn new(pin: P, channel: u8) -> Self {
        Self {
            pin,
            channel,
            on: false,
        }
    }

    pub fn is_on(&self) -> bool {
        self.on
    }

    pub fn pin(&self) -> &P {
        &self.pin
    }
}

impl<P: OutputPin> SsrOutput for SsrDriver<P> {
    fn set(&mut self, on: bool) {
        let on = if on && outputs_inhibited() {
            warn!("CH{}: SSR on refused, outputs inhibited", self.channel);
            false
        } else {
            on
        };

        let res = if on { self.pin.set_high() } else { self.pin.set_low() };
        match res {
            Ok(()) => self.on = on,
            Err(e) => {
                error!("CH{}: SSR write failed: {:?}", self.channel, e);
                // Best effort: never leave the pin believed-off but on.
                let _ = self.pin.set_low();
                self.on = false;
            }
        }
    }
}

/// Raw GPIO output used on the board, written through `hw_init`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpioOut {
    gpio: i32,
}

impl GpioOut {
    pub const fn new(gpio: i32) -> Self {
        Self { gpio }
    }

    pub const fn gpio(&self) -> i32 {
        self.gpio
    }
}

impl ErrorType for GpioOut {
    type Error = Infallible;
}

impl OutputPin for GpioOut {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        hw_init::gpio_write(self.gpio, false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        hw_init::gpio_write(self.gpio, true);
        Ok(())
    }
}
