//! MAX31855 K-type thermocouple amplifier.
//!
//! Read-only SPI device returning a 32-bit frame per conversion:
//!
//! ```text
//! D31..D18  hot-junction temperature, 14-bit signed, 0.25 °C/LSB
//! D16       fault flag (any of D2..D0)
//! D15..D4   cold-junction temperature, 12-bit signed, 0.0625 °C/LSB
//! D2 SCV    short to VCC
//! D1 SCG    short to GND
//! D0 OC     open circuit
//! ```
//!
//! Conversions take ~100 ms, so reads are rate-limited to the configured
//! poll interval. A good read resets the consecutive-error counter.

use embedded_hal::spi::SpiDevice;
use log::{info, warn};

use super::SensorStatus;
use crate::app::ports::TemperatureSensor;
use crate::error::SensorFault;

const FAULT_FLAG: u32 = 1 << 16;
const FAULT_SCV: u32 = 1 << 2;
const FAULT_SCG: u32 = 1 << 1;
const FAULT_OC: u32 = 1 << 0;

/// Decoded conversion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub thermocouple_c: f32,
    pub cold_junction_c: f32,
}

/// Decode one raw frame.
pub fn decode(frame: u32) -> Result<Reading, SensorFault> {
    // Floating MISO reads all ones.
    if frame == u32::MAX {
        return Err(SensorFault::CommError);
    }
    if frame & FAULT_FLAG != 0 {
        return Err(if frame & FAULT_OC != 0 {
            SensorFault::OpenCircuit
        } else if frame & FAULT_SCG != 0 {
            SensorFault::ShortToGround
        } else if frame & FAULT_SCV != 0 {
            SensorFault::ShortToSupply
        } else {
            SensorFault::CommError
        });
    }
    let hot = (frame as i32) >> 18;
    let cold = ((frame << 16) as i32) >> 20;
    Ok(Reading {
        thermocouple_c: hot as f32 * 0.25,
        cold_junction_c: cold as f32 * 0.0625,
    })
}

pub fn celsius_to_fahrenheit(c: f32) -> f32 {
    c * 9.0 / 5.0 + 32.0
}

pub struct Max31855<SPI> {
    spi: SPI,
    label: &'static str,
    poll_interval_ms: u32,
    last_read_ms: Option<u64>,
    reading: Reading,
    status: SensorStatus,
    consecutive_errors: u8,
}

impl<SPI: SpiDevice> Max31855<SPI> {
    pub fn new(spi: SPI, label: &'static str, poll_interval_ms: u32) -> Self {
        Self {
            spi,
            label,
            poll_interval_ms,
            last_read_ms: None,
            reading: Reading {
                thermocouple_c: 0.0,
                cold_junction_c: 0.0,
            },
            status: SensorStatus::default(),
            consecutive_errors: 0,
        }
    }

    pub fn temperature_c(&self) -> f32 {
        self.reading.thermocouple_c
    }

    pub fn cold_junction_c(&self) -> f32 {
        self.reading.cold_junction_c
    }

    fn read_frame(&mut self) -> Result<Reading, SensorFault> {
        let mut buf = [0u8; 4];
        self.spi
            .read(&mut buf)
            .map_err(|_| SensorFault::CommError)?;
        decode(u32::from_be_bytes(buf))
    }
}

impl<SPI: SpiDevice> TemperatureSensor for Max31855<SPI> {
    fn update(&mut self, now_ms: u64) {
        if let Some(last) = self.last_read_ms {
            if now_ms.saturating_sub(last) < u64::from(self.poll_interval_ms) {
                return;
            }
        }
        self.last_read_ms = Some(now_ms);

        match self.read_frame() {
            Ok(reading) => {
                if !self.status.is_ok() && self.consecutive_errors > 0 {
                    info!("{}: recovered after {} errors", self.label, self.consecutive_errors);
                }
                self.reading = reading;
                self.status = SensorStatus::Ok;
                self.consecutive_errors = 0;
            }
            Err(fault) => {
                if self.status != SensorStatus::Fault(fault) {
                    warn!("{}: {}", self.label, fault);
                }
                self.status = SensorStatus::Fault(fault);
                self.consecutive_errors = self.consecutive_errors.saturating_add(1);
            }
        }
    }

    fn temperature_f(&self) -> f32 {
        celsius_to_fahrenheit(self.reading.thermocouple_c)
    }

    fn status(&self) -> SensorStatus {
        self.status
    }

    fn error_count(&self) -> u8 {
        self.consecutive_errors
    }
}
