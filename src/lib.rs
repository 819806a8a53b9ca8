//! Multi-channel SSR heater controller.
//!
//! Exposes the control core (PID, autotune, channel state machine, safety
//! manager, cross-context transport) for integration testing. All
//! ESP-IDF-specific code is guarded by `#[cfg(target_os = "espidf")]`
//! within each module, so the whole library builds and tests on the host.

#![deny(unused_must_use)]

#[cfg(not(target_os = "espidf"))]
use critical_section as _;

pub mod adapters;
pub mod app;
pub mod channel;
pub mod config;
pub mod control;
pub mod drivers;
pub mod error;
pub mod link;
pub mod pins;
pub mod safety;
pub mod sensors;
pub mod tasks;
