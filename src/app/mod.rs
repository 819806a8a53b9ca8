//! Application core: hardware-agnostic orchestration.
//!
//! Commands in, snapshots out, and the per-context cycle logic that turns
//! one into the other. All interaction with hardware happens through
//! **port traits** defined in [`ports`], keeping this layer fully testable
//! without real peripherals.

pub mod commands;
pub mod events;
pub mod persist;
pub mod ports;
pub mod service;
