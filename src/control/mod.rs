//! Closed-loop control algorithms.

pub mod autotune;
pub mod pid;
pub mod window;

pub use autotune::{AutotunePhase, AutotuneResult, Autotuner};
pub use pid::PidController;
pub use window::TimeProportioner;
