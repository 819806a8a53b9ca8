//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises one layer of the
//! controller against mock adapters. All tests run on the host with no
//! real hardware required.

mod closed_loop_tests;
mod control_loop_tests;
mod mock_hw;
mod safety_loop_tests;
mod system_tests;
