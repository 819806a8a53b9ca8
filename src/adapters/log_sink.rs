//! Log-based event sink.
//!
//! Writes published snapshots to the serial console. Display and network
//! consumers would implement the same [`EventSink`] trait.

use log::{info, warn};

use crate::app::events::{AppEvent, FaultScope};
use crate::app::ports::EventSink;

#[derive(Default)]
pub struct LogEventSink {
    emitted: u64,
}

impl LogEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        self.emitted += 1;
        match event {
            AppEvent::Temperature(t) => {
                info!(
                    "TEMP | CH{} {} | {:.1}/{:.0}\u{00b0}F | out={:.0}% | tc={}",
                    t.channel,
                    t.state,
                    t.current_temp_f,
                    t.target_temp_f,
                    t.output_percent,
                    t.sensor_status.label(),
                );
            }
            AppEvent::Fault(f) => match f.scope {
                FaultScope::Channel(ch) => warn!(
                    "FAULT | CH{} {} at {:.1}\u{00b0}F (t={} ms)",
                    ch, f.fault, f.temperature_f, f.timestamp_ms
                ),
                FaultScope::Global => {
                    warn!("FAULT | {} (t={} ms)", f.fault, f.timestamp_ms);
                }
            },
            AppEvent::Safety(s) => {
                info!(
                    "SAFETY | faults=0b{:08b} shutdown={} idle={} remaining={:?}",
                    s.faults,
                    s.shutdown,
                    s.idle_timed_out,
                    s.idle_remaining_ms.map(|ms| ms / 1000),
                );
            }
        }
    }
}
