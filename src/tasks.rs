//! Execution contexts.
//!
//! Three periodic contexts share one [`Links`]:
//!
//! | Context | Priority | Core | Period  | Work                          |
//! |---------|----------|------|---------|-------------------------------|
//! | safety  | 6        | APP  | 100 ms  | [`SafetyLoop::run_cycle`]     |
//! | control | 5        | APP  | 250 ms  | [`ControlLoop::run_cycle`]    |
//! | monitor | 2        | PRO  | 1000 ms | [`Monitor::run_cycle`]        |
//!
//! Each runs on a [`PeriodicTicker`]: deadlines advance by exactly one
//! period, and when a cycle overruns, the missed deadlines are skipped
//! (not replayed) with a warning.

use std::io;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use log::{debug, error, warn};

use crate::adapters::time::MonotonicClock;
use crate::app::events::AppEvent;
use crate::app::persist::SettingsPersister;
use crate::app::ports::{
    EventSink, FaultSink, ProfileStore, SafetyPort, SettingsStore, SsrOutput, TemperatureSensor,
};
use crate::app::service::{ControlLoop, SafetyLoop};
use crate::config::TaskConfig;
use crate::drivers::task_pin::{Core, spawn_on_core};
use crate::error::Result;
use crate::link::Links;

// ── Deadline ticker ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Run the cycle for this scheduled time.
    Due(u64),
    /// Sleep this many ms before polling again.
    Wait(u64),
}

pub struct PeriodicTicker {
    name: &'static str,
    period_ms: u64,
    next_ms: u64,
    skipped: u64,
}

impl PeriodicTicker {
    pub fn new(name: &'static str, period_ms: u32, start_ms: u64) -> Self {
        Self {
            name,
            period_ms: u64::from(period_ms.max(1)),
            next_ms: start_ms,
            skipped: 0,
        }
    }

    pub fn poll(&mut self, now_ms: u64) -> Tick {
        if now_ms < self.next_ms {
            return Tick::Wait(self.next_ms - now_ms);
        }
        let behind = (now_ms - self.next_ms) / self.period_ms;
        if behind > 0 {
            warn!(
                "{}: overrun, skipped {} tick(s) ({} ms late)",
                self.name,
                behind,
                now_ms - self.next_ms
            );
            self.skipped += behind;
        }
        let tick = self.next_ms + behind * self.period_ms;
        self.next_ms = tick + self.period_ms;
        Tick::Due(tick)
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

/// Drive `cycle` forever at the ticker's period.
fn run_periodic(name: &'static str, period_ms: u32, clock: MonotonicClock, mut cycle: impl FnMut(u64)) {
    let mut ticker = PeriodicTicker::new(name, period_ms, clock.now_ms());
    loop {
        match ticker.poll(clock.now_ms()) {
            Tick::Due(at) => cycle(at),
            Tick::Wait(ms) => std::thread::sleep(Duration::from_millis(ms)),
        }
    }
}

// ── Contexts ──────────────────────────────────────────────────

/// `build` runs on the new thread, so drivers it creates never cross
/// threads. If it fails, the context exits without a heartbeat and the
/// safety context takes the device down.
pub fn spawn_control<S, O, P>(
    build: impl FnOnce() -> Result<ControlLoop<S, O, P>> + Send + 'static,
    links: Arc<Links>,
    clock: MonotonicClock,
    tasks: &TaskConfig,
) -> io::Result<JoinHandle<()>>
where
    S: TemperatureSensor,
    O: SsrOutput,
    P: ProfileStore,
{
    let period = tasks.control_period_ms;
    spawn_on_core(
        Core::App,
        tasks.control_priority,
        tasks.control_stack_kb,
        "control\0",
        move || {
            let mut control = match build() {
                Ok(c) => c,
                Err(e) => {
                    error!("control: startup failed: {}", e);
                    return;
                }
            };
            run_periodic("control", period, clock, |now| control.run_cycle(&links, now));
        },
    )
}

/// `build` runs on the new thread, so the watchdog subscription it makes
/// belongs to the safety context.
pub fn spawn_safety<P, F>(
    build: impl FnOnce(u64) -> SafetyLoop<P, F> + Send + 'static,
    links: Arc<Links>,
    clock: MonotonicClock,
    tasks: &TaskConfig,
) -> io::Result<JoinHandle<()>>
where
    P: SafetyPort,
    F: FaultSink,
{
    let period = tasks.safety_period_ms;
    spawn_on_core(
        Core::App,
        tasks.safety_priority,
        tasks.safety_stack_kb,
        "safety\0",
        move || {
            let mut safety = build(clock.now_ms());
            run_periodic("safety", period, clock, |now| safety.run_cycle(&links, now));
        },
    )
}

pub fn spawn_monitor<E, S>(
    mut monitor: Monitor<E, S>,
    links: Arc<Links>,
    clock: MonotonicClock,
    tasks: &TaskConfig,
) -> io::Result<JoinHandle<()>>
where
    E: EventSink + Send + 'static,
    S: SettingsStore + Send + 'static,
{
    let period = tasks.monitor_period_ms;
    spawn_on_core(
        Core::Pro,
        tasks.monitor_priority,
        tasks.monitor_stack_kb,
        "monitor\0",
        move || run_periodic("monitor", period, clock, |now| monitor.run_cycle(&links, now)),
    )
}

// ── Monitor ───────────────────────────────────────────────────

/// Lowest-priority consumer: forwards fault events and the latest
/// snapshots to an [`EventSink`] and persists changed targets.
pub struct Monitor<E, S> {
    sink: E,
    persister: SettingsPersister<S>,
    channel_count: u8,
}

impl<E: EventSink, S: SettingsStore> Monitor<E, S> {
    pub fn new(sink: E, persister: SettingsPersister<S>, channel_count: usize) -> Self {
        Self {
            sink,
            persister,
            channel_count: channel_count as u8,
        }
    }

    pub fn run_cycle(&mut self, links: &Links, now_ms: u64) {
        while let Some(fault) = links.try_recv_fault() {
            self.sink.emit(&AppEvent::Fault(fault));
        }
        for ch in 0..self.channel_count {
            if let Some(update) = links.latest_temp(ch) {
                self.sink.emit(&AppEvent::Temperature(update));
                self.persister.observe(&update);
            }
        }
        self.sink.emit(&AppEvent::Safety(links.safety_status()));
        debug!("monitor: cycle at {} ms", now_ms);
    }

    pub fn sink(&self) -> &E {
        &self.sink
    }
}
