//! Cross-context transport.
//!
//! Every execution context shares one [`Links`] (behind an `Arc`). Nothing
//! here blocks: queues drop on overflow and cells are overwritten.
//!
//! ```text
//!   UI / network ── Command ──▶ commands ──▶ control
//!   control ── TempUpdate ──▶ temps[ch] (latest wins) ──▶ safety, UI, network
//!   safety  ── FaultEvent ──▶ faults (drop if full) ──▶ UI, network
//!   safety  ── SafetyStatus ──▶ safety (latest wins) ──▶ control, UI
//!   control ── heartbeat ms ──▶ heartbeat ──▶ safety
//!   control / UI ── activity ms ──▶ activity ──▶ safety
//! ```

use core::cell::Cell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::warn;

use crate::app::commands::Command;
use crate::app::events::{FaultEvent, SafetyStatus, TempUpdate};
use crate::app::ports::FaultSink;
use crate::config::{COMMAND_QUEUE_DEPTH, FAULT_QUEUE_DEPTH, MAX_CHANNELS};

/// Single-slot "latest value wins" cell. A slow reader misses intermediate
/// values; it never sees a torn one.
pub struct LatestCell<T: Copy> {
    slot: Mutex<CriticalSectionRawMutex, Cell<Option<T>>>,
}

impl<T: Copy> LatestCell<T> {
    pub const fn new() -> Self {
        Self {
            slot: Mutex::new(Cell::new(None)),
        }
    }

    /// Overwrite whatever is there.
    pub fn publish(&self, value: T) {
        self.slot.lock(|c| c.set(Some(value)));
    }

    /// Read without consuming.
    pub fn peek(&self) -> Option<T> {
        self.slot.lock(Cell::get)
    }

    /// Read and clear.
    pub fn take(&self) -> Option<T> {
        self.slot.lock(Cell::take)
    }
}

impl<T: Copy> Default for LatestCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Links {
    commands: Channel<CriticalSectionRawMutex, Command, COMMAND_QUEUE_DEPTH>,
    faults: Channel<CriticalSectionRawMutex, FaultEvent, FAULT_QUEUE_DEPTH>,
    temps: [LatestCell<TempUpdate>; MAX_CHANNELS],
    safety: LatestCell<SafetyStatus>,
    heartbeat: LatestCell<u64>,
    activity: LatestCell<u64>,
}

impl Links {
    pub const fn new() -> Self {
        Self {
            commands: Channel::new(),
            faults: Channel::new(),
            temps: [const { LatestCell::<TempUpdate>::new() }; MAX_CHANNELS],
            safety: LatestCell::new(),
            heartbeat: LatestCell::new(),
            activity: LatestCell::new(),
        }
    }

    // ── Commands ──────────────────────────────────────────────

    /// Queue a command. Returns `false` if it was dropped.
    pub fn send_command(&self, cmd: Command) -> bool {
        match self.commands.try_send(cmd) {
            Ok(()) => true,
            Err(_) => {
                warn!("Command queue full, dropped {:?}", cmd);
                false
            }
        }
    }

    /// Next pending command, if any.
    pub fn try_recv_command(&self) -> Option<Command> {
        self.commands.try_receive().ok()
    }

    pub fn pending_commands(&self) -> usize {
        self.commands.len()
    }

    // ── Faults ────────────────────────────────────────────────

    pub fn try_recv_fault(&self) -> Option<FaultEvent> {
        self.faults.try_receive().ok()
    }

    // ── Snapshots ─────────────────────────────────────────────

    pub fn publish_temp(&self, update: TempUpdate) {
        if let Some(cell) = self.temps.get(update.channel as usize) {
            cell.publish(update);
        }
    }

    pub fn latest_temp(&self, channel: u8) -> Option<TempUpdate> {
        self.temps.get(channel as usize).and_then(LatestCell::peek)
    }

    /// Consume the pending update, so each value is delivered at most once.
    pub fn take_temp(&self, channel: u8) -> Option<TempUpdate> {
        self.temps.get(channel as usize).and_then(LatestCell::take)
    }

    pub fn publish_safety(&self, status: SafetyStatus) {
        self.safety.publish(status);
    }

    pub fn safety_status(&self) -> SafetyStatus {
        self.safety.peek().unwrap_or_default()
    }

    // ── Liveness ──────────────────────────────────────────────

    pub fn stamp_heartbeat(&self, now_ms: u64) {
        self.heartbeat.publish(now_ms);
    }

    pub fn last_heartbeat(&self) -> Option<u64> {
        self.heartbeat.peek()
    }

    /// Record operator interaction; the safety context resets its idle timer.
    pub fn note_activity(&self, now_ms: u64) {
        self.activity.publish(now_ms);
    }

    pub fn take_activity(&self) -> Option<u64> {
        self.activity.take()
    }
}

impl Default for Links {
    fn default() -> Self {
        Self::new()
    }
}

impl FaultSink for Links {
    fn try_send_fault(&self, event: FaultEvent) -> bool {
        match self.faults.try_send(event) {
            Ok(()) => true,
            Err(_) => {
                warn!("Fault queue full, dropped {} event", event.fault);
                false
            }
        }
    }
}
