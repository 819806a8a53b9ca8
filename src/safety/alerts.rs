//! Non-blocking alert-tone sequencer.
//!
//! Notes are queued in a fixed ring buffer and played one after another
//! from the safety context's periodic `update`. Nothing here sleeps: a
//! note ends when its duration has elapsed at the next update. Enqueue on
//! a full buffer drops the note.

use heapless::Deque;

use crate::config::ALERT_QUEUE_DEPTH;

/// One tone. `freq_hz == 0` is a rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Note {
    pub freq_hz: u16,
    pub duration_ms: u16,
}

impl Note {
    pub const fn tone(freq_hz: u16, duration_ms: u16) -> Self {
        Self { freq_hz, duration_ms }
    }

    pub const fn rest(duration_ms: u16) -> Self {
        Self { freq_hz: 0, duration_ms }
    }
}

/// Short rising chirp for accepted operator input.
pub const CONFIRM: [Note; 3] = [Note::tone(1500, 80), Note::rest(40), Note::tone(2000, 80)];

/// Three long beeps.
pub const ALARM: [Note; 5] = [
    Note::tone(3000, 150),
    Note::rest(100),
    Note::tone(3000, 150),
    Note::rest(100),
    Note::tone(3000, 150),
];

/// Single beep ahead of an idle shutdown.
pub const WARNING: [Note; 1] = [Note::tone(2000, 200)];

pub struct AlertSequencer {
    queue: Deque<Note, ALERT_QUEUE_DEPTH>,
    playing: Option<(Note, u64)>,
}

impl Default for AlertSequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertSequencer {
    pub const fn new() -> Self {
        Self {
            queue: Deque::new(),
            playing: None,
        }
    }

    /// Queue one note. Returns `false` if the buffer was full.
    pub fn enqueue(&mut self, note: Note) -> bool {
        self.queue.push_back(note).is_ok()
    }

    /// Queue a pattern; returns how many notes fitted.
    pub fn play(&mut self, pattern: &[Note]) -> usize {
        pattern.iter().take_while(|&&n| self.enqueue(n)).count()
    }

    /// Drop everything pending. The current note runs out normally.
    pub fn clear(&mut self) {
        self.queue.clear();
    }

    /// Advance playback. `tone` receives the new frequency whenever the
    /// output changes (0 = silent).
    pub fn update(&mut self, now_ms: u64, mut tone: impl FnMut(u16)) {
        if let Some((note, started)) = self.playing {
            if now_ms.saturating_sub(started) < u64::from(note.duration_ms) {
                return;
            }
            self.playing = None;
            if self.queue.is_empty() {
                tone(0);
                return;
            }
        }

        if let Some(next) = self.queue.pop_front() {
            tone(next.freq_hz);
            self.playing = Some((next, now_ms));
        }
    }

    pub fn is_idle(&self) -> bool {
        self.playing.is_none() && self.queue.is_empty()
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}
