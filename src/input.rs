//! Input debouncing
//!
//! Turns raw press/release transitions of each logical input into note
//! events. A press is dropped while its input is still held or when it comes
//! sooner than the minimum inter-trigger interval after that input's last
//! trigger. Each input is debounced on its own.

use crate::clock::Timestamp;
use crate::config::DEFAULT_DEBOUNCE_MS;
use crate::loops::Channel;
use log::trace;
use std::collections::HashMap;

/// A logical input, e.g. one key or one pad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InputId(pub u8);

impl InputId {
    pub fn channel(self) -> Channel {
        Channel::Voice(self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NoteEvent {
    Start {
        input: InputId,
        at: Timestamp,
    },
    End {
        input: InputId,
        started_at: Timestamp,
        ended_at: Timestamp,
        hold_ms: f64,
    },
}

#[derive(Debug, Default, Clone, Copy)]
struct InputSlot {
    held_since: Option<Timestamp>,
    last_trigger: Option<Timestamp>,
}

#[derive(Debug, Clone)]
pub struct InputTracker {
    min_interval_ms: f64,
    slots: HashMap<InputId, InputSlot>,
}

impl Default for InputTracker {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE_MS)
    }
}

impl InputTracker {
    pub fn new(min_interval_ms: f64) -> Self {
        Self {
            min_interval_ms: min_interval_ms.max(0.0),
            slots: HashMap::new(),
        }
    }

    pub fn press(&mut self, input: InputId, at: Timestamp) -> Option<NoteEvent> {
        let slot = self.slots.entry(input).or_default();

        if slot.held_since.is_some() {
            trace!("Suppressed press on {:?}: already held", input);
            return None;
        }
        if let Some(last) = slot.last_trigger {
            if last.base == at.base && at.ms - last.ms < self.min_interval_ms {
                trace!(
                    "Suppressed press on {:?}: {:.1} ms after previous trigger",
                    input,
                    at.ms - last.ms
                );
                return None;
            }
        }

        slot.held_since = Some(at);
        slot.last_trigger = Some(at);
        Some(NoteEvent::Start { input, at })
    }

    pub fn release(&mut self, input: InputId, at: Timestamp) -> Option<NoteEvent> {
        let started_at = self.slots.get_mut(&input)?.held_since.take()?;
        Some(NoteEvent::End {
            input,
            started_at,
            ended_at: at,
            hold_ms: (at.ms - started_at.ms).max(0.0),
        })
    }

    pub fn is_held(&self, input: InputId) -> bool {
        self.slots
            .get(&input)
            .is_some_and(|slot| slot.held_since.is_some())
    }

    /// Drops held state, e.g. when gameplay is left mid-press.
    pub fn reset(&mut self) {
        self.slots.clear();
    }
}
