//! Sound rendering seam
//!
//! The core never synthesizes audio itself. It hands [`SoundEvent`]s with an
//! audio-clock start time to a [`SoundRenderer`] and keeps the returned
//! [`SoundHandle`]s so the events can be released later.

use crate::clock::TimeSource;
use log::debug;
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SoundKind {
    Pad,
    Bass,
    Lead,
    Pluck,
    Drum,
}

/// One note of a render instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct SoundEvent {
    pub kind: SoundKind,
    pub frequency_hz: f64,
    /// Loudness in `0.0..=1.0`.
    pub velocity: f32,
    /// Delay from the group start.
    pub offset_ms: f64,
    /// Time until the event has fully decayed.
    pub duration_ms: f64,
}

impl SoundEvent {
    pub fn end_offset_ms(&self) -> f64 {
        self.offset_ms + self.duration_ms
    }
}

/// Everything one trigger asks the renderer to play.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RenderInstruction {
    pub events: Vec<SoundEvent>,
}

impl RenderInstruction {
    pub fn new(events: Vec<SoundEvent>) -> Self {
        Self { events }
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Time from the group start until the last event has decayed.
    pub fn length_ms(&self) -> f64 {
        self.events
            .iter()
            .map(SoundEvent::end_offset_ms)
            .fold(0.0, f64::max)
    }
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("sound event already finished")]
    AlreadyFinished,
    #[error("render backend unavailable: {0}")]
    Backend(String),
}

/// A playing or scheduled sound event.
///
/// Stopping schedules a release rather than cutting the sound. Both calls
/// may be repeated and may arrive after the event finished on its own.
pub trait SoundHandle: Send {
    fn stop(&mut self) -> Result<(), RenderError>;

    /// Releases the event at `at_ms` on the audio clock. A release at or
    /// before the event's start keeps it from sounding at all.
    fn stop_at(&mut self, at_ms: f64) -> Result<(), RenderError>;
}

pub trait SoundRenderer: Send {
    /// Fire-and-forget: enqueue `event` to start at `start_ms` on the audio
    /// clock and return at once.
    fn render_event(
        &mut self,
        event: &SoundEvent,
        start_ms: f64,
    ) -> Result<Box<dyn SoundHandle>, RenderError>;
}

/// Renderer that only writes what it would play to the log.
#[derive(Debug, Default)]
pub struct LogRenderer {
    next_id: u64,
}

impl LogRenderer {
    pub fn new() -> Self {
        Self::default()
    }
}

struct LogHandle {
    id: u64,
}

impl SoundHandle for LogHandle {
    fn stop(&mut self) -> Result<(), RenderError> {
        debug!("Sound #{} released", self.id);
        Ok(())
    }

    fn stop_at(&mut self, at_ms: f64) -> Result<(), RenderError> {
        debug!("Sound #{} released at {:.1} ms", self.id, at_ms);
        Ok(())
    }
}

impl SoundRenderer for LogRenderer {
    fn render_event(
        &mut self,
        event: &SoundEvent,
        start_ms: f64,
    ) -> Result<Box<dyn SoundHandle>, RenderError> {
        self.next_id += 1;
        debug!(
            "Sound #{}: {:?} {:.1} Hz vel {:.2} at {:.1} ms for {:.1} ms",
            self.next_id,
            event.kind,
            event.frequency_hz,
            event.velocity,
            start_ms + event.offset_ms,
            event.duration_ms
        );
        Ok(Box::new(LogHandle { id: self.next_id }))
    }
}

/// An event as seen by [`RecordingRenderer`].
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedEvent {
    pub id: u64,
    pub event: SoundEvent,
    /// Absolute start on the audio clock, offset included.
    pub start_ms: f64,
    pub released_at: Option<f64>,
    pub stop_calls: u32,
}

impl RenderedEvent {
    pub fn natural_end_ms(&self) -> f64 {
        self.start_ms + self.event.duration_ms
    }

    /// When the event actually goes silent: its release or its natural end,
    /// whichever comes first. Equals `start_ms` for a never-sounded event.
    pub fn audible_end_ms(&self) -> f64 {
        let end = match self.released_at {
            Some(released) => released.min(self.natural_end_ms()),
            None => self.natural_end_ms(),
        };
        end.max(self.start_ms)
    }
}

/// Renderer that records every event and release, for simulations and tests.
///
/// Clones share the same record.
#[derive(Clone)]
pub struct RecordingRenderer {
    clock: Arc<dyn TimeSource>,
    next_id: Arc<AtomicU64>,
    events: Arc<Mutex<Vec<RenderedEvent>>>,
}

impl RecordingRenderer {
    /// `clock` is the audio clock used to timestamp immediate releases.
    pub fn new(clock: Arc<dyn TimeSource>) -> Self {
        Self {
            clock,
            next_id: Arc::new(AtomicU64::new(0)),
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn events(&self) -> Vec<RenderedEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|events| events.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl SoundRenderer for RecordingRenderer {
    fn render_event(
        &mut self,
        event: &SoundEvent,
        start_ms: f64,
    ) -> Result<Box<dyn SoundHandle>, RenderError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let mut events = self
            .events
            .lock()
            .map_err(|_| RenderError::Backend("recording poisoned".to_string()))?;
        events.push(RenderedEvent {
            id,
            event: event.clone(),
            start_ms: start_ms + event.offset_ms,
            released_at: None,
            stop_calls: 0,
        });

        Ok(Box::new(RecordingHandle {
            id,
            clock: self.clock.clone(),
            events: self.events.clone(),
        }))
    }
}

struct RecordingHandle {
    id: u64,
    clock: Arc<dyn TimeSource>,
    events: Arc<Mutex<Vec<RenderedEvent>>>,
}

impl RecordingHandle {
    fn release(&mut self, at_ms: f64) -> Result<(), RenderError> {
        let now = self.clock.now_ms();
        let mut events = self
            .events
            .lock()
            .map_err(|_| RenderError::Backend("recording poisoned".to_string()))?;
        let recorded = events
            .iter_mut()
            .find(|recorded| recorded.id == self.id)
            .ok_or(RenderError::AlreadyFinished)?;

        recorded.stop_calls += 1;
        if recorded.natural_end_ms() <= now {
            return Err(RenderError::AlreadyFinished);
        }
        recorded.released_at = Some(match recorded.released_at {
            Some(previous) => previous.min(at_ms),
            None => at_ms,
        });
        Ok(())
    }
}

impl SoundHandle for RecordingHandle {
    fn stop(&mut self) -> Result<(), RenderError> {
        let now = self.clock.now_ms();
        self.release(now)
    }

    fn stop_at(&mut self, at_ms: f64) -> Result<(), RenderError> {
        self.release(at_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, TimeBase};

    fn pad(offset_ms: f64, duration_ms: f64) -> SoundEvent {
        SoundEvent {
            kind: SoundKind::Pad,
            frequency_hz: 220.0,
            velocity: 0.8,
            offset_ms,
            duration_ms,
        }
    }

    #[test]
    fn test_instruction_length_covers_latest_event() {
        let instruction = RenderInstruction::new(vec![pad(0.0, 500.0), pad(300.0, 400.0)]);
        assert_eq!(instruction.length_ms(), 700.0);
        assert_eq!(RenderInstruction::default().length_ms(), 0.0);
    }

    #[test]
    fn test_recording_renderer_keeps_earliest_release() {
        let clock = ManualClock::new(TimeBase::Audio);
        let mut renderer = RecordingRenderer::new(Arc::new(clock.clone()));
        let mut handle = renderer.render_event(&pad(0.0, 1_000.0), 100.0).unwrap();

        handle.stop_at(800.0).unwrap();
        handle.stop_at(900.0).unwrap();
        clock.set(400.0);
        handle.stop().unwrap();

        let events = renderer.events();
        assert_eq!(events[0].released_at, Some(400.0));
        assert_eq!(events[0].stop_calls, 3);
        assert_eq!(events[0].audible_end_ms(), 400.0);
    }

    #[test]
    fn test_stopping_finished_event_reports_already_finished() {
        let clock = ManualClock::new(TimeBase::Audio);
        let mut renderer = RecordingRenderer::new(Arc::new(clock.clone()));
        let mut handle = renderer.render_event(&pad(0.0, 200.0), 0.0).unwrap();

        clock.set(500.0);
        assert!(matches!(handle.stop(), Err(RenderError::AlreadyFinished)));
        assert_eq!(renderer.events()[0].released_at, None);
    }
}
