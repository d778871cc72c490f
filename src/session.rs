//! Gameplay session
//!
//! Owns one instance of every core component and wires them together: the
//! shared transport, the timing evaluator, the loop manager, the lookahead
//! scheduler and the input debouncer. All mutation goes through `&mut self`,
//! so a session driven from a single thread (see [`crate::event_loop`]) keeps
//! scheduling passes and hit-triggered replacements totally ordered.

use crate::clock::{TimeSource, Timestamp};
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::genre::GenrePreset;
use crate::input::{InputId, InputTracker, NoteEvent};
use crate::loops::{Channel, LoopManager};
use crate::render::SoundRenderer;
use crate::scheduler::{DueMeasure, LookaheadScheduler};
use crate::state::BeatPosition;
use crate::timing::{AccuracyThresholds, TimingEvaluator, TimingResult};
use crate::transport::{SharedTransport, TransportClock};
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use log::{debug, info, warn};
use std::sync::{Arc, MutexGuard};

const EVENT_BUFFER: usize = 1024;

/// Notifications for the presentation layer, delivered in order on a
/// single-consumer channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SessionEvent {
    /// Exactly one per debounced press.
    NoteStart { input: InputId, at: Timestamp },
    NoteEnd {
        input: InputId,
        started_at: Timestamp,
        ended_at: Timestamp,
        hold_ms: f64,
    },
    /// A press graded against the running transport.
    Hit {
        input: InputId,
        result: TimingResult,
        /// False when audio was not yet initialized or the transport was
        /// stopped or paused.
        sounded: bool,
    },
}

impl From<NoteEvent> for SessionEvent {
    fn from(event: NoteEvent) -> Self {
        match event {
            NoteEvent::Start { input, at } => SessionEvent::NoteStart { input, at },
            NoteEvent::End {
                input,
                started_at,
                ended_at,
                hold_ms,
            } => SessionEvent::NoteEnd {
                input,
                started_at,
                ended_at,
                hold_ms,
            },
        }
    }
}

fn lock(transport: &SharedTransport) -> MutexGuard<'_, TransportClock> {
    match transport.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

pub struct Session {
    transport: SharedTransport,
    evaluator: TimingEvaluator,
    loops: LoopManager,
    scheduler: LookaheadScheduler,
    inputs: InputTracker,
    preset: GenrePreset,
    custom_presets: Vec<GenrePreset>,
    voices: u8,
    events_tx: Sender<SessionEvent>,
    events_rx: Option<Receiver<SessionEvent>>,
}

impl Session {
    /// Builds a stopped session on the input clock. Audio comes later via
    /// [`Session::attach_audio_clock`].
    pub fn new(
        settings: &Settings,
        input_clock: Arc<dyn TimeSource>,
        renderer: Box<dyn SoundRenderer>,
    ) -> Result<Self> {
        let preset = settings.preset()?;
        let transport = crate::create_shared_transport(preset.tempo, input_clock);
        let (events_tx, events_rx) = channel::bounded(EVENT_BUFFER);

        info!(
            "Session created with genre '{}' at {} BPM",
            preset.name, preset.tempo
        );

        Ok(Session {
            transport,
            evaluator: TimingEvaluator::new(AccuracyThresholds::from(&settings.timing)),
            loops: LoopManager::new(renderer),
            scheduler: LookaheadScheduler::from(&settings.scheduler),
            inputs: InputTracker::new(settings.input.debounce_ms),
            preset,
            custom_presets: settings.presets.clone(),
            voices: settings.input.voices,
            events_tx,
            events_rx: Some(events_rx),
        })
    }

    /// Hands out the event receiver. Only the first caller gets it.
    pub fn take_events(&mut self) -> Option<Receiver<SessionEvent>> {
        self.events_rx.take()
    }

    fn emit(&self, event: SessionEvent) {
        match self.events_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => warn!("Event buffer full, dropping {:?}", event),
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    /// Shared handle for read-only position queries from other threads.
    pub fn transport(&self) -> SharedTransport {
        self.transport.clone()
    }

    pub fn position(&self) -> BeatPosition {
        lock(&self.transport).position()
    }

    pub fn preset(&self) -> &GenrePreset {
        &self.preset
    }

    pub fn scheduler(&self) -> &LookaheadScheduler {
        &self.scheduler
    }

    pub fn loops(&self) -> &LoopManager {
        &self.loops
    }

    pub fn is_running(&self) -> bool {
        lock(&self.transport).is_running()
    }

    pub fn is_paused(&self) -> bool {
        lock(&self.transport).is_paused()
    }

    fn start_scheduler(&mut self) -> Vec<DueMeasure> {
        let (now, measure_ms) = {
            let transport = lock(&self.transport);
            (transport.audio_now(), transport.measure_duration_ms())
        };
        self.scheduler
            .start(now, measure_ms, &mut self.loops, &self.preset)
    }

    pub fn start(&mut self) -> bool {
        if !lock(&self.transport).start() {
            return false;
        }
        self.scheduler.reset();
        self.start_scheduler();
        true
    }

    pub fn stop(&mut self) -> bool {
        self.scheduler.stop(&mut self.loops);
        self.loops.cancel_all();
        self.scheduler.reset();
        self.inputs.reset();
        lock(&self.transport).stop()
    }

    /// Freezes the transport and silences everything, background included.
    pub fn pause(&mut self) -> bool {
        if !lock(&self.transport).pause() {
            return false;
        }
        self.scheduler.stop(&mut self.loops);
        self.loops.cancel_all();
        true
    }

    /// Resumes the transport; the background restarts from the current
    /// audio clock reading rather than replaying missed measures.
    pub fn resume(&mut self) -> bool {
        if !lock(&self.transport).resume() {
            return false;
        }
        self.start_scheduler();
        true
    }

    /// Changes tempo, restarting a running scheduler so consecutive
    /// background measures never overlap.
    pub fn set_tempo(&mut self, bpm: f64) -> bool {
        let was_scheduling = self.scheduler.stop(&mut self.loops);
        let changed = lock(&self.transport).set_tempo(bpm);
        if was_scheduling {
            self.start_scheduler();
        }
        changed
    }

    pub fn set_genre(&mut self, name: &str) -> Result<()> {
        let preset = GenrePreset::find(name, &self.custom_presets)
            .ok_or_else(|| Error::UnknownGenre(name.to_string()))?;
        info!("Switching genre to '{}' at {} BPM", preset.name, preset.tempo);

        let was_scheduling = self.scheduler.stop(&mut self.loops);
        self.preset = preset;
        self.scheduler.reset();
        lock(&self.transport).set_tempo(self.preset.tempo);
        if was_scheduling {
            self.start_scheduler();
        }
        Ok(())
    }

    /// Re-anchors the transport onto the audio clock and, if gameplay is
    /// already running, starts the background loop.
    pub fn attach_audio_clock(&mut self, audio: Arc<dyn TimeSource>) -> bool {
        let (anchored, should_schedule) = {
            let mut transport = lock(&self.transport);
            let anchored = transport.reanchor_to_audio(audio);
            (anchored, transport.is_running() && !transport.is_paused())
        };
        if anchored && should_schedule && !self.scheduler.is_running() {
            self.start_scheduler();
        }
        anchored
    }

    /// One scheduler poll: schedules due background measures and forgets
    /// groups that have decayed.
    pub fn poll(&mut self) -> Vec<DueMeasure> {
        let (now, measure_ms) = {
            let transport = lock(&self.transport);
            (transport.audio_now(), transport.measure_duration_ms())
        };
        let Some(now) = now else {
            return Vec::new();
        };

        let due = self
            .scheduler
            .run_pass(now, measure_ms, &mut self.loops, &self.preset);
        self.loops.prune_finished(now);
        due
    }

    /// Handles a press of `input` captured at `at`. Returns the timing result
    /// unless the press was debounced away.
    ///
    /// Only a press on a running, unpaused transport with audio attached
    /// makes a sound; every other press is still graded and reported.
    pub fn note_pressed(&mut self, input: InputId, at: Timestamp) -> Option<TimingResult> {
        if input.0 >= self.voices {
            debug!("Ignoring press on unmapped {:?}", input);
            return None;
        }

        let note = self.inputs.press(input, at)?;
        self.emit(note.into());

        let (result, audio_now) = {
            let transport = lock(&self.transport);
            let audible = transport.is_running() && !transport.is_paused();
            (
                self.evaluator.evaluate(&transport, at),
                transport.audio_now().filter(|_| audible),
            )
        };

        let channel = input.channel();
        let sounded = match audio_now {
            Some(now) => {
                let instruction =
                    self.preset
                        .hit_instruction(channel, result.bar_number, result.accuracy);
                self.loops.trigger(channel, &instruction, now) > 0
            }
            None => false,
        };

        debug!(
            "{:?} hit beat {} of bar {}: {:?} ({:+.1} ms)",
            input, result.nearest_beat, result.bar_number, result.accuracy, result.offset_ms
        );
        self.emit(SessionEvent::Hit {
            input,
            result,
            sounded,
        });
        Some(result)
    }

    pub fn note_released(&mut self, input: InputId, at: Timestamp) {
        if let Some(note) = self.inputs.release(input, at) {
            self.emit(note.into());
        }
    }

    /// Silences the voices but keeps the background loop going.
    pub fn leave_gameplay(&mut self) -> usize {
        self.inputs.reset();
        self.loops.cancel_all_except(Channel::Background)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, TimeBase};
    use crate::render::RecordingRenderer;
    use crate::timing::Accuracy;

    struct Fixture {
        session: Session,
        events: Receiver<SessionEvent>,
        input: ManualClock,
        audio: ManualClock,
        renderer: RecordingRenderer,
    }

    fn fixture() -> Fixture {
        let input = ManualClock::new(TimeBase::Input);
        let audio = ManualClock::new(TimeBase::Audio);
        let renderer = RecordingRenderer::new(Arc::new(audio.clone()));
        let mut session = Session::new(
            &Settings::default(),
            Arc::new(input.clone()),
            Box::new(renderer.clone()),
        )
        .unwrap();
        let events = session.take_events().unwrap();
        Fixture {
            session,
            events,
            input,
            audio,
            renderer,
        }
    }

    #[test]
    fn test_events_receiver_is_handed_out_once() {
        let mut f = fixture();
        assert!(f.session.take_events().is_none());
    }

    #[test]
    fn test_hit_before_audio_is_graded_but_silent() {
        let mut f = fixture();
        f.session.start();
        f.input.set(605.0);

        let result = f
            .session
            .note_pressed(InputId(0), Timestamp::input(605.0))
            .unwrap();
        assert_eq!(result.nearest_beat, 2);
        assert_eq!(result.accuracy, Accuracy::Perfect);

        assert!(matches!(
            f.events.try_recv(),
            Ok(SessionEvent::NoteStart { .. })
        ));
        assert!(matches!(
            f.events.try_recv(),
            Ok(SessionEvent::Hit { sounded: false, .. })
        ));
        assert!(f.renderer.is_empty());
    }

    #[test]
    fn test_attach_audio_starts_background_when_running() {
        let mut f = fixture();
        f.session.start();
        f.input.set(1_000.0);
        f.audio.set(40_000.0);

        assert!(f.session.attach_audio_clock(Arc::new(f.audio.clone())));
        assert!(f.session.scheduler().is_running());
        assert!(f.session.loops().is_active(Channel::Background));
        assert!(!f.session.attach_audio_clock(Arc::new(f.audio.clone())));
    }

    #[test]
    fn test_pause_silences_everything_and_resume_restarts_background() {
        let mut f = fixture();
        f.session.attach_audio_clock(Arc::new(f.audio.clone()));
        f.session.start();
        f.audio.set(300.0);
        f.session.note_pressed(InputId(1), Timestamp::audio(300.0));
        assert_eq!(f.session.loops().len(), 2);

        assert!(f.session.pause());
        assert!(f.session.loops().is_empty());
        assert!(!f.session.scheduler().is_running());

        f.audio.set(10_000.0);
        assert!(f.session.resume());
        assert_eq!(f.session.scheduler().next_due_ms(), Some(10_000.0 + 2_400.0));
    }

    #[test]
    fn test_press_while_paused_makes_no_sound() {
        let mut f = fixture();
        f.session.attach_audio_clock(Arc::new(f.audio.clone()));
        f.session.start();
        f.session.pause();
        let rendered = f.renderer.len();

        assert!(f
            .session
            .note_pressed(InputId(0), Timestamp::audio(50.0))
            .is_some());
        assert_eq!(f.renderer.len(), rendered);
    }

    #[test]
    fn test_unmapped_input_is_ignored() {
        let mut f = fixture();
        f.session.start();
        assert!(f
            .session
            .note_pressed(InputId(200), Timestamp::input(0.0))
            .is_none());
        assert!(f.events.try_recv().is_err());
    }

    #[test]
    fn test_unknown_genre_is_rejected() {
        let mut f = fixture();
        assert!(matches!(
            f.session.set_genre("polka"),
            Err(Error::UnknownGenre(_))
        ));
        assert_eq!(f.session.preset().name, "chill");
    }

    #[test]
    fn test_leave_gameplay_keeps_background() {
        let mut f = fixture();
        f.session.attach_audio_clock(Arc::new(f.audio.clone()));
        f.session.start();
        f.session.note_pressed(InputId(2), Timestamp::audio(0.0));

        assert_eq!(f.session.leave_gameplay(), 1);
        assert_eq!(f.session.loops().active_channels(), vec![Channel::Background]);
    }

    #[test]
    fn test_full_event_buffer_drops_newest_events() {
        let f = fixture();
        for i in 0..EVENT_BUFFER + 5 {
            f.session.emit(SessionEvent::NoteStart {
                input: InputId(0),
                at: Timestamp::input(i as f64),
            });
        }

        let received: Vec<SessionEvent> = f.events.try_iter().collect();
        assert_eq!(received.len(), EVENT_BUFFER);
        assert_eq!(
            received.last(),
            Some(&SessionEvent::NoteStart {
                input: InputId(0),
                at: Timestamp::input((EVENT_BUFFER - 1) as f64),
            })
        );
    }
}
