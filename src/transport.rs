//! Transport clock
//!
//! The authoritative musical clock. It starts out reading the input clock and
//! is re-anchored exactly once onto the audio clock when audio output comes
//! up, so that beat queries and scheduled sound events share one time base.

use crate::clock::{TimeBase, TimeSource, Timestamp};
use crate::state::{BeatPosition, TransportState};
use log::{debug, info, warn};
use std::fmt;
use std::sync::{Arc, Mutex};

pub type SharedTransport = Arc<Mutex<TransportClock>>;

#[derive(Clone)]
pub struct TransportClock {
    state: TransportState,
    input: Arc<dyn TimeSource>,
    audio: Option<Arc<dyn TimeSource>>,
}

impl fmt::Debug for TransportClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportClock")
            .field("state", &self.state)
            .field("audio_anchored", &self.audio.is_some())
            .finish()
    }
}

impl TransportClock {
    pub fn new(tempo: f64, input: Arc<dyn TimeSource>) -> Self {
        TransportClock {
            state: TransportState::new(tempo, input.base()),
            input,
            audio: None,
        }
    }

    fn source(&self) -> &dyn TimeSource {
        match &self.audio {
            Some(audio) => audio.as_ref(),
            None => self.input.as_ref(),
        }
    }

    /// Current reading of whichever base the transport runs on.
    pub fn now(&self) -> Timestamp {
        self.source().now()
    }

    /// Current audio clock reading, `None` until audio is initialized.
    pub fn audio_now(&self) -> Option<f64> {
        self.audio.as_ref().map(|audio| audio.now_ms())
    }

    pub fn input_now(&self) -> Timestamp {
        self.input.now()
    }

    pub fn base(&self) -> TimeBase {
        self.state.base()
    }

    pub fn is_audio_anchored(&self) -> bool {
        self.audio.is_some()
    }

    pub fn state(&self) -> &TransportState {
        &self.state
    }

    pub fn start(&mut self) -> bool {
        let now = self.source().now_ms();
        let started = self.state.start(now);
        if started {
            info!(
                "Transport started at {:.1} ms ({:?} clock), tempo {} BPM",
                now,
                self.base(),
                self.state.tempo()
            );
        } else {
            debug!("Ignoring start: transport already running");
        }
        started
    }

    pub fn stop(&mut self) -> bool {
        let stopped = self.state.stop();
        if stopped {
            info!("Transport stopped");
        }
        stopped
    }

    pub fn pause(&mut self) -> bool {
        let now = self.source().now_ms();
        let paused = self.state.pause(now);
        if paused {
            info!("Transport paused at {:.1} ms", now);
        } else {
            debug!("Ignoring pause: transport not running or already paused");
        }
        paused
    }

    pub fn resume(&mut self) -> bool {
        let now = self.source().now_ms();
        let resumed = self.state.resume(now);
        if resumed {
            info!(
                "Transport resumed, total pause {:.1} ms",
                self.state.accumulated_pause_ms()
            );
        } else {
            debug!("Ignoring resume: transport not paused");
        }
        resumed
    }

    /// Sets the tempo for later queries. A running transport is not
    /// re-phased: its position jumps to wherever the new tempo places the
    /// elapsed time.
    pub fn set_tempo(&mut self, bpm: f64) -> bool {
        let changed = self.state.set_tempo(bpm);
        if changed {
            info!("Transport tempo set to {} BPM", bpm);
        } else {
            warn!("Ignoring invalid tempo {}", bpm);
        }
        changed
    }

    pub fn tempo(&self) -> f64 {
        self.state.tempo()
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    pub fn is_paused(&self) -> bool {
        self.state.is_paused()
    }

    pub fn beat_duration_ms(&self) -> f64 {
        self.state.beat_duration_ms()
    }

    pub fn measure_duration_ms(&self) -> f64 {
        self.state.measure_duration_ms()
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.state.elapsed_at(self.source().now_ms())
    }

    /// Signed elapsed time at `at`, or `None` when `at` belongs to another
    /// time base and cannot be placed on this transport exactly.
    pub fn elapsed_at(&self, at: Timestamp) -> Option<f64> {
        (at.base == self.base()).then(|| self.state.signed_elapsed_at(at.ms))
    }

    /// Side-effect free; safe to call from a display loop at any rate.
    pub fn position(&self) -> BeatPosition {
        self.state.position_at(self.source().now_ms())
    }

    /// Moves the transport onto the audio clock, keeping the musical position
    /// unchanged. Only the first call has an effect.
    pub fn reanchor_to_audio(&mut self, audio: Arc<dyn TimeSource>) -> bool {
        if self.audio.is_some() {
            debug!("Ignoring re-anchor: transport already on the audio clock");
            return false;
        }

        let old_now = self.input.now_ms();
        let new_now = audio.now_ms();
        self.state.rebase(audio.base(), old_now, new_now);
        self.audio = Some(audio);

        info!(
            "Transport re-anchored to audio clock (input {:.1} ms -> audio {:.1} ms)",
            old_now, new_now
        );
        true
    }
}
