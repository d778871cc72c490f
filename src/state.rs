use crate::clock::TimeBase;
use crate::config::{BEATS_PER_BAR, DEFAULT_TEMPO};

/// Musical position derived from elapsed transport time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatPosition {
    /// 1-indexed beat within the bar, always in `1..=4`.
    pub beat_in_bar: u32,
    /// Fraction of the current beat already elapsed, in `[0, 1)`.
    pub sub_beat_progress: f64,
    pub bar_number: u64,
    /// Elapsed time expressed in beats; monotonic while running.
    pub continuous_beats: f64,
}

impl BeatPosition {
    /// Reported whenever the transport is not running.
    pub const STOPPED: BeatPosition = BeatPosition {
        beat_in_bar: 1,
        sub_beat_progress: 0.0,
        bar_number: 0,
        continuous_beats: 0.0,
    };

    pub fn from_beats(continuous_beats: f64) -> Self {
        let continuous_beats = continuous_beats.max(0.0);
        let whole = continuous_beats.floor();
        let beat_index = whole as u64;

        BeatPosition {
            beat_in_bar: (beat_index % BEATS_PER_BAR) as u32 + 1,
            sub_beat_progress: continuous_beats - whole,
            bar_number: beat_index / BEATS_PER_BAR,
            continuous_beats,
        }
    }
}

impl Default for BeatPosition {
    fn default() -> Self {
        Self::STOPPED
    }
}

/// Pause-aware transport bookkeeping.
///
/// Every millisecond field is expressed in `base`. Methods take the current
/// reading of that base explicitly; [`crate::transport::TransportClock`]
/// supplies it from the right time source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransportState {
    base: TimeBase,
    origin_ms: f64,
    tempo: f64,
    running: bool,
    paused: bool,
    paused_at_ms: f64,
    accumulated_pause_ms: f64,
}

impl Default for TransportState {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPO, TimeBase::Input)
    }
}

impl TransportState {
    pub fn new(tempo: f64, base: TimeBase) -> Self {
        let tempo = if tempo.is_finite() && tempo > 0.0 {
            tempo
        } else {
            DEFAULT_TEMPO
        };

        Self {
            base,
            origin_ms: 0.0,
            tempo,
            running: false,
            paused: false,
            paused_at_ms: 0.0,
            accumulated_pause_ms: 0.0,
        }
    }

    pub fn start(&mut self, now_ms: f64) -> bool {
        if self.running {
            return false;
        }
        self.origin_ms = now_ms;
        self.accumulated_pause_ms = 0.0;
        self.paused = false;
        self.paused_at_ms = 0.0;
        self.running = true;
        true
    }

    /// Returns to the inert state. Tempo and time base survive a stop.
    pub fn stop(&mut self) -> bool {
        let was_running = self.running;
        *self = Self::new(self.tempo, self.base);
        was_running
    }

    pub fn pause(&mut self, now_ms: f64) -> bool {
        if !self.running || self.paused {
            return false;
        }
        self.paused_at_ms = now_ms;
        self.paused = true;
        true
    }

    pub fn resume(&mut self, now_ms: f64) -> bool {
        if !self.paused {
            return false;
        }
        self.accumulated_pause_ms += (now_ms - self.paused_at_ms).max(0.0);
        self.paused = false;
        true
    }

    /// Changes the beat duration used by every later query.
    ///
    /// Elapsed time is not rescaled, so a running transport jumps to the
    /// position the new tempo implies for the same elapsed time.
    pub fn set_tempo(&mut self, bpm: f64) -> bool {
        if !bpm.is_finite() || bpm <= 0.0 {
            return false;
        }
        self.tempo = bpm;
        true
    }

    pub fn tempo(&self) -> f64 {
        self.tempo
    }

    pub fn base(&self) -> TimeBase {
        self.base
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn origin_ms(&self) -> f64 {
        self.origin_ms
    }

    pub fn accumulated_pause_ms(&self) -> f64 {
        self.accumulated_pause_ms
    }

    pub fn paused_at_ms(&self) -> Option<f64> {
        self.paused.then_some(self.paused_at_ms)
    }

    pub fn beat_duration_ms(&self) -> f64 {
        60_000.0 / self.tempo
    }

    pub fn measure_duration_ms(&self) -> f64 {
        self.beat_duration_ms() * BEATS_PER_BAR as f64
    }

    /// Active time since start at `now_ms`, negative for readings before the
    /// origin. Frozen at the pause point while paused.
    pub fn signed_elapsed_at(&self, now_ms: f64) -> f64 {
        if !self.running {
            return 0.0;
        }
        let reading = if self.paused {
            self.paused_at_ms
        } else {
            now_ms
        };
        reading - self.origin_ms - self.accumulated_pause_ms
    }

    pub fn elapsed_at(&self, now_ms: f64) -> f64 {
        self.signed_elapsed_at(now_ms).max(0.0)
    }

    pub fn position_at(&self, now_ms: f64) -> BeatPosition {
        if !self.running {
            return BeatPosition::STOPPED;
        }
        BeatPosition::from_beats(self.elapsed_at(now_ms) / self.beat_duration_ms())
    }

    /// Re-expresses the bookkeeping in another time base without moving the
    /// musical position: the elapsed time read at `old_now_ms` becomes the
    /// elapsed time at `new_now_ms`.
    pub fn rebase(&mut self, base: TimeBase, old_now_ms: f64, new_now_ms: f64) {
        if self.running {
            let elapsed = self.signed_elapsed_at(old_now_ms);
            self.origin_ms = new_now_ms - elapsed;
            self.accumulated_pause_ms = 0.0;
            if self.paused {
                self.paused_at_ms = new_now_ms;
            }
        }
        self.base = base;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_default_initialization() {
        let state = TransportState::new(120.0, TimeBase::Input);
        assert_eq!(state.tempo(), 120.0);
        assert!(!state.is_running());
        assert!(!state.is_paused());
        assert_eq!(state.position_at(1000.0), BeatPosition::STOPPED);
    }

    #[test]
    fn test_invalid_tempo_falls_back_to_default() {
        let mut state = TransportState::new(-5.0, TimeBase::Input);
        assert_eq!(state.tempo(), DEFAULT_TEMPO);
        assert!(!state.set_tempo(0.0));
        assert!(!state.set_tempo(f64::NAN));
        assert_eq!(state.tempo(), DEFAULT_TEMPO);
    }

    #[test]
    fn test_beat_position_boundaries() {
        let position = BeatPosition::from_beats(3.999);
        assert_eq!(position.beat_in_bar, 4);
        assert_eq!(position.bar_number, 0);

        let position = BeatPosition::from_beats(4.0);
        assert_eq!(position.beat_in_bar, 1);
        assert_eq!(position.bar_number, 1);
        assert_eq!(position.sub_beat_progress, 0.0);
    }

    #[test]
    fn test_start_twice_keeps_origin() {
        let mut state = TransportState::new(100.0, TimeBase::Input);
        assert!(state.start(10.0));
        assert!(!state.start(500.0));
        assert_eq!(state.origin_ms(), 10.0);
    }

    #[test]
    fn test_pause_freezes_elapsed_time() {
        let mut state = TransportState::new(100.0, TimeBase::Input);
        state.start(0.0);
        assert!(state.pause(900.0));
        assert!(!state.pause(950.0));
        assert_eq!(state.elapsed_at(5_000.0), 900.0);
        assert!(state.resume(2_000.0));
        assert!(!state.resume(2_100.0));
        assert_eq!(state.accumulated_pause_ms(), 1_100.0);
        assert_eq!(state.elapsed_at(2_300.0), 1_200.0);
    }

    #[test]
    fn test_stop_returns_to_inert_state() {
        let mut state = TransportState::new(128.0, TimeBase::Audio);
        state.start(0.0);
        state.pause(100.0);
        assert!(state.stop());
        assert!(!state.stop());
        assert!(!state.is_paused());
        assert_eq!(state.tempo(), 128.0);
        assert_eq!(state.base(), TimeBase::Audio);
        assert_eq!(state.elapsed_at(10_000.0), 0.0);
    }

    #[test]
    fn test_rebase_preserves_elapsed() {
        let mut state = TransportState::new(100.0, TimeBase::Input);
        state.start(1_000.0);
        state.pause(1_500.0);
        state.resume(1_700.0);
        let before = state.elapsed_at(2_000.0);

        state.rebase(TimeBase::Audio, 2_000.0, 40.0);

        assert_eq!(state.base(), TimeBase::Audio);
        assert_approx_eq!(state.elapsed_at(40.0), before);
        assert_approx_eq!(state.elapsed_at(140.0), before + 100.0);
    }
}
