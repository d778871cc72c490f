//! Timing evaluation
//!
//! Places a hit timestamp on the transport's beat grid and grades how close
//! it landed to the nearest beat.

use crate::clock::Timestamp;
use crate::config::{TimingSettings, BEATS_PER_BAR, DEFAULT_GOOD_MS, DEFAULT_PERFECT_MS};
use crate::transport::TransportClock;
use log::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Accuracy {
    Perfect,
    Good,
    Off,
}

/// Inclusive upper bounds on the absolute offset for each tier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccuracyThresholds {
    pub perfect_ms: f64,
    pub good_ms: f64,
}

impl Default for AccuracyThresholds {
    fn default() -> Self {
        Self {
            perfect_ms: DEFAULT_PERFECT_MS,
            good_ms: DEFAULT_GOOD_MS,
        }
    }
}

impl From<&TimingSettings> for AccuracyThresholds {
    fn from(settings: &TimingSettings) -> Self {
        Self {
            perfect_ms: settings.perfect_ms,
            good_ms: settings.good_ms,
        }
    }
}

impl AccuracyThresholds {
    pub fn classify(&self, offset_ms: f64) -> Accuracy {
        let distance = offset_ms.abs();
        if distance <= self.perfect_ms {
            Accuracy::Perfect
        } else if distance <= self.good_ms {
            Accuracy::Good
        } else {
            Accuracy::Off
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingResult {
    /// 1-indexed beat within the bar, in `1..=4`.
    pub nearest_beat: u32,
    /// Positive when the hit came after the beat, negative when before it.
    pub offset_ms: f64,
    pub accuracy: Accuracy,
    pub bar_number: u64,
}

impl TimingResult {
    /// Returned when there is no running transport to measure against.
    pub const FALLBACK: TimingResult = TimingResult {
        nearest_beat: 1,
        offset_ms: 0.0,
        accuracy: Accuracy::Off,
        bar_number: 0,
    };
}

#[derive(Debug, Clone, Default)]
pub struct TimingEvaluator {
    thresholds: AccuracyThresholds,
}

impl TimingEvaluator {
    pub fn new(thresholds: AccuracyThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> AccuracyThresholds {
        self.thresholds
    }

    /// Grades `hit` against the transport's beat grid. Never fails: a stopped
    /// transport yields [`TimingResult::FALLBACK`].
    ///
    /// A hit read from the transport's own time base is placed exactly. A hit
    /// from the other base is measured at the moment of evaluation instead,
    /// which assumes the delay between capture and evaluation is negligible.
    pub fn evaluate(&self, transport: &TransportClock, hit: Timestamp) -> TimingResult {
        if !transport.is_running() {
            return TimingResult::FALLBACK;
        }

        let elapsed_ms = match transport.elapsed_at(hit) {
            Some(elapsed) => elapsed,
            None => {
                trace!(
                    "Hit on {:?} clock evaluated against {:?} transport at evaluation time",
                    hit.base,
                    transport.base()
                );
                transport.elapsed_ms()
            }
        };

        self.evaluate_elapsed(elapsed_ms, transport.beat_duration_ms())
    }

    /// Grid placement for a hit `elapsed_ms` after the transport origin.
    pub fn evaluate_elapsed(&self, elapsed_ms: f64, beat_duration_ms: f64) -> TimingResult {
        if beat_duration_ms <= 0.0 || !beat_duration_ms.is_finite() || !elapsed_ms.is_finite() {
            return TimingResult::FALLBACK;
        }

        let continuous = elapsed_ms / beat_duration_ms;
        // Round half up: a hit exactly between two beats goes to the later one.
        let beat_index = (continuous + 0.5).floor();
        let offset_ms = (continuous - beat_index) * beat_duration_ms;

        let beat_index = beat_index as i64;
        let beats_per_bar = BEATS_PER_BAR as i64;

        let result = TimingResult {
            nearest_beat: beat_index.rem_euclid(beats_per_bar) as u32 + 1,
            offset_ms,
            accuracy: self.thresholds.classify(offset_ms),
            bar_number: beat_index.div_euclid(beats_per_bar).max(0) as u64,
        };
        trace!("Evaluated hit at {:.1} ms: {:?}", elapsed_ms, result);
        result
    }
}
