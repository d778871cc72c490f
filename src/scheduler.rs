//! Lookahead scheduler
//!
//! Pre-schedules the background channel one measure at a time, a short
//! horizon ahead of the audio clock, so the renderer is never asked to start
//! a sound at the very moment it must be heard. The owner polls
//! [`LookaheadScheduler::run_pass`] every [`LookaheadScheduler::poll_interval`],
//! which is kept shorter than the horizon.

use crate::config::{SchedulerSettings, DEFAULT_LOOKAHEAD_MS, DEFAULT_POLL_INTERVAL_MS};
use crate::genre::GenrePreset;
use crate::loops::{Channel, LoopManager};
use log::{debug, info, trace};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
}

/// A background measure handed to the loop manager during a pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DueMeasure {
    /// Measures scheduled before this one since the last reset; selects the chord.
    /// Not the transport's bar: it drifts from `BeatPosition::bar_number` after
    /// a tempo change or a resume, which restart the background mid-bar.
    pub index: u64,
    pub at_ms: f64,
}

#[derive(Debug, Clone)]
pub struct LookaheadScheduler {
    state: SchedulerState,
    lookahead_ms: f64,
    poll_interval: Duration,
    next_due_ms: f64,
    measures_scheduled: u64,
}

impl Default for LookaheadScheduler {
    fn default() -> Self {
        Self::new(
            DEFAULT_LOOKAHEAD_MS,
            Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        )
    }
}

impl From<&SchedulerSettings> for LookaheadScheduler {
    fn from(settings: &SchedulerSettings) -> Self {
        Self::new(settings.lookahead_ms, settings.poll_interval())
    }
}

impl LookaheadScheduler {
    pub fn new(lookahead_ms: f64, poll_interval: Duration) -> Self {
        LookaheadScheduler {
            state: SchedulerState::Idle,
            lookahead_ms,
            poll_interval,
            next_due_ms: 0.0,
            measures_scheduled: 0,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == SchedulerState::Running
    }

    pub fn lookahead_ms(&self) -> f64 {
        self.lookahead_ms
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Start time of the next measure to schedule, while running.
    pub fn next_due_ms(&self) -> Option<f64> {
        self.is_running().then_some(self.next_due_ms)
    }

    pub fn measures_scheduled(&self) -> u64 {
        self.measures_scheduled
    }

    /// Moves from Idle to Running with the first measure due at `now` and
    /// runs one pass straight away.
    ///
    /// `now` is the audio clock reading; without one the scheduler stays Idle.
    pub fn start(
        &mut self,
        now: Option<f64>,
        measure_ms: f64,
        loops: &mut LoopManager,
        preset: &GenrePreset,
    ) -> Vec<DueMeasure> {
        if self.is_running() {
            debug!("Ignoring scheduler start: already running");
            return Vec::new();
        }
        let Some(now) = now else {
            debug!("Ignoring scheduler start: audio clock not initialized");
            return Vec::new();
        };

        self.state = SchedulerState::Running;
        self.next_due_ms = now;
        info!(
            "Scheduler started at {:.1} ms, measure {:.1} ms",
            now, measure_ms
        );
        self.run_pass(now, measure_ms, loops, preset)
    }

    /// Schedules every measure starting before `now + lookahead`.
    ///
    /// After a stall all overdue measures are scheduled back to back, each
    /// exactly once and in order.
    pub fn run_pass(
        &mut self,
        now: f64,
        measure_ms: f64,
        loops: &mut LoopManager,
        preset: &GenrePreset,
    ) -> Vec<DueMeasure> {
        if !self.is_running() || measure_ms <= 0.0 || !measure_ms.is_finite() {
            return Vec::new();
        }

        let horizon = now + self.lookahead_ms;
        let mut due = Vec::new();

        while self.next_due_ms < horizon {
            let measure = DueMeasure {
                index: self.measures_scheduled,
                at_ms: self.next_due_ms,
            };
            let instruction = preset.background_instruction(measure.index, measure_ms);
            loops.trigger(Channel::Background, &instruction, measure.at_ms);
            trace!(
                "Scheduled background measure {} at {:.1} ms",
                measure.index,
                measure.at_ms
            );

            self.measures_scheduled += 1;
            self.next_due_ms += measure_ms;
            due.push(measure);
        }

        if due.len() > 1 {
            debug!("Scheduler caught up {} measures", due.len());
        }
        due
    }

    /// Moves from Running to Idle and silences the background channel.
    pub fn stop(&mut self, loops: &mut LoopManager) -> bool {
        if !self.is_running() {
            debug!("Ignoring scheduler stop: not running");
            return false;
        }
        self.state = SchedulerState::Idle;
        loops.cancel(Channel::Background);
        info!("Scheduler stopped");
        true
    }

    /// Rewinds the chord progression to the first measure.
    pub fn reset(&mut self) {
        self.measures_scheduled = 0;
    }
}
