// ui.rs

use crate::config::BEATS_PER_BAR;
use crate::session::SessionEvent;
use crate::state::BeatPosition;
use crate::timing::{Accuracy, TimingResult};
use crate::transport::SharedTransport;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

const PHRASE_BARS: u64 = 4;

fn create_beat_progress(multi_progress: &MultiProgress) -> ProgressBar {
    let pb = multi_progress.add(ProgressBar::new(BEATS_PER_BAR));
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{prefix:.bold} [{bar:40.cyan}] {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("⣀⣤⣦⣶⣷⣿ "),
    );
    pb.set_prefix("Beat");
    pb
}

fn create_bar_progress(multi_progress: &MultiProgress) -> ProgressBar {
    let pb = multi_progress.add(ProgressBar::new(PHRASE_BARS));
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{prefix:.bold} [{bar:20.white/black}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▊ "),
    );
    pb.set_prefix("Bar");
    pb
}

fn create_status_spinner(multi_progress: &MultiProgress) -> ProgressBar {
    let pb = multi_progress.add(ProgressBar::new_spinner());
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{prefix:.bold.dim} {spinner} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_prefix("Transport");
    pb
}

pub fn format_hit(result: &TimingResult) -> String {
    let grade = match result.accuracy {
        Accuracy::Perfect => "PERFECT",
        Accuracy::Good => "good",
        Accuracy::Off => "off",
    };
    format!(
        "{} {:+.0} ms (beat {}, bar {})",
        grade,
        result.offset_ms,
        result.nearest_beat,
        result.bar_number + 1
    )
}

pub fn format_status(position: &BeatPosition, tempo: f64, running: bool, paused: bool) -> String {
    let transport = match (running, paused) {
        (false, _) => "Stopped",
        (true, true) => "Paused",
        (true, false) => "Playing",
    };
    format!(
        "BPM: {:.1}, Beats: {:.2}, Transport: {}",
        tempo, position.continuous_beats, transport
    )
}

pub struct UI {
    transport: SharedTransport,

    #[allow(dead_code)]
    multi_progress: MultiProgress,
    beat_pb: ProgressBar,
    bar_pb: ProgressBar,
    status_pb: ProgressBar,
}

impl UI {
    pub fn new(transport: SharedTransport) -> Self {
        let multi_progress = MultiProgress::with_draw_target(ProgressDrawTarget::stderr());
        let beat_pb = create_beat_progress(&multi_progress);
        let bar_pb = create_bar_progress(&multi_progress);
        let status_pb = create_status_spinner(&multi_progress);

        UI {
            transport,
            multi_progress,
            beat_pb,
            bar_pb,
            status_pb,
        }
    }

    /// Redraws from the current transport position.
    pub fn refresh(&self) {
        let (position, tempo, running, paused) = match self.transport.lock() {
            Ok(transport) => (
                transport.position(),
                transport.tempo(),
                transport.is_running(),
                transport.is_paused(),
            ),
            Err(_) => return,
        };

        self.beat_pb.set_position(u64::from(position.beat_in_bar));
        self.bar_pb
            .set_position(position.bar_number % PHRASE_BARS + u64::from(running));
        self.status_pb
            .set_message(format_status(&position, tempo, running, paused));
        self.status_pb.tick();
    }

    pub fn show_event(&self, event: &SessionEvent) {
        if let SessionEvent::Hit { input, result, .. } = event {
            self.bar_pb
                .set_message(format!("pad {}: {}", input.0 + 1, format_hit(result)));
        }
    }

    pub fn finish(&self) {
        self.beat_pb.finish_and_clear();
        self.bar_pb.finish_and_clear();
        self.status_pb.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_hit() {
        let result = TimingResult {
            nearest_beat: 2,
            offset_ms: 5.0,
            accuracy: Accuracy::Perfect,
            bar_number: 0,
        };
        assert_eq!(format_hit(&result), "PERFECT +5 ms (beat 2, bar 1)");
    }

    #[test]
    fn test_format_status_when_stopped() {
        let status = format_status(&BeatPosition::STOPPED, 120.0, false, false);
        assert_eq!(status, "BPM: 120.0, Beats: 0.00, Transport: Stopped");
    }
}
