use assert_approx_eq::assert_approx_eq;
use beatsyncrs::timing::AccuracyThresholds;
use beatsyncrs::{
    Accuracy, ManualClock, TimeBase, Timestamp, TimingEvaluator, TimingResult, TransportClock,
};
use std::sync::Arc;

fn started_transport(tempo: f64) -> (TransportClock, ManualClock) {
    let clock = ManualClock::new(TimeBase::Input);
    let mut transport = TransportClock::new(tempo, Arc::new(clock.clone()));
    transport.start();
    (transport, clock)
}

#[test]
fn test_hundred_bpm_scenario() {
    let (transport, _clock) = started_transport(100.0);
    let evaluator = TimingEvaluator::default();
    assert_eq!(transport.beat_duration_ms(), 600.0);
    assert_eq!(transport.measure_duration_ms(), 2_400.0);

    let on_time = evaluator.evaluate(&transport, Timestamp::input(605.0));
    assert_eq!(on_time.nearest_beat, 2);
    assert_approx_eq!(on_time.offset_ms, 5.0);
    assert_eq!(on_time.accuracy, Accuracy::Perfect);

    let late = evaluator.evaluate(&transport, Timestamp::input(780.0));
    assert_eq!(late.nearest_beat, 2);
    assert_approx_eq!(late.offset_ms, 180.0);
    assert_eq!(late.accuracy, Accuracy::Off);
}

#[test]
fn test_hit_on_beat_boundary_is_perfect() {
    let (transport, _clock) = started_transport(120.0);
    let evaluator = TimingEvaluator::default();

    for beat in 0..9 {
        let result = evaluator.evaluate(&transport, Timestamp::input(beat as f64 * 500.0));
        assert_eq!(result.offset_ms, 0.0);
        assert_eq!(result.accuracy, Accuracy::Perfect);
        assert_eq!(result.nearest_beat, beat % 4 + 1);
        assert_eq!(result.bar_number, u64::from(beat / 4));
    }
}

#[test]
fn test_threshold_edges() {
    let evaluator = TimingEvaluator::default();
    // A power-of-two beat keeps the exact edges exact.
    let beat = 512.0;

    let classify = |elapsed: f64| evaluator.evaluate_elapsed(elapsed, beat).accuracy;
    assert_eq!(classify(562.0), Accuracy::Perfect);
    assert_eq!(classify(462.0), Accuracy::Perfect);
    assert_eq!(classify(562.0001), Accuracy::Good);
    assert_eq!(classify(461.9999), Accuracy::Good);
    assert_eq!(classify(662.0), Accuracy::Good);
    assert_eq!(classify(662.0001), Accuracy::Off);
    assert_eq!(classify(361.9999), Accuracy::Off);
}

#[test]
fn test_thresholds_classify_by_magnitude() {
    let thresholds = AccuracyThresholds::default();
    assert_eq!(thresholds.classify(-50.0), Accuracy::Perfect);
    assert_eq!(thresholds.classify(50.0001), Accuracy::Good);
    assert_eq!(thresholds.classify(-150.0001), Accuracy::Off);
}

#[test]
fn test_halfway_hit_rounds_to_later_beat() {
    let evaluator = TimingEvaluator::default();
    let result = evaluator.evaluate_elapsed(300.0, 600.0);
    assert_eq!(result.nearest_beat, 2);
    assert_approx_eq!(result.offset_ms, -300.0);
    assert_eq!(result.accuracy, Accuracy::Off);
}

#[test]
fn test_stopped_transport_yields_fallback() {
    let clock = ManualClock::new(TimeBase::Input);
    let transport = TransportClock::new(120.0, Arc::new(clock));
    let result = TimingEvaluator::default().evaluate(&transport, Timestamp::input(500.0));
    assert_eq!(result, TimingResult::FALLBACK);
    assert_eq!(result.accuracy, Accuracy::Off);
    assert_eq!(result.nearest_beat, 1);
}

#[test]
fn test_cross_base_hit_is_measured_at_evaluation_time() {
    let (mut transport, input) = started_transport(100.0);
    let audio = ManualClock::new(TimeBase::Audio);
    input.set(100.0);
    audio.set(50_000.0);
    transport.reanchor_to_audio(Arc::new(audio.clone()));
    audio.set(50_500.0);

    // The input-clock reading is ignored; only "now" counts.
    let result = TimingEvaluator::default().evaluate(&transport, Timestamp::input(99_999.0));
    assert_eq!(result.nearest_beat, 2);
    assert_approx_eq!(result.offset_ms, 0.0);
}

#[test]
fn test_custom_thresholds() {
    let evaluator = TimingEvaluator::new(AccuracyThresholds {
        perfect_ms: 10.0,
        good_ms: 20.0,
    });
    assert_eq!(evaluator.evaluate_elapsed(515.0, 500.0).accuracy, Accuracy::Good);
    assert_eq!(evaluator.evaluate_elapsed(525.0, 500.0).accuracy, Accuracy::Off);
}
