use beatsyncrs::render::{RenderInstruction, SoundEvent, SoundKind};
use beatsyncrs::{Channel, LoopManager, ManualClock, RecordingRenderer, TimeBase};
use std::sync::Arc;

fn chord(duration_ms: f64) -> RenderInstruction {
    RenderInstruction::new(
        [220.0, 275.0, 330.0]
            .iter()
            .map(|&frequency_hz| SoundEvent {
                kind: SoundKind::Pluck,
                frequency_hz,
                velocity: 0.8,
                offset_ms: 0.0,
                duration_ms,
            })
            .collect(),
    )
}

fn setup() -> (LoopManager, RecordingRenderer, ManualClock) {
    let clock = ManualClock::new(TimeBase::Audio);
    let renderer = RecordingRenderer::new(Arc::new(clock.clone()));
    (LoopManager::new(Box::new(renderer.clone())), renderer, clock)
}

#[test]
fn test_double_trigger_leaves_exactly_one_group() {
    let (mut loops, renderer, clock) = setup();
    let channel = Channel::Voice(0);

    clock.set(1_000.0);
    assert_eq!(loops.trigger(channel, &chord(2_000.0), 1_000.0), 3);
    clock.set(1_030.0);
    assert_eq!(loops.trigger(channel, &chord(2_000.0), 1_030.0), 3);

    assert_eq!(loops.len(), 1);
    assert_eq!(loops.group(channel).map(|g| g.start_ms()), Some(1_030.0));

    let events = renderer.events();
    assert_eq!(events.len(), 6);
    for first in &events[..3] {
        assert_eq!(first.released_at, Some(1_030.0));
        assert!(first.audible_end_ms() <= 1_030.0);
    }
    for second in &events[3..] {
        assert_eq!(second.released_at, None);
    }
}

#[test]
fn test_future_trigger_releases_previous_group_at_new_start() {
    let (mut loops, renderer, _clock) = setup();

    loops.trigger(Channel::Background, &chord(2_400.0), 0.0);
    loops.trigger(Channel::Background, &chord(2_400.0), 2_400.0);

    let events = renderer.events();
    let (first, second) = events.split_at(3);
    let first_end = first
        .iter()
        .map(|event| event.audible_end_ms())
        .fold(0.0, f64::max);
    let second_start = second
        .iter()
        .map(|event| event.start_ms)
        .fold(f64::INFINITY, f64::min);
    assert!(first_end <= second_start);
}

#[test]
fn test_channels_are_independent() {
    let (mut loops, _renderer, _clock) = setup();
    loops.trigger(Channel::Voice(0), &chord(500.0), 0.0);
    loops.trigger(Channel::Voice(1), &chord(500.0), 10.0);
    loops.trigger(Channel::Background, &chord(2_400.0), 0.0);

    assert_eq!(
        loops.active_channels(),
        vec![Channel::Voice(0), Channel::Voice(1), Channel::Background]
    );
    assert_eq!(loops.cancel_all_except(Channel::Background), 2);
    assert_eq!(loops.active_channels(), vec![Channel::Background]);
}

#[test]
fn test_cancel_all_releases_everything_now() {
    let (mut loops, renderer, clock) = setup();
    loops.trigger(Channel::Voice(3), &chord(1_000.0), 0.0);
    loops.trigger(Channel::Background, &chord(2_400.0), 0.0);
    clock.set(200.0);

    assert_eq!(loops.cancel_all(), 2);
    assert!(loops.is_empty());
    assert!(renderer
        .events()
        .iter()
        .all(|event| event.released_at == Some(200.0)));
}

#[test]
fn test_replacing_a_finished_group_swallows_stop_errors() {
    let (mut loops, renderer, clock) = setup();
    loops.trigger(Channel::Voice(0), &chord(100.0), 0.0);
    clock.set(5_000.0);

    assert_eq!(loops.trigger(Channel::Voice(0), &chord(100.0), 5_000.0), 3);
    assert_eq!(loops.len(), 1);
    assert!(renderer.events()[..3]
        .iter()
        .all(|event| event.stop_calls == 1 && event.released_at.is_none()));
}
