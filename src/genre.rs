//! Genre presets
//!
//! Read-only instrument data: tempo, a chord progression picked by bar number
//! and one sound style per channel. Custom presets can be supplied through
//! the settings file and take precedence over the built-in ones.

use crate::error::{Error, Result};
use crate::loops::Channel;
use crate::render::{RenderInstruction, SoundEvent, SoundKind};
use crate::timing::Accuracy;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InstrumentStyle {
    pub kind: SoundKind,
    /// Octave shift applied to the preset root.
    #[serde(default)]
    pub octave: i32,
    pub velocity: f32,
    pub decay_ms: f64,
    /// How many chord tones to play, from the lowest; 0 plays them all.
    #[serde(default)]
    pub chord_tones: usize,
    /// Delay between successive chord tones.
    #[serde(default)]
    pub strum_ms: f64,
}

impl InstrumentStyle {
    fn new(kind: SoundKind, octave: i32, velocity: f32, decay_ms: f64) -> Self {
        Self {
            kind,
            octave,
            velocity,
            decay_ms,
            chord_tones: 0,
            strum_ms: 0.0,
        }
    }

    fn tones(mut self, chord_tones: usize, strum_ms: f64) -> Self {
        self.chord_tones = chord_tones;
        self.strum_ms = strum_ms;
        self
    }

    fn events(
        &self,
        root_hz: f64,
        chord: &[f64],
        gain: f32,
        duration_ms: f64,
    ) -> Vec<SoundEvent> {
        let tone_count = match self.chord_tones {
            0 => chord.len(),
            n => n.min(chord.len()),
        };
        let octave = 2f64.powi(self.octave);

        chord
            .iter()
            .take(tone_count)
            .enumerate()
            .map(|(i, multiplier)| SoundEvent {
                kind: self.kind,
                frequency_hz: root_hz * multiplier * octave,
                velocity: (self.velocity * gain).clamp(0.0, 1.0),
                offset_ms: i as f64 * self.strum_ms,
                duration_ms,
            })
            .collect()
    }
}

/// Velocity scaling for a graded hit.
fn accuracy_gain(accuracy: Accuracy) -> f32 {
    match accuracy {
        Accuracy::Perfect => 1.0,
        Accuracy::Good => 0.75,
        Accuracy::Off => 0.4,
    }
}

const MAJOR_I: [f64; 3] = [1.0, 1.25, 1.5];
const MAJOR_IV: [f64; 3] = [4.0 / 3.0, 5.0 / 3.0, 2.0];
const MAJOR_V: [f64; 3] = [1.5, 1.875, 2.25];
const MINOR_VI: [f64; 3] = [5.0 / 3.0, 2.0, 2.5];
const MINOR_I: [f64; 3] = [1.0, 1.2, 1.5];
const MINOR_IV: [f64; 3] = [4.0 / 3.0, 1.6, 2.0];
const UNISON: &[f64] = &[1.0];

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GenrePreset {
    pub name: String,
    pub tempo: f64,
    pub root_hz: f64,
    /// Frequency multipliers over `root_hz`, one set per bar, cycling.
    pub chord_sequence: Vec<Vec<f64>>,
    /// Styles for `Channel::Voice(n)`, cycling when there are more voices.
    pub voices: Vec<InstrumentStyle>,
    pub background: InstrumentStyle,
}

impl GenrePreset {
    pub fn builtin() -> Vec<GenrePreset> {
        vec![
            GenrePreset {
                name: "chill".to_string(),
                tempo: 100.0,
                root_hz: 220.0,
                chord_sequence: vec![
                    MAJOR_I.to_vec(),
                    MINOR_VI.to_vec(),
                    MAJOR_IV.to_vec(),
                    MAJOR_V.to_vec(),
                ],
                voices: vec![
                    InstrumentStyle::new(SoundKind::Bass, -1, 0.9, 400.0).tones(1, 0.0),
                    InstrumentStyle::new(SoundKind::Pluck, 1, 0.7, 300.0).tones(3, 40.0),
                    InstrumentStyle::new(SoundKind::Lead, 1, 0.8, 500.0).tones(2, 0.0),
                    InstrumentStyle::new(SoundKind::Drum, -2, 1.0, 150.0).tones(1, 0.0),
                ],
                background: InstrumentStyle::new(SoundKind::Pad, 0, 0.35, 0.0),
            },
            GenrePreset {
                name: "house".to_string(),
                tempo: 128.0,
                root_hz: 261.63,
                chord_sequence: vec![MINOR_I.to_vec(), MINOR_IV.to_vec()],
                voices: vec![
                    InstrumentStyle::new(SoundKind::Drum, -2, 1.0, 120.0).tones(1, 0.0),
                    InstrumentStyle::new(SoundKind::Bass, -1, 0.9, 250.0).tones(1, 0.0),
                    InstrumentStyle::new(SoundKind::Pluck, 0, 0.7, 200.0).tones(3, 0.0),
                    InstrumentStyle::new(SoundKind::Lead, 1, 0.8, 350.0).tones(1, 0.0),
                ],
                background: InstrumentStyle::new(SoundKind::Pad, 0, 0.3, 0.0),
            },
            GenrePreset {
                name: "hiphop".to_string(),
                tempo: 90.0,
                root_hz: 196.0,
                chord_sequence: vec![
                    MINOR_I.to_vec(),
                    MINOR_I.to_vec(),
                    MINOR_IV.to_vec(),
                    MAJOR_V.to_vec(),
                ],
                voices: vec![
                    InstrumentStyle::new(SoundKind::Drum, -2, 1.0, 180.0).tones(1, 0.0),
                    InstrumentStyle::new(SoundKind::Bass, -1, 0.95, 500.0).tones(1, 0.0),
                    InstrumentStyle::new(SoundKind::Pluck, 0, 0.6, 350.0).tones(3, 60.0),
                    InstrumentStyle::new(SoundKind::Lead, 1, 0.75, 450.0).tones(2, 0.0),
                ],
                background: InstrumentStyle::new(SoundKind::Pad, -1, 0.3, 0.0),
            },
        ]
    }

    /// Looks `name` up case-insensitively, `custom` before the built-ins.
    pub fn find(name: &str, custom: &[GenrePreset]) -> Option<GenrePreset> {
        custom
            .iter()
            .cloned()
            .chain(Self::builtin())
            .find(|preset| preset.name.eq_ignore_ascii_case(name))
    }

    pub fn names(custom: &[GenrePreset]) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for preset in custom.iter().cloned().chain(Self::builtin()) {
            if !names.iter().any(|n| n.eq_ignore_ascii_case(&preset.name)) {
                names.push(preset.name);
            }
        }
        names
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| {
            Err(Error::InvalidConfig(format!(
                "preset '{}': {}",
                self.name, reason
            )))
        };

        if !self.tempo.is_finite() || self.tempo <= 0.0 {
            return invalid("tempo must be positive");
        }
        if !self.root_hz.is_finite() || self.root_hz <= 0.0 {
            return invalid("root frequency must be positive");
        }
        if self.chord_sequence.is_empty() || self.chord_sequence.iter().any(Vec::is_empty) {
            return invalid("chord sequence needs at least one non-empty chord");
        }
        if self.voices.is_empty() {
            return invalid("at least one voice style is required");
        }
        Ok(())
    }

    pub fn chord_for_bar(&self, bar: u64) -> &[f64] {
        match self.chord_sequence.len() {
            0 => UNISON,
            len => self.chord_sequence[(bar % len as u64) as usize].as_slice(),
        }
    }

    pub fn instrument_for_channel(&self, channel: Channel) -> &InstrumentStyle {
        match channel {
            Channel::Voice(index) if !self.voices.is_empty() => {
                &self.voices[index as usize % self.voices.len()]
            }
            _ => &self.background,
        }
    }

    /// The chord for `bar` held for one full measure.
    pub fn background_instruction(&self, bar: u64, measure_ms: f64) -> RenderInstruction {
        RenderInstruction::new(self.background.events(
            self.root_hz,
            self.chord_for_bar(bar),
            1.0,
            measure_ms,
        ))
    }

    /// The sound for a graded hit on `channel` during `bar`.
    pub fn hit_instruction(
        &self,
        channel: Channel,
        bar: u64,
        accuracy: Accuracy,
    ) -> RenderInstruction {
        let style = self.instrument_for_channel(channel);
        RenderInstruction::new(style.events(
            self.root_hz,
            self.chord_for_bar(bar),
            accuracy_gain(accuracy),
            style.decay_ms,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_presets_are_valid() {
        for preset in GenrePreset::builtin() {
            assert!(preset.validate().is_ok(), "{} should be valid", preset.name);
        }
    }

    #[test]
    fn test_chord_selection_wraps_by_bar() {
        let preset = GenrePreset::find("chill", &[]).unwrap();
        assert_eq!(preset.chord_for_bar(0), preset.chord_for_bar(4));
        assert_eq!(preset.chord_for_bar(1), &MINOR_VI[..]);
    }

    #[test]
    fn test_find_prefers_custom_preset() {
        let mut custom = GenrePreset::find("house", &[]).unwrap();
        custom.tempo = 124.0;
        let found = GenrePreset::find("HOUSE", &[custom]).unwrap();
        assert_eq!(found.tempo, 124.0);
        assert_eq!(GenrePreset::names(&[]).len(), 3);
    }

    #[test]
    fn test_voice_styles_cycle() {
        let preset = GenrePreset::find("house", &[]).unwrap();
        assert_eq!(
            preset.instrument_for_channel(Channel::Voice(4)),
            preset.instrument_for_channel(Channel::Voice(0))
        );
        assert_eq!(
            preset.instrument_for_channel(Channel::Background).kind,
            SoundKind::Pad
        );
    }

    #[test]
    fn test_background_instruction_spans_one_measure() {
        let preset = GenrePreset::find("chill", &[]).unwrap();
        let instruction = preset.background_instruction(0, 2_400.0);
        assert_eq!(instruction.events.len(), 3);
        assert_eq!(instruction.length_ms(), 2_400.0);
        assert_eq!(instruction.events[0].frequency_hz, 220.0);
    }

    #[test]
    fn test_hit_velocity_scales_with_accuracy() {
        let preset = GenrePreset::find("chill", &[]).unwrap();
        let perfect = preset.hit_instruction(Channel::Voice(0), 0, Accuracy::Perfect);
        let off = preset.hit_instruction(Channel::Voice(0), 0, Accuracy::Off);
        assert_eq!(perfect.events.len(), 1);
        assert!(off.events[0].velocity < perfect.events[0].velocity);
        assert_eq!(perfect.events[0].frequency_hz, 110.0);
    }

    #[test]
    fn test_invalid_preset_is_rejected() {
        let mut preset = GenrePreset::find("chill", &[]).unwrap();
        preset.chord_sequence = vec![vec![]];
        assert!(matches!(preset.validate(), Err(Error::InvalidConfig(_))));
    }
}
