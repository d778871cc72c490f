use crate::clock::TimeSource;
use crate::error::{Error, Result};
use crate::event_loop::EngineMessage;
use crate::input::InputId;
use crossbeam::channel::Sender;
use log::{debug, info, trace};
use midir::{Ignore, MidiInput, MidiInputConnection};
use std::sync::Arc;

/// A note transition on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteMessage {
    Press { note: u8 },
    Release { note: u8 },
}

/// Note-on with a velocity is a press; note-off, or note-on with velocity 0,
/// is a release. Everything else is ignored.
pub fn parse_note_message(data: &[u8]) -> Option<NoteMessage> {
    if data.len() < 3 {
        return None;
    }

    match data[0] & 0xF0 {
        0x90 if data[2] > 0 => Some(NoteMessage::Press { note: data[1] }),
        0x90 | 0x80 => Some(NoteMessage::Release { note: data[1] }),
        _ => None,
    }
}

/// Folds every note onto one of `voices` logical inputs.
pub fn input_for_note(note: u8, voices: u8) -> InputId {
    InputId(note % voices.max(1))
}

/// Keeps the MIDI input open; dropping it closes the port.
pub struct MidiInputListener {
    connection: Option<MidiInputConnection<()>>,
    port_name: String,
}

impl MidiInputListener {
    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl Drop for MidiInputListener {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            let _ = connection.close();
            info!("Closed MIDI input '{}'", self.port_name);
        }
    }
}

/// Opens the first input port whose name contains `device_name` and
/// forwards its note transitions, stamped on `clock`, to the engine.
pub fn connect(
    device_name: &str,
    voices: u8,
    clock: Arc<dyn TimeSource>,
    tx: Sender<EngineMessage>,
) -> Result<MidiInputListener> {
    let mut midi_in = MidiInput::new("beatsyncrs-input")?;
    midi_in.ignore(Ignore::All);

    let in_ports = midi_in.ports();
    debug!("Available MIDI input ports:");
    for port in &in_ports {
        if let Ok(port_name) = midi_in.port_name(port) {
            debug!("  - {}", port_name);
        }
    }

    let in_port = in_ports
        .iter()
        .find(|port| {
            midi_in
                .port_name(port)
                .unwrap_or_default()
                .contains(device_name)
        })
        .ok_or_else(|| Error::DeviceNotFound(device_name.to_string()))?;
    let port_name = midi_in.port_name(in_port).unwrap_or_default();

    info!("Connecting to MIDI input port: {}", port_name);
    let connection = midi_in
        .connect(
            in_port,
            "beatsyncrs-input-conn",
            move |_stamp, message, _| {
                let at = clock.now();
                let engine_message = match parse_note_message(message) {
                    Some(NoteMessage::Press { note }) => EngineMessage::NotePressed {
                        input: input_for_note(note, voices),
                        at,
                    },
                    Some(NoteMessage::Release { note }) => EngineMessage::NoteReleased {
                        input: input_for_note(note, voices),
                        at,
                    },
                    None => {
                        trace!("Ignoring MIDI message {:02X?}", message);
                        return;
                    }
                };
                if tx.send(engine_message).is_err() {
                    debug!("Engine gone, dropping MIDI input");
                }
            },
            (),
        )
        .map_err(|e| Error::MidiConnection(e.to_string()))?;

    info!("Successfully connected to MIDI input: {}", port_name);
    Ok(MidiInputListener {
        connection: Some(connection),
        port_name,
    })
}

pub fn list_input_ports() -> Result<Vec<String>> {
    let midi_in = MidiInput::new("beatsyncrs-port-lister")?;
    Ok(midi_in
        .ports()
        .iter()
        .filter_map(|p| midi_in.port_name(p).ok())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_on_with_velocity_is_press() {
        assert_eq!(
            parse_note_message(&[0x91, 60, 100]),
            Some(NoteMessage::Press { note: 60 })
        );
    }

    #[test]
    fn test_note_on_with_zero_velocity_is_release() {
        assert_eq!(
            parse_note_message(&[0x90, 60, 0]),
            Some(NoteMessage::Release { note: 60 })
        );
        assert_eq!(
            parse_note_message(&[0x8F, 61, 64]),
            Some(NoteMessage::Release { note: 61 })
        );
    }

    #[test]
    fn test_other_messages_are_ignored() {
        assert_eq!(parse_note_message(&[0xF8]), None);
        assert_eq!(parse_note_message(&[0xB0, 7, 100]), None);
        assert_eq!(parse_note_message(&[0x90, 60]), None);
        assert_eq!(parse_note_message(&[]), None);
    }

    #[test]
    fn test_notes_fold_onto_voices() {
        assert_eq!(input_for_note(60, 4), InputId(0));
        assert_eq!(input_for_note(63, 4), InputId(3));
        assert_eq!(input_for_note(63, 0), InputId(0));
    }
}
