use crate::clock::{MonotonicClock, TimeBase, TimeSource};
use crate::error::{Error, Result};
use crate::render::{RenderError, SoundEvent, SoundHandle, SoundKind, SoundRenderer};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info, trace};
use midir::{MidiOutput, MidiOutputConnection};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const MAX_IDLE_WAIT: Duration = Duration::from_millis(50);
const PERCUSSION_CHANNEL: u8 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiMessage {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8 },
    AllNotesOff { channel: u8 },
}

impl MidiMessage {
    pub fn to_bytes(self) -> [u8; 3] {
        match self {
            MidiMessage::NoteOn {
                channel,
                note,
                velocity,
            } => [0x90 | (channel & 0x0F), note, velocity],
            MidiMessage::NoteOff { channel, note } => [0x80 | (channel & 0x0F), note, 0],
            MidiMessage::AllNotesOff { channel } => [0xB0 | (channel & 0x0F), 123, 0],
        }
    }
}

/// Nearest equal-tempered MIDI note, A4 = 440 Hz = 69.
pub fn frequency_to_note(frequency_hz: f64) -> Option<u8> {
    if !frequency_hz.is_finite() || frequency_hz <= 0.0 {
        return None;
    }
    let note = (69.0 + 12.0 * (frequency_hz / 440.0).log2()).round();
    Some(note.clamp(0.0, 127.0) as u8)
}

pub fn velocity_to_midi(velocity: f32) -> u8 {
    (velocity.clamp(0.0, 1.0) * 127.0).round().max(1.0) as u8
}

pub fn channel_for_kind(kind: SoundKind) -> u8 {
    match kind {
        SoundKind::Pad => 0,
        SoundKind::Bass => 1,
        SoundKind::Lead => 2,
        SoundKind::Pluck => 3,
        SoundKind::Drum => PERCUSSION_CHANNEL,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledNote {
    pub id: u64,
    pub channel: u8,
    pub note: u8,
    pub velocity: u8,
    pub start_ms: f64,
    pub end_ms: f64,
}

#[derive(Debug, Clone, Copy)]
struct QueuedNote {
    note: ScheduledNote,
    sounding: bool,
}

/// Note on/off bookkeeping for the output thread, driven by audio clock
/// readings.
#[derive(Debug, Default)]
pub struct OutputQueue {
    notes: Vec<QueuedNote>,
}

impl OutputQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, note: ScheduledNote) {
        self.notes.push(QueuedNote {
            note,
            sounding: false,
        });
    }

    /// Pulls the note-off of `id` forward to `at_ms`. A note released at or
    /// before its start is dropped without ever sounding.
    pub fn release(&mut self, id: u64, at_ms: f64) -> bool {
        let Some(index) = self.notes.iter().position(|queued| queued.note.id == id) else {
            return false;
        };

        let queued = &mut self.notes[index];
        if !queued.sounding && at_ms <= queued.note.start_ms {
            trace!("Note #{} cancelled before it started", id);
            self.notes.remove(index);
            return true;
        }
        queued.note.end_ms = queued.note.end_ms.min(at_ms.max(queued.note.start_ms));
        true
    }

    /// Messages due by `now_ms`. Note-offs of already sounding notes come
    /// first so a repeated pitch starting on the same tick is not cut.
    pub fn due(&mut self, now_ms: f64) -> Vec<MidiMessage> {
        let mut messages = Vec::new();
        self.finish_due(now_ms, &mut messages);

        for queued in self.notes.iter_mut() {
            if !queued.sounding && queued.note.start_ms <= now_ms {
                queued.sounding = true;
                messages.push(MidiMessage::NoteOn {
                    channel: queued.note.channel,
                    note: queued.note.note,
                    velocity: queued.note.velocity,
                });
            }
        }

        // Notes whose whole span elapsed since the last call.
        self.finish_due(now_ms, &mut messages);
        messages
    }

    fn finish_due(&mut self, now_ms: f64, messages: &mut Vec<MidiMessage>) {
        self.notes.retain(|queued| {
            let finished = queued.sounding && queued.note.end_ms <= now_ms;
            if finished {
                messages.push(MidiMessage::NoteOff {
                    channel: queued.note.channel,
                    note: queued.note.note,
                });
            }
            !finished
        });
    }

    /// The earliest pending note on or off.
    pub fn next_deadline(&self) -> Option<f64> {
        self.notes
            .iter()
            .map(|queued| {
                if queued.sounding {
                    queued.note.end_ms
                } else {
                    queued.note.start_ms
                }
            })
            .reduce(f64::min)
    }

    /// Note-offs for everything sounding; forgets the rest.
    pub fn drain(&mut self) -> Vec<MidiMessage> {
        self.notes
            .drain(..)
            .filter(|queued| queued.sounding)
            .map(|queued| MidiMessage::NoteOff {
                channel: queued.note.channel,
                note: queued.note.note,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }
}

enum OutputCommand {
    Schedule(ScheduledNote),
    Release { id: u64, at_ms: f64 },
    Shutdown,
}

/// Plays sound events as MIDI notes through a background output thread.
pub struct MidiRenderer {
    tx: Sender<OutputCommand>,
    clock: Arc<dyn TimeSource>,
    next_id: u64,
}

impl Drop for MidiRenderer {
    fn drop(&mut self) {
        let _ = self.tx.send(OutputCommand::Shutdown);
    }
}

struct MidiHandle {
    id: u64,
    tx: Sender<OutputCommand>,
    clock: Arc<dyn TimeSource>,
}

impl SoundHandle for MidiHandle {
    fn stop(&mut self) -> std::result::Result<(), RenderError> {
        let now = self.clock.now_ms();
        self.stop_at(now)
    }

    fn stop_at(&mut self, at_ms: f64) -> std::result::Result<(), RenderError> {
        self.tx
            .send(OutputCommand::Release { id: self.id, at_ms })
            .map_err(|_| RenderError::Backend("MIDI output thread stopped".to_string()))
    }
}

impl SoundRenderer for MidiRenderer {
    fn render_event(
        &mut self,
        event: &SoundEvent,
        start_ms: f64,
    ) -> std::result::Result<Box<dyn SoundHandle>, RenderError> {
        let note = frequency_to_note(event.frequency_hz).ok_or_else(|| {
            RenderError::Backend(format!("no MIDI note for {} Hz", event.frequency_hz))
        })?;

        self.next_id += 1;
        let start_ms = start_ms + event.offset_ms;
        let scheduled = ScheduledNote {
            id: self.next_id,
            channel: channel_for_kind(event.kind),
            note,
            velocity: velocity_to_midi(event.velocity),
            start_ms,
            end_ms: start_ms + event.duration_ms,
        };

        self.tx
            .send(OutputCommand::Schedule(scheduled))
            .map_err(|_| RenderError::Backend("MIDI output thread stopped".to_string()))?;

        Ok(Box::new(MidiHandle {
            id: self.next_id,
            tx: self.tx.clone(),
            clock: self.clock.clone(),
        }))
    }
}

fn send(connection: &mut MidiOutputConnection, message: MidiMessage) {
    trace!("Sending {:?}", message);
    if let Err(e) = connection.send(&message.to_bytes()) {
        error!("Failed to send MIDI message: {}", e);
    }
}

fn run_output_queue(
    mut connection: MidiOutputConnection,
    clock: Arc<dyn TimeSource>,
    rx: Receiver<OutputCommand>,
) {
    info!("MIDI output thread started");
    let mut queue = OutputQueue::new();

    loop {
        let wait = match queue.next_deadline() {
            Some(deadline) => {
                let ms = (deadline - clock.now_ms()).max(0.0);
                Duration::from_secs_f64(ms / 1000.0).min(MAX_IDLE_WAIT)
            }
            None => MAX_IDLE_WAIT,
        };

        match rx.recv_timeout(wait) {
            Ok(OutputCommand::Schedule(note)) => queue.schedule(note),
            Ok(OutputCommand::Release { id, at_ms }) => {
                queue.release(id, at_ms);
            }
            Ok(OutputCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }

        for message in queue.due(clock.now_ms()) {
            send(&mut connection, message);
        }
    }

    for message in queue.drain() {
        send(&mut connection, message);
    }
    for channel in 0..16 {
        send(&mut connection, MidiMessage::AllNotesOff { channel });
    }
    let _ = connection.close();
    info!("MIDI output thread stopping");
}

/// Opens the output port matching `device_name`, or the first one, and
/// returns a renderer for it together with the audio clock it plays on.
pub fn connect(device_name: Option<&str>) -> Result<(MidiRenderer, Arc<dyn TimeSource>)> {
    let midi_out = MidiOutput::new("beatsyncrs-output")?;

    let out_ports = midi_out.ports();
    let available_ports: Vec<String> = out_ports
        .iter()
        .filter_map(|p| midi_out.port_name(p).ok())
        .collect();
    info!("Available MIDI output ports: {:?}", available_ports);

    let port = match device_name {
        Some(name) => out_ports
            .iter()
            .find(|p| midi_out.port_name(p).unwrap_or_default().contains(name))
            .ok_or_else(|| Error::DeviceNotFound(name.to_string()))?,
        None => out_ports
            .first()
            .ok_or_else(|| Error::MidiConnection("no MIDI output ports available".to_string()))?,
    };
    let port_name = midi_out.port_name(port).unwrap_or_default();

    info!("Connecting to MIDI output port: {}", port_name);
    let connection = midi_out
        .connect(port, "beatsyncrs-output-conn")
        .map_err(|e| Error::MidiConnection(e.to_string()))?;

    let clock: Arc<dyn TimeSource> = Arc::new(MonotonicClock::new(TimeBase::Audio));
    let (tx, rx) = channel::unbounded();
    let thread_clock = clock.clone();
    thread::Builder::new()
        .name("midi-output".to_string())
        .spawn(move || run_output_queue(connection, thread_clock, rx))?;

    debug!("MIDI output ready on '{}'", port_name);
    Ok((
        MidiRenderer {
            tx,
            clock: clock.clone(),
            next_id: 0,
        },
        clock,
    ))
}

pub fn list_output_ports() -> Result<Vec<String>> {
    let midi_out = MidiOutput::new("beatsyncrs-port-lister")?;
    Ok(midi_out
        .ports()
        .iter()
        .filter_map(|p| midi_out.port_name(p).ok())
        .collect())
}
