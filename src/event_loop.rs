// event_loop.rs

use crate::clock::{TimeSource, Timestamp};
use crate::input::InputId;
use crate::session::Session;
use crossbeam::channel::{Receiver, RecvTimeoutError};
use log::{debug, error, info, warn};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportAction {
    Start,
    Stop,
    Pause,
    Resume,
}

/// Everything the outside world can ask of a running session.
pub enum EngineMessage {
    Transport(TransportAction),
    NotePressed { input: InputId, at: Timestamp },
    NoteReleased { input: InputId, at: Timestamp },
    SetGenre(String),
    SetTempo(f64),
    LeaveGameplay,
    /// The audio output is up; its clock becomes the session's time base.
    AudioReady(Arc<dyn TimeSource>),
    Shutdown,
}

impl fmt::Debug for EngineMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineMessage::Transport(action) => f.debug_tuple("Transport").field(action).finish(),
            EngineMessage::NotePressed { input, at } => f
                .debug_struct("NotePressed")
                .field("input", input)
                .field("at", at)
                .finish(),
            EngineMessage::NoteReleased { input, at } => f
                .debug_struct("NoteReleased")
                .field("input", input)
                .field("at", at)
                .finish(),
            EngineMessage::SetGenre(name) => f.debug_tuple("SetGenre").field(name).finish(),
            EngineMessage::SetTempo(bpm) => f.debug_tuple("SetTempo").field(bpm).finish(),
            EngineMessage::LeaveGameplay => f.write_str("LeaveGameplay"),
            EngineMessage::AudioReady(source) => {
                f.debug_tuple("AudioReady").field(&source.base()).finish()
            }
            EngineMessage::Shutdown => f.write_str("Shutdown"),
        }
    }
}

/// Owns the session and applies messages and scheduler polls one at a time.
pub struct EventLoop {
    session: Session,
    rx: Receiver<EngineMessage>,
}

impl EventLoop {
    pub fn new(session: Session, rx: Receiver<EngineMessage>) -> Self {
        EventLoop { session, rx }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Runs until `Shutdown` arrives or every sender is gone, then stops the
    /// session and hands it back.
    pub fn run(mut self) -> Session {
        info!("Event loop started");
        let poll_interval = self.session.scheduler().poll_interval();

        loop {
            match self.rx.recv_timeout(poll_interval) {
                Ok(EngineMessage::Shutdown) => {
                    info!("Shutdown requested");
                    break;
                }
                Ok(message) => self.handle(message),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    error!("Engine channel disconnected");
                    break;
                }
            }
            self.session.poll();
        }

        self.session.stop();
        info!("Event loop stopped");
        self.session
    }

    /// Applies one message to the session.
    pub fn handle(&mut self, message: EngineMessage) {
        debug!("Handling {:?}", message);
        match message {
            EngineMessage::Transport(action) => {
                let applied = match action {
                    TransportAction::Start => self.session.start(),
                    TransportAction::Stop => self.session.stop(),
                    TransportAction::Pause => self.session.pause(),
                    TransportAction::Resume => self.session.resume(),
                };
                if !applied {
                    debug!("Transport action {:?} had no effect", action);
                }
            }
            EngineMessage::NotePressed { input, at } => {
                self.session.note_pressed(input, at);
            }
            EngineMessage::NoteReleased { input, at } => {
                self.session.note_released(input, at);
            }
            EngineMessage::SetGenre(name) => {
                if let Err(e) = self.session.set_genre(&name) {
                    warn!("Genre change rejected: {}", e);
                }
            }
            EngineMessage::SetTempo(bpm) => {
                self.session.set_tempo(bpm);
            }
            EngineMessage::LeaveGameplay => {
                self.session.leave_gameplay();
            }
            EngineMessage::AudioReady(source) => {
                self.session.attach_audio_clock(source);
            }
            EngineMessage::Shutdown => {}
        }
    }
}
