pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod event_loop;
pub mod genre;
pub mod input;
pub mod logging;
pub mod loops;
pub mod midi_input;
pub mod midi_output;
pub mod render;
pub mod scheduler;
pub mod session;
pub mod state;
pub mod timing;
pub mod transport;
pub mod ui;

pub use cli::Args;
pub use clock::{ManualClock, MonotonicClock, TimeBase, TimeSource, Timestamp};
pub use config::Settings;
pub use error::{Error, Result};
pub use event_loop::{EngineMessage, EventLoop, TransportAction};
pub use genre::GenrePreset;
pub use input::InputId;
pub use loops::{Channel, LoopManager};
pub use render::{LogRenderer, RecordingRenderer, SoundRenderer};
pub use scheduler::LookaheadScheduler;
pub use session::{Session, SessionEvent};
pub use state::BeatPosition;
pub use timing::{Accuracy, TimingEvaluator, TimingResult};
pub use transport::{SharedTransport, TransportClock};
pub use ui::UI;

use log::error;
use std::sync::{Arc, Mutex};

pub fn create_shared_transport(tempo: f64, input: Arc<dyn TimeSource>) -> SharedTransport {
    Arc::new(Mutex::new(TransportClock::new(tempo, input)))
}

/// Names of every MIDI input and output port, inputs first.
pub fn handle_device_list() -> Vec<String> {
    let mut devices = Vec::new();
    for listing in [midi_input::list_input_ports(), midi_output::list_output_ports()] {
        match listing {
            Ok(ports) => {
                for port in ports {
                    if !devices.contains(&port) {
                        devices.push(port);
                    }
                }
            }
            Err(e) => error!("Failed to list MIDI ports: {}", e),
        }
    }
    devices
}
