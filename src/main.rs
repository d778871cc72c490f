use beatsyncrs::{
    cli::{prompt_genre, validate_device, Args},
    handle_device_list, logging, midi_input, midi_output,
    ui::format_hit,
    EngineMessage, Error, EventLoop,
    GenrePreset, InputId, LogRenderer, MonotonicClock, Result, Session, SessionEvent, Settings,
    SharedTransport, SoundRenderer, TimeBase, TimeSource, Timestamp, TransportAction, UI,
};
use clap::Parser;
use crossbeam::channel::{self, Receiver, Sender};
use log::{error, info};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const UI_REFRESH: Duration = Duration::from_millis(50);
const SIMULATED_HOLD: Duration = Duration::from_millis(80);
/// Offsets from the beat the simulated player lands on, cycling.
const SIMULATED_OFFSETS_MS: [f64; 8] = [0.0, 12.0, -30.0, 45.0, -70.0, 5.0, 140.0, -8.0];

fn main() {
    initialize_logging();
    let args = Args::parse();

    if args.device_list {
        list_available_devices(&handle_device_list());
        return;
    }

    if let Err(e) = run(args) {
        error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn initialize_logging() {
    match logging::init_logger() {
        Ok(path) => info!("Application starting, logging to {}", path.display()),
        Err(e) => eprintln!("Logger initialization failed: {}", e),
    }
}

fn list_available_devices(devices: &[String]) {
    println!("Available MIDI devices:");
    for device in devices {
        println!("  - {}", device);
    }
}

fn load_settings(args: &Args) -> Result<Settings> {
    let mut settings = Settings::load(args.config.as_deref())?;
    args.apply_to(&mut settings);

    if args.pick_genre {
        let names = GenrePreset::names(&settings.presets);
        settings.genre = prompt_genre(&names, &settings.genre)?;
    }

    settings.validate()?;
    Ok(settings)
}

fn check_device(name: &str, ports: Vec<String>) -> Result<()> {
    validate_device(name, &ports).map_err(|message| {
        eprintln!("{}", message);
        Error::DeviceNotFound(name.to_string())
    })
}

fn open_output(args: &Args) -> Result<(Box<dyn SoundRenderer>, Arc<dyn TimeSource>)> {
    match &args.output {
        Some(name) => {
            check_device(name, midi_output::list_output_ports()?)?;
            let (renderer, clock) = midi_output::connect(Some(name.as_str()))?;
            println!("Successfully connected to MIDI output: {}", name);
            Ok((Box::new(renderer), clock))
        }
        None => {
            info!("No MIDI output selected, logging sounds instead");
            Ok((
                Box::new(LogRenderer::new()),
                Arc::new(MonotonicClock::new(TimeBase::Audio)),
            ))
        }
    }
}

fn run(args: Args) -> Result<()> {
    let settings = load_settings(&args)?;
    let input_clock: Arc<dyn TimeSource> = Arc::new(MonotonicClock::new(TimeBase::Input));
    let (renderer, audio_clock) = open_output(&args)?;

    let mut session = Session::new(&settings, input_clock.clone(), renderer)?;
    let events = session
        .take_events()
        .ok_or_else(|| Error::InvalidConfig("session events already taken".to_string()))?;
    let transport = session.transport();
    let preset = session.preset().clone();

    let (tx, rx) = channel::unbounded();
    thread::Builder::new()
        .name("engine".to_string())
        .spawn(move || {
            EventLoop::new(session, rx).run();
        })?;

    // Gameplay starts on the input clock; the audio clock takes over once
    // the output is up.
    send(&tx, EngineMessage::Transport(TransportAction::Start));
    send(&tx, EngineMessage::AudioReady(audio_clock));

    let _listener = match &args.input {
        Some(name) => {
            check_device(name, midi_input::list_input_ports()?)?;
            let listener =
                midi_input::connect(name, settings.input.voices, input_clock.clone(), tx.clone())?;
            println!("Successfully connected to MIDI input: {}", listener.port_name());
            Some(listener)
        }
        None => None,
    };

    if args.simulate || args.input.is_none() {
        let sim_tx = tx.clone();
        let sim_transport = transport.clone();
        let voices = settings.input.voices;
        thread::Builder::new()
            .name("simulated-player".to_string())
            .spawn(move || run_hit_simulation(sim_tx, sim_transport, voices))?;
    }

    println!(
        "Playing '{}' at {} BPM. Press Ctrl+C to exit...",
        preset.name,
        settings.tempo.unwrap_or(preset.tempo)
    );
    info!("Application running");

    if args.no_ui {
        run_event_printer(events);
    } else {
        run_display(UI::new(transport), events);
    }
    Ok(())
}

fn send(tx: &Sender<EngineMessage>, message: EngineMessage) {
    if tx.send(message).is_err() {
        error!("Engine stopped before receiving a message");
    }
}

/// Presses one pad per beat, landing a little early or late on purpose.
fn run_hit_simulation(tx: Sender<EngineMessage>, transport: SharedTransport, voices: u8) {
    info!("Simulated player started");

    for (count, offset) in SIMULATED_OFFSETS_MS.iter().cycle().enumerate() {
        let until_next_beat = match transport.lock() {
            Ok(transport) if transport.is_running() && !transport.is_paused() => {
                let position = transport.position();
                transport.beat_duration_ms() * (1.0 - position.sub_beat_progress)
            }
            Ok(transport) => transport.beat_duration_ms(),
            Err(_) => break,
        };
        thread::sleep(Duration::from_secs_f64(until_next_beat.max(0.0) / 1000.0));

        let now = match transport.lock() {
            Ok(transport) => transport.now(),
            Err(_) => break,
        };
        let input = InputId((count % usize::from(voices.max(1))) as u8);
        let pressed = EngineMessage::NotePressed {
            input,
            at: Timestamp::new(now.base, now.ms + offset),
        };
        if tx.send(pressed).is_err() {
            break;
        }

        thread::sleep(SIMULATED_HOLD);
        let released = EngineMessage::NoteReleased {
            input,
            at: Timestamp::new(now.base, now.ms + offset + SIMULATED_HOLD.as_secs_f64() * 1000.0),
        };
        if tx.send(released).is_err() {
            break;
        }
    }
    info!("Simulated player stopped");
}

fn run_event_printer(events: Receiver<SessionEvent>) {
    for event in events.iter() {
        if let SessionEvent::Hit { input, result, .. } = event {
            println!("pad {}: {}", input.0 + 1, format_hit(&result));
        }
    }
}

fn run_display(ui: UI, events: Receiver<SessionEvent>) {
    loop {
        match events.recv_timeout(UI_REFRESH) {
            Ok(event) => ui.show_event(&event),
            Err(channel::RecvTimeoutError::Timeout) => {}
            Err(channel::RecvTimeoutError::Disconnected) => break,
        }
        ui.refresh();
    }
    ui.finish();
}
