use thiserror::Error;

/// Failures of the ambient stack: configuration, devices, logging.
///
/// Gameplay never produces one of these; transport and scheduling conditions
/// degrade to fallback values instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unknown genre '{0}'")]
    UnknownGenre(String),

    #[error("MIDI initialization error: {0}")]
    MidiInit(#[from] midir::InitError),

    #[error("MIDI connection error: {0}")]
    MidiConnection(String),

    #[error("MIDI device '{0}' not found")]
    DeviceNotFound(String),

    #[error("logger initialization failed: {0}")]
    Logger(#[from] log::SetLoggerError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
