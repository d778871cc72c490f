use crate::error::{Error, Result};
use chrono::Local;
use simplelog::{Config, LevelFilter, WriteLogger};
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// `$HOME/.local/share/beatsyncrs/logs`
pub fn log_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").map_err(|_| {
        Error::Io(io::Error::new(
            io::ErrorKind::NotFound,
            "HOME environment variable not set",
        ))
    })?;

    Ok(PathBuf::from(home)
        .join(".local")
        .join("share")
        .join("beatsyncrs")
        .join("logs"))
}

/// One file per day, e.g. `beatsyncrs-2024-05-01.log`.
pub fn log_file_name() -> String {
    format!("beatsyncrs-{}.log", Local::now().format("%Y-%m-%d"))
}

/// Sends all `log` output at `level` and above to today's file in `dir`.
pub fn init_logger_in(dir: &Path, level: LevelFilter) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;

    let path = dir.join(log_file_name());
    let log_file = OpenOptions::new().create(true).append(true).open(&path)?;

    WriteLogger::init(level, Config::default(), log_file)?;
    Ok(path)
}

pub fn init_logger() -> Result<PathBuf> {
    init_logger_in(&log_dir()?, LevelFilter::Debug)
}
