use crate::config::Settings;
use crate::error::{Error, Result};
use clap::Parser;
use dialoguer::Select;
use std::io;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Settings file (TOML, YAML or JSON)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Genre preset to play
    #[arg(long)]
    pub genre: Option<String>,

    /// Override the preset tempo
    #[arg(long)]
    pub bpm: Option<f64>,

    /// List available MIDI devices
    #[arg(long)]
    pub device_list: bool,

    /// MIDI input device to take hits from
    #[arg(long)]
    pub input: Option<String>,

    /// MIDI output device to play through
    #[arg(long)]
    pub output: Option<String>,

    /// Play hits automatically instead of reading MIDI input
    #[arg(long)]
    pub simulate: bool,

    /// Choose the genre interactively
    #[arg(long)]
    pub pick_genre: bool,

    /// Disable the terminal beat display
    #[arg(long)]
    pub no_ui: bool,
}

impl Args {
    /// Command line values win over file and environment settings.
    pub fn apply_to(&self, settings: &mut Settings) {
        if let Some(genre) = &self.genre {
            settings.genre = genre.clone();
        }
        if let Some(bpm) = self.bpm {
            settings.tempo = Some(bpm);
        }
    }
}

pub fn validate_device(device_name: &str, devices: &[String]) -> std::result::Result<(), String> {
    if !devices.iter().any(|d| d.contains(device_name)) {
        let mut error_msg = format!(
            "Error: Device '{}' not found in available devices:\n",
            device_name
        );
        for device in devices {
            error_msg.push_str(&format!("  - {}\n", device));
        }
        return Err(error_msg);
    }
    Ok(())
}

/// Asks the user to pick one of `names`, preselecting `current`.
pub fn prompt_genre(names: &[String], current: &str) -> Result<String> {
    let default = names
        .iter()
        .position(|name| name.eq_ignore_ascii_case(current))
        .unwrap_or(0);

    let index = Select::new()
        .with_prompt("Pick a genre")
        .items(names)
        .default(default)
        .interact()
        .map_err(|e| Error::Io(io::Error::new(io::ErrorKind::Other, e.to_string())))?;

    names
        .get(index)
        .cloned()
        .ok_or_else(|| Error::UnknownGenre(index.to_string()))
}
