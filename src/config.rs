use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;

/// How a stop silences the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotesOffMode {
    /// A note-off for every note on every channel.
    NoteOffFlood,
    /// One "All Notes Off" controller (CC 123) per channel.
    ChannelMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Target cadence of the clock pump.
    pub poll_interval: Duration,
    pub client_name: String,
    /// Substring of the output port name; first available port when unset.
    pub port_name: Option<String>,
    pub notes_off: NotesOffMode,
    /// Reconstruct controller/program/pitch/pressure state on seek.
    pub chase: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1),
            client_name: "stagetime".to_string(),
            port_name: None,
            notes_off: NotesOffMode::NoteOffFlood,
            chase: true,
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let ron_string = fs::read_to_string(path)?;
        let config: EngineConfig = ron::from_str(&ron_string)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let ron_string = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?;
        fs::write(path, ron_string)?;
        Ok(())
    }
}
