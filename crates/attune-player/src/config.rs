//! Session configuration for attune-player
//!
//! Configuration is stored as YAML inside the Attune library.
//! Default location: ~/Music/attune/player.yaml

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use attune_core::config::{default_config_path, default_sounds_path};
use attune_core::engine::{DEFAULT_AMBIENT_VOLUME, DEFAULT_BINAURAL_VOLUME};

/// Startup configuration for a listening session
///
/// Every field has a default, so a partial (or missing) file works.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Preset selected at startup (an id from the built-in catalog)
    pub default_preset: String,
    /// Binaural tone volume in percent (0-100)
    pub binaural_volume: u8,
    /// Ambient loop volume in percent (0-100)
    pub ambient_volume: u8,
    /// Session length in minutes; 0 keeps playing until stopped
    pub session_minutes: u32,
    /// Where ambient loop files are looked up by their bare names
    /// Default: ~/Music/attune/sounds
    pub sounds_dir: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_preset: "sleep".to_string(),
            binaural_volume: DEFAULT_BINAURAL_VOLUME,
            ambient_volume: DEFAULT_AMBIENT_VOLUME,
            session_minutes: 0,
            sounds_dir: default_sounds_path(),
        }
    }
}

/// Default config file path
///
/// Returns: ~/Music/attune/player.yaml
pub fn config_path() -> PathBuf {
    default_config_path("player.yaml")
}
