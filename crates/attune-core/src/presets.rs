//! Binaural preset and ambient sound catalog
//!
//! Fixed tables loaded at process start. Entries are immutable except for
//! the distinguished `custom` preset, whose beat frequency is adjustable
//! at runtime through [`PresetCatalog::set_custom_frequency`].

/// Lowest selectable beat frequency in Hz
pub const MIN_BEAT_HZ: f64 = 1.0;

/// Highest selectable beat frequency in Hz
pub const MAX_BEAT_HZ: f64 = 40.0;

/// Id of the runtime-adjustable preset
pub const CUSTOM_PRESET_ID: &str = "custom";

/// A named binaural beat preset
#[derive(Debug, Clone, PartialEq)]
pub struct BinauralPreset {
    pub id: String,
    pub name: String,
    /// Target beat frequency in Hz (difference between the two ears)
    pub frequency: f64,
    pub description: String,
    pub icon: String,
}

impl BinauralPreset {
    pub fn new(id: &str, name: &str, frequency: f64, description: &str, icon: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            frequency,
            description: description.to_string(),
            icon: icon.to_string(),
        }
    }

    /// Whether this is the runtime-adjustable preset
    pub fn is_custom(&self) -> bool {
        self.id == CUSTOM_PRESET_ID
    }
}

/// A loopable ambient sound definition
#[derive(Debug, Clone, PartialEq)]
pub struct AmbientSound {
    pub id: String,
    pub name: String,
    /// Source reference resolved by the audio backend (file name under its
    /// sounds directory)
    pub loop_source_ref: String,
    pub icon: String,
}

impl AmbientSound {
    pub fn new(id: &str, name: &str, loop_source_ref: &str, icon: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            loop_source_ref: loop_source_ref.to_string(),
            icon: icon.to_string(),
        }
    }
}

/// The built-in preset and ambient sound tables
///
/// Catalog constants live in code; there is no persistence layer behind
/// this type.
#[derive(Debug, Clone)]
pub struct PresetCatalog {
    presets: Vec<BinauralPreset>,
    sounds: Vec<AmbientSound>,
}

impl PresetCatalog {
    pub fn new() -> Self {
        let presets = vec![
            BinauralPreset::new(
                "sleep",
                "Sleep",
                3.5,
                "Delta waves (1-4Hz) for deep sleep and healing",
                "😴",
            ),
            BinauralPreset::new(
                "focus",
                "Focus",
                10.0,
                "Alpha waves (8-12Hz) for concentration and productivity",
                "🧠",
            ),
            BinauralPreset::new(
                "relax",
                "Relaxation",
                6.0,
                "Theta waves (4-8Hz) for deep relaxation and meditation",
                "😌",
            ),
            BinauralPreset::new(
                "meditate",
                "Meditation",
                7.83,
                "Schumann Resonance (7.83Hz) for grounding and balance",
                "🧘",
            ),
            BinauralPreset::new(
                "energy",
                "Energy",
                14.0,
                "Low beta waves (13-16Hz) for alertness and energy",
                "⚡",
            ),
            BinauralPreset::new(
                CUSTOM_PRESET_ID,
                "Custom",
                5.5,
                "Adjust manually to your preference",
                "🛠️",
            ),
        ];

        let sounds = vec![
            AmbientSound::new("rain", "Rain", "rain.mp3", "🌧️"),
            AmbientSound::new("ocean", "Ocean", "ocean.mp3", "🌊"),
            AmbientSound::new("fire", "Fireplace", "fire.mp3", "🔥"),
            AmbientSound::new("wind", "Wind", "wind.mp3", "💨"),
            AmbientSound::new("chimes", "Chimes", "chimes.mp3", "🔔"),
        ];

        Self { presets, sounds }
    }

    /// Look up a preset by id
    pub fn preset(&self, id: &str) -> Option<&BinauralPreset> {
        self.presets.iter().find(|p| p.id == id)
    }

    /// Look up an ambient sound by id
    pub fn ambient(&self, id: &str) -> Option<&AmbientSound> {
        self.sounds.iter().find(|s| s.id == id)
    }

    /// The preset selected at startup (first table entry)
    pub fn default_preset(&self) -> &BinauralPreset {
        &self.presets[0]
    }

    /// All presets in table order
    pub fn presets(&self) -> &[BinauralPreset] {
        &self.presets
    }

    /// All ambient sounds in table order
    pub fn sounds(&self) -> &[AmbientSound] {
        &self.sounds
    }

    /// Current beat frequency of the `custom` preset
    pub fn custom_frequency(&self) -> f64 {
        self.presets
            .iter()
            .find(|p| p.is_custom())
            .map(|p| p.frequency)
            .unwrap_or(MIN_BEAT_HZ)
    }

    /// Update the `custom` preset's beat frequency, clamped to the
    /// selectable range. Returns the clamped value.
    pub fn set_custom_frequency(&mut self, hz: f64) -> f64 {
        let clamped = hz.clamp(MIN_BEAT_HZ, MAX_BEAT_HZ);
        if let Some(custom) = self.presets.iter_mut().find(|p| p.is_custom()) {
            custom.frequency = clamped;
        }
        clamped
    }
}

impl Default for PresetCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_preset_frequencies() {
        let catalog = PresetCatalog::new();

        assert_eq!(catalog.preset("sleep").unwrap().frequency, 3.5);
        assert_eq!(catalog.preset("focus").unwrap().frequency, 10.0);
        assert_eq!(catalog.preset("relax").unwrap().frequency, 6.0);
        assert_eq!(catalog.preset("meditate").unwrap().frequency, 7.83);
        assert_eq!(catalog.preset("energy").unwrap().frequency, 14.0);
        assert_eq!(catalog.custom_frequency(), 5.5);
    }

    #[test]
    fn test_default_preset_is_sleep() {
        let catalog = PresetCatalog::new();
        assert_eq!(catalog.default_preset().id, "sleep");
    }

    #[test]
    fn test_unknown_ids_return_none() {
        let catalog = PresetCatalog::new();
        assert!(catalog.preset("gamma").is_none());
        assert!(catalog.ambient("thunder").is_none());
    }

    #[test]
    fn test_custom_frequency_clamps() {
        let mut catalog = PresetCatalog::new();

        assert_eq!(catalog.set_custom_frequency(0.5), 1.0);
        assert_eq!(catalog.preset("custom").unwrap().frequency, 1.0);

        assert_eq!(catalog.set_custom_frequency(45.0), 40.0);
        assert_eq!(catalog.custom_frequency(), 40.0);

        assert_eq!(catalog.set_custom_frequency(12.25), 12.25);
    }

    #[test]
    fn test_ambient_sources_are_file_names() {
        let catalog = PresetCatalog::new();
        assert_eq!(catalog.ambient("rain").unwrap().loop_source_ref, "rain.mp3");
        assert_eq!(catalog.sounds().len(), 5);
    }
}
