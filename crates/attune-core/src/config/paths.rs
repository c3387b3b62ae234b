//! Standard paths for the Attune library
//!
//! Everything lives under one directory so a user can sync or back it
//! up as a unit.

use std::path::PathBuf;

/// The Attune library root
///
/// Returns: `~/Music/attune`
pub fn default_library_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Music")
        .join("attune")
}

/// Where ambient loop sources are looked up by their bare file names
///
/// Returns: `~/Music/attune/sounds`
pub fn default_sounds_path() -> PathBuf {
    default_library_path().join("sounds")
}

/// Config file path inside the library
///
/// Returns: `~/Music/attune/{filename}`
pub fn default_config_path(filename: &str) -> PathBuf {
    default_library_path().join(filename)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_path_ends_with_attune() {
        assert!(default_library_path().ends_with("attune"));
    }

    #[test]
    fn test_sounds_path_is_inside_library() {
        let path = default_sounds_path();
        assert!(path.ends_with("sounds"));
        assert!(path.starts_with(default_library_path()));
    }

    #[test]
    fn test_config_path_includes_filename() {
        assert!(default_config_path("config.yaml").ends_with("config.yaml"));
    }
}
