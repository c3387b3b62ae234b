//! Shared configuration utilities for Attune applications
//!
//! Common infrastructure for any frontend built on the engine:
//!
//! - Generic YAML config loading/saving
//! - Standard library and sound paths
//!
//! # Usage
//!
//! ```ignore
//! use attune_core::config::{load_config, save_config, default_config_path};
//!
//! let config: MyAppConfig = load_config(&default_config_path("config.yaml"));
//! save_config(&config, &default_config_path("config.yaml"))?;
//! ```

mod io;
mod paths;

pub use io::{load_config, save_config};
pub use paths::{default_config_path, default_library_path, default_sounds_path};
