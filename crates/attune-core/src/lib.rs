//! Attune Core - binaural mixing engine shared by the Attune frontends

pub mod audio;
pub mod config;
pub mod engine;
pub mod presets;
pub mod types;

pub use types::*;
