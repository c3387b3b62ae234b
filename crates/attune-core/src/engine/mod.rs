//! Mixing engine - context lifecycle, binaural pair, ambient loop, facade
//!
//! This module contains the core engine components for a session:
//! - ContextManager: lazy processing-context and master-stage lifecycle
//! - BinauralSynth: the two-oscillator beat pair
//! - AmbientLoop: the single looping ambient layer
//! - AudioMixer: facade tying everything together over any backend

mod ambient;
mod binaural;
mod context;
mod mixer;

pub use ambient::*;
pub use binaural::*;
pub use context::*;
pub use mixer::*;
