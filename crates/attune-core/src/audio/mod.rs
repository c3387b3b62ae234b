//! Audio backend port for Attune
//!
//! The engine talks to audio hardware through the [`AudioBackend`] trait:
//! typed node handles, explicit wiring calls, and a resume handshake for
//! contexts that come up suspended. Three implementations:
//!
//! - **SimBackend**: in-memory graph with an ordered op log and failure
//!   scripting. Drives the test suite and `--dry-run`.
//! - **RenderBackend**: offline sine synthesis plus ambient loop mixing,
//!   writes float WAV files. The default output path for headless use.
//! - **CpalBackend**: live playback on the default output device (with
//!   the cpal-backend feature).
//!
//! # Resume handshake
//!
//! `resume_context` returns a [`ResumeWait`] immediately; awaiting it
//! yields the platform's answer. Backends that never suspend resolve it
//! on the spot, the sim can hold it open until a test settles it.

mod backend;
mod decode;
mod error;
mod graph;
mod render_backend;
mod sim_backend;

#[cfg(feature = "cpal-backend")]
mod cpal_backend;

pub use backend::{
    AudioBackend, ContextId, ContextState, GainId, LoopId, MergerId, OscillatorId, ResumeResolver,
    ResumeWait,
};

pub use decode::{decode_loop_source, DecodedLoop};

pub use error::{
    ContextCreationError, MixerError, MixerResult, PlaybackError, ResumeError, SynthesisError,
};

pub use render_backend::RenderBackend;
pub use sim_backend::{GraphOp, ResumeMode, SimBackend};

#[cfg(feature = "cpal-backend")]
pub use cpal_backend::CpalBackend;
