//! Engine error taxonomy
//!
//! All of these are recoverable by design: the mixer facade rolls the
//! affected flag or selection back, surfaces the error, and waits for the
//! user to retry. Nothing in the engine retries automatically.

use thiserror::Error;

/// Failure to allocate the shared processing context
#[derive(Error, Debug)]
pub enum ContextCreationError {
    /// The platform refused to allocate audio resources
    #[error("Audio backend refused to create a processing context: {0}")]
    Denied(String),

    /// The context came up but its master gain stage could not be attached
    #[error("Failed to attach the master gain stage: {0}")]
    MasterChain(String),
}

/// Failure to resume a suspended processing context
#[derive(Error, Debug)]
pub enum ResumeError {
    /// The platform refused the resume request (commonly a missing user
    /// gesture in browser-hosted environments)
    #[error("Context resume was refused: {0}")]
    Refused(String),

    /// Resume was requested against a closed or never-created context
    #[error("Cannot resume a closed processing context")]
    ContextClosed,

    /// The backend dropped the request without answering
    #[error("Resume request was abandoned by the backend")]
    Abandoned,
}

/// Failure while building the binaural oscillator graph
#[derive(Error, Debug)]
pub enum SynthesisError {
    /// Context acquisition failed before any node was built
    #[error("No processing context available: {0}")]
    Context(#[from] ContextCreationError),

    /// The context could not be brought to the running state
    #[error("Context could not be resumed: {0}")]
    Resume(#[from] ResumeError),

    /// A graph node could not be created or connected
    #[error("Failed to create {node} node: {reason}")]
    NodeCreation { node: &'static str, reason: String },
}

/// Failure to start ambient loop playback
// Display/Error are written by hand: `source` here names the loop source
// (a file reference), which thiserror's derive would otherwise treat as an
// error cause and require to implement `std::error::Error`.
#[derive(Debug)]
pub enum PlaybackError {
    /// The loop source could not be opened or decoded
    Decode { source: String, reason: String },

    /// Playback start was refused (autoplay policy, device busy)
    StartRefused(String),
}

impl std::fmt::Display for PlaybackError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackError::Decode { source, reason } => {
                write!(f, "Could not decode ambient source '{source}': {reason}")
            }
            PlaybackError::StartRefused(reason) => {
                write!(f, "Ambient playback start was refused: {reason}")
            }
        }
    }
}

impl std::error::Error for PlaybackError {}

/// Combined error type surfaced by the mixer facade
#[derive(Error, Debug)]
pub enum MixerError {
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    #[error(transparent)]
    Playback(#[from] PlaybackError),
}

/// Result type for facade-level operations
pub type MixerResult<T> = Result<T, MixerError>;
