//! Audio backend capability trait
//!
//! The engine never talks to a platform audio API directly. Everything it
//! needs (a processing context, oscillators, gain stages, a channel
//! merger, and a loopable media handle for the ambient bed) is requested
//! through this trait, so the same engine runs against:
//!
//! - [`SimBackend`](super::sim_backend::SimBackend): in-memory graph that
//!   records every operation (test suite, dry runs)
//! - [`RenderBackend`](super::render_backend::RenderBackend): offline
//!   synthesis to a WAV file
//! - `CpalBackend` (with the `cpal-backend` feature): live output through
//!   the system audio device
//!
//! Backends own every node they create; the engine holds typed ids. The
//! asynchronous part of the surface is deliberately tiny: resuming a
//! suspended context hands back a [`ResumeWait`] that the backend resolves,
//! and that wait is the engine's only suspension point.

use tokio::sync::oneshot;

use super::error::{ContextCreationError, PlaybackError, ResumeError, SynthesisError};

/// Lifecycle state of the shared processing context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContextState {
    /// No context has been created yet
    #[default]
    Uninitialized,
    /// Context is live and producing audio
    Running,
    /// Context exists but the platform is holding it silent
    Suspended,
    /// Context was closed; terminal until a fresh context is created
    Closed,
}

/// Handle to a backend-owned processing context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(pub u64);

/// Handle to a backend-owned oscillator node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OscillatorId(pub u64);

/// Handle to a backend-owned gain node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GainId(pub u64);

/// Handle to a backend-owned channel merger node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MergerId(pub u64);

/// Handle to a backend-owned ambient loop player
///
/// Loop players live outside the processing-context graph and survive a
/// context close, mirroring a media element next to an audio graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoopId(pub u64);

/// Pending answer to a context resume request
///
/// The backend resolves the wait whenever the platform settles the request;
/// immediate backends resolve before returning. Dropping the resolver
/// without answering surfaces as [`ResumeError::Abandoned`].
pub struct ResumeWait {
    rx: oneshot::Receiver<Result<(), ResumeError>>,
}

impl ResumeWait {
    /// A wait that is already resolved
    pub fn ready(result: Result<(), ResumeError>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        Self { rx }
    }

    /// A wait resolved later through the returned [`ResumeResolver`]
    pub fn deferred() -> (Self, ResumeResolver) {
        let (tx, rx) = oneshot::channel();
        (Self { rx }, ResumeResolver { tx })
    }

    /// Suspend until the backend answers
    pub async fn wait(self) -> Result<(), ResumeError> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(ResumeError::Abandoned),
        }
    }
}

/// Resolver side of a deferred [`ResumeWait`]
pub struct ResumeResolver {
    tx: oneshot::Sender<Result<(), ResumeError>>,
}

impl ResumeResolver {
    /// Grant the resume; the context transitions to Running
    pub fn grant(self) {
        let _ = self.tx.send(Ok(()));
    }

    /// Refuse the resume with a reason; the context stays suspended
    pub fn deny(self, reason: &str) {
        let _ = self.tx.send(Err(ResumeError::Refused(reason.to_string())));
    }
}

/// Capability interface to a platform audio system
///
/// All node-building calls are synchronous; [`resume_context`] is the only
/// operation whose outcome arrives later. Operations on ids the backend no
/// longer considers live are logged and ignored rather than escalated;
/// teardown paths must stay safe to run twice.
///
/// [`resume_context`]: AudioBackend::resume_context
pub trait AudioBackend {
    // ───────────────────────────────────────────────────────────
    // Context lifecycle
    // ───────────────────────────────────────────────────────────

    /// Create a processing context. The platform decides whether it starts
    /// Running or Suspended.
    fn create_context(&mut self) -> Result<ContextId, ContextCreationError>;

    /// Report the lifecycle state of a context (Closed for unknown ids)
    fn context_state(&self, ctx: ContextId) -> ContextState;

    /// Request that a suspended context start running
    fn resume_context(&mut self, ctx: ContextId) -> ResumeWait;

    /// Close a context and every node attached to it. Idempotent.
    fn close_context(&mut self, ctx: ContextId);

    // ───────────────────────────────────────────────────────────
    // Graph node creation
    // ───────────────────────────────────────────────────────────

    /// Create an oscillator in the given context
    fn create_oscillator(&mut self, ctx: ContextId) -> Result<OscillatorId, SynthesisError>;

    /// Create a gain node in the given context (initial gain 1.0)
    fn create_gain(&mut self, ctx: ContextId) -> Result<GainId, SynthesisError>;

    /// Create a channel merger in the given context
    fn create_merger(&mut self, ctx: ContextId, channels: u16) -> Result<MergerId, SynthesisError>;

    // ───────────────────────────────────────────────────────────
    // Graph wiring and control
    // ───────────────────────────────────────────────────────────

    /// Set an oscillator's frequency in Hz
    fn set_oscillator_frequency(&mut self, osc: OscillatorId, hz: f64);

    /// Set a gain node's amplitude factor (1.0 = unity)
    fn set_gain(&mut self, gain: GainId, value: f32);

    /// Route an oscillator into a gain node
    fn connect_oscillator(&mut self, osc: OscillatorId, gain: GainId);

    /// Route a gain node into one input channel of a merger
    fn connect_gain_to_merger(&mut self, gain: GainId, merger: MergerId, channel: u16);

    /// Route a merger into a gain node (the master stage)
    fn connect_merger(&mut self, merger: MergerId, gain: GainId);

    /// Route a gain node to the hardware destination
    fn connect_to_destination(&mut self, gain: GainId);

    /// Start an oscillator. Oscillators are one-shot: once stopped they
    /// cannot be restarted, only replaced.
    fn start_oscillator(&mut self, osc: OscillatorId);

    /// Stop an oscillator
    fn stop_oscillator(&mut self, osc: OscillatorId);

    /// Remove an oscillator's outgoing connection
    fn disconnect_oscillator(&mut self, osc: OscillatorId);

    /// Remove a gain node's outgoing connection
    fn disconnect_gain(&mut self, gain: GainId);

    /// Remove a merger's outgoing connection
    fn disconnect_merger(&mut self, merger: MergerId);

    // ───────────────────────────────────────────────────────────
    // Ambient loop player
    // ───────────────────────────────────────────────────────────

    /// Create a loop player bound to a source reference. Looping is always
    /// enabled; nothing is decoded or played until [`play_loop`].
    ///
    /// [`play_loop`]: AudioBackend::play_loop
    fn create_loop(&mut self, source_ref: &str) -> LoopId;

    /// Swap the player's source. Resets the playback position.
    fn set_loop_source(&mut self, lp: LoopId, source_ref: &str);

    /// Set the player's volume (0.0–1.0), independent of the master gain
    fn set_loop_volume(&mut self, lp: LoopId, value: f32);

    /// Start (or restart) loop playback. Decode and start failures surface
    /// here and leave the player paused.
    fn play_loop(&mut self, lp: LoopId) -> Result<(), PlaybackError>;

    /// Pause loop playback, keeping the player for later reuse
    fn pause_loop(&mut self, lp: LoopId);
}
