//! Simulated audio backend
//!
//! Keeps the whole node graph in memory and records every port call in an
//! ordered op log. The test suite drives the engine against this backend
//! to assert graph topology, teardown ordering, and failure handling;
//! `attune-player --dry-run` uses it to print what a session would do.
//!
//! Failure scripting covers the platform conditions that are hard to
//! reproduce on demand: context allocation denial, contexts that come up
//! suspended, refused or indefinitely pending resumes, node-creation
//! faults, and loop playback failures.

use super::backend::{
    AudioBackend, ContextId, ContextState, GainId, LoopId, MergerId, OscillatorId, ResumeResolver,
    ResumeWait,
};
use super::error::{ContextCreationError, PlaybackError, SynthesisError};
use super::graph::GraphState;

/// One recorded port call
#[derive(Debug, Clone, PartialEq)]
pub enum GraphOp {
    CreateContext(ContextId),
    ResumeRequested(ContextId),
    CloseContext(ContextId),
    CreateOscillator(OscillatorId),
    CreateGain(GainId),
    CreateMerger(MergerId, u16),
    SetFrequency(OscillatorId, f64),
    SetGain(GainId, f32),
    ConnectOscillator(OscillatorId, GainId),
    ConnectGainToMerger(GainId, MergerId, u16),
    ConnectMerger(MergerId, GainId),
    ConnectToDestination(GainId),
    StartOscillator(OscillatorId),
    StopOscillator(OscillatorId),
    DisconnectOscillator(OscillatorId),
    DisconnectGain(GainId),
    DisconnectMerger(MergerId),
    CreateLoop(LoopId, String),
    SetLoopSource(LoopId, String),
    SetLoopVolume(LoopId, f32),
    PlayLoop(LoopId),
    PauseLoop(LoopId),
}

/// How the sim answers resume requests
#[derive(Debug, Clone, Default)]
pub enum ResumeMode {
    /// Grant immediately (context transitions to Running)
    #[default]
    Grant,
    /// Refuse immediately with this reason
    Deny(String),
    /// Hold the request until [`SimBackend::grant_pending_resume`] or
    /// [`SimBackend::deny_pending_resume`] settles it
    Deferred,
}

/// In-memory recording backend
#[derive(Default)]
pub struct SimBackend {
    graph: GraphState,
    ops: Vec<GraphOp>,
    start_suspended: bool,
    resume_mode: ResumeMode,
    pending_resume: Option<(ContextId, ResumeResolver)>,
    deny_context: Option<String>,
    fail_node: Option<&'static str>,
    fail_play: Option<PlaybackError>,
}

impl SimBackend {
    pub fn new() -> Self {
        Self::default()
    }

    // ───────────────────────────────────────────────────────────
    // Scripting
    // ───────────────────────────────────────────────────────────

    /// New contexts report Suspended until resumed
    pub fn start_suspended(&mut self, suspended: bool) {
        self.start_suspended = suspended;
    }

    pub fn set_resume_mode(&mut self, mode: ResumeMode) {
        self.resume_mode = mode;
    }

    /// The next `create_context` call fails with this reason
    pub fn deny_next_context(&mut self, reason: &str) {
        self.deny_context = Some(reason.to_string());
    }

    /// The next creation of the named node kind ("oscillator", "gain",
    /// "channel merger") fails
    pub fn fail_next_node(&mut self, node: &'static str) {
        self.fail_node = Some(node);
    }

    /// The next `play_loop` call fails with this error
    pub fn fail_next_play(&mut self, error: PlaybackError) {
        self.fail_play = Some(error);
    }

    /// Settle a deferred resume as granted; the context starts running
    pub fn grant_pending_resume(&mut self) {
        if let Some((ctx, resolver)) = self.pending_resume.take() {
            self.graph.set_context_state(ctx, ContextState::Running);
            resolver.grant();
        }
    }

    /// Settle a deferred resume as refused; the context stays suspended
    pub fn deny_pending_resume(&mut self, reason: &str) {
        if let Some((_, resolver)) = self.pending_resume.take() {
            resolver.deny(reason);
        }
    }

    pub fn has_pending_resume(&self) -> bool {
        self.pending_resume.is_some()
    }

    // ───────────────────────────────────────────────────────────
    // Introspection
    // ───────────────────────────────────────────────────────────

    /// Every port call in order since construction (or the last clear)
    pub fn ops(&self) -> &[GraphOp] {
        &self.ops
    }

    pub fn clear_ops(&mut self) {
        self.ops.clear();
    }

    /// Oscillators started and not yet stopped
    pub fn live_oscillator_count(&self) -> usize {
        self.graph.live_oscillator_count()
    }

    /// Frequencies of live oscillators, ascending
    pub fn live_oscillator_frequencies(&self) -> Vec<f64> {
        let mut freqs: Vec<f64> = self
            .graph
            .oscillators()
            .filter(|(_, n)| n.started && !n.stopped)
            .map(|(_, n)| n.frequency)
            .collect();
        freqs.sort_by(|a, b| a.total_cmp(b));
        freqs
    }

    /// Live oscillators that still route somewhere
    pub fn connected_oscillator_count(&self) -> usize {
        self.graph
            .oscillators()
            .filter(|(_, n)| n.started && !n.stopped && n.target.is_some())
            .count()
    }

    pub fn loop_count(&self) -> usize {
        self.graph.loop_count()
    }

    /// Source refs of all loop players, in creation order
    pub fn loop_sources(&self) -> Vec<String> {
        let mut loops: Vec<(u64, String)> = self
            .graph
            .loops()
            .map(|(id, n)| (id.0, n.source.clone()))
            .collect();
        loops.sort_by_key(|(id, _)| *id);
        loops.into_iter().map(|(_, source)| source).collect()
    }

    pub fn loop_is_playing(&self, lp: LoopId) -> bool {
        self.graph.loop_node(lp).map(|n| n.playing).unwrap_or(false)
    }

    /// True when any loop player is playing
    pub fn any_loop_playing(&self) -> bool {
        self.graph.loops().any(|(_, n)| n.playing)
    }

    pub fn gain_value(&self, gain: GainId) -> Option<f32> {
        self.graph.gain(gain).map(|n| n.value)
    }
}

impl AudioBackend for SimBackend {
    fn create_context(&mut self) -> Result<ContextId, ContextCreationError> {
        if let Some(reason) = self.deny_context.take() {
            return Err(ContextCreationError::Denied(reason));
        }
        let initial = if self.start_suspended {
            ContextState::Suspended
        } else {
            ContextState::Running
        };
        let ctx = self.graph.create_context(initial);
        self.ops.push(GraphOp::CreateContext(ctx));
        Ok(ctx)
    }

    fn context_state(&self, ctx: ContextId) -> ContextState {
        self.graph.context_state(ctx)
    }

    fn resume_context(&mut self, ctx: ContextId) -> ResumeWait {
        self.ops.push(GraphOp::ResumeRequested(ctx));
        match self.graph.context_state(ctx) {
            ContextState::Running => ResumeWait::ready(Ok(())),
            ContextState::Closed | ContextState::Uninitialized => {
                ResumeWait::ready(Err(super::error::ResumeError::ContextClosed))
            }
            ContextState::Suspended => match self.resume_mode.clone() {
                ResumeMode::Grant => {
                    self.graph.set_context_state(ctx, ContextState::Running);
                    ResumeWait::ready(Ok(()))
                }
                ResumeMode::Deny(reason) => {
                    ResumeWait::ready(Err(super::error::ResumeError::Refused(reason)))
                }
                ResumeMode::Deferred => {
                    let (wait, resolver) = ResumeWait::deferred();
                    // A newer request supersedes any held one; the old wait
                    // resolves as abandoned
                    self.pending_resume = Some((ctx, resolver));
                    wait
                }
            },
        }
    }

    fn close_context(&mut self, ctx: ContextId) {
        if self.graph.close_context(ctx) {
            self.ops.push(GraphOp::CloseContext(ctx));
        }
    }

    fn create_oscillator(&mut self, ctx: ContextId) -> Result<OscillatorId, SynthesisError> {
        if self.fail_node == Some("oscillator") {
            self.fail_node = None;
            return Err(SynthesisError::NodeCreation {
                node: "oscillator",
                reason: "simulated fault".to_string(),
            });
        }
        let osc = self.graph.create_oscillator(ctx)?;
        self.ops.push(GraphOp::CreateOscillator(osc));
        Ok(osc)
    }

    fn create_gain(&mut self, ctx: ContextId) -> Result<GainId, SynthesisError> {
        if self.fail_node == Some("gain") {
            self.fail_node = None;
            return Err(SynthesisError::NodeCreation {
                node: "gain",
                reason: "simulated fault".to_string(),
            });
        }
        let gain = self.graph.create_gain(ctx)?;
        self.ops.push(GraphOp::CreateGain(gain));
        Ok(gain)
    }

    fn create_merger(&mut self, ctx: ContextId, channels: u16) -> Result<MergerId, SynthesisError> {
        if self.fail_node == Some("channel merger") {
            self.fail_node = None;
            return Err(SynthesisError::NodeCreation {
                node: "channel merger",
                reason: "simulated fault".to_string(),
            });
        }
        let merger = self.graph.create_merger(ctx, channels)?;
        self.ops.push(GraphOp::CreateMerger(merger, channels));
        Ok(merger)
    }

    fn set_oscillator_frequency(&mut self, osc: OscillatorId, hz: f64) {
        self.ops.push(GraphOp::SetFrequency(osc, hz));
        if !self.graph.set_frequency(osc, hz) {
            log::warn!("sim: set_oscillator_frequency on unknown id {:?}", osc);
        }
    }

    fn set_gain(&mut self, gain: GainId, value: f32) {
        self.ops.push(GraphOp::SetGain(gain, value));
        if !self.graph.set_gain(gain, value) {
            log::warn!("sim: set_gain on unknown id {:?}", gain);
        }
    }

    fn connect_oscillator(&mut self, osc: OscillatorId, gain: GainId) {
        self.ops.push(GraphOp::ConnectOscillator(osc, gain));
        if !self.graph.connect_oscillator(osc, gain) {
            log::warn!("sim: connect_oscillator with unknown id {:?}", osc);
        }
    }

    fn connect_gain_to_merger(&mut self, gain: GainId, merger: MergerId, channel: u16) {
        self.ops.push(GraphOp::ConnectGainToMerger(gain, merger, channel));
        if !self.graph.connect_gain_to_merger(gain, merger, channel) {
            log::warn!("sim: connect_gain_to_merger with unknown id {:?}", gain);
        }
    }

    fn connect_merger(&mut self, merger: MergerId, gain: GainId) {
        self.ops.push(GraphOp::ConnectMerger(merger, gain));
        if !self.graph.connect_merger(merger, gain) {
            log::warn!("sim: connect_merger with unknown id {:?}", merger);
        }
    }

    fn connect_to_destination(&mut self, gain: GainId) {
        self.ops.push(GraphOp::ConnectToDestination(gain));
        if !self.graph.connect_to_destination(gain) {
            log::warn!("sim: connect_to_destination with unknown id {:?}", gain);
        }
    }

    fn start_oscillator(&mut self, osc: OscillatorId) {
        self.ops.push(GraphOp::StartOscillator(osc));
        if !self.graph.start_oscillator(osc) {
            log::warn!("sim: start_oscillator on unknown or stopped id {:?}", osc);
        }
    }

    fn stop_oscillator(&mut self, osc: OscillatorId) {
        self.ops.push(GraphOp::StopOscillator(osc));
        if !self.graph.stop_oscillator(osc) {
            log::warn!("sim: stop_oscillator on unknown id {:?}", osc);
        }
    }

    fn disconnect_oscillator(&mut self, osc: OscillatorId) {
        self.ops.push(GraphOp::DisconnectOscillator(osc));
        self.graph.disconnect_oscillator(osc);
    }

    fn disconnect_gain(&mut self, gain: GainId) {
        self.ops.push(GraphOp::DisconnectGain(gain));
        self.graph.disconnect_gain(gain);
    }

    fn disconnect_merger(&mut self, merger: MergerId) {
        self.ops.push(GraphOp::DisconnectMerger(merger));
        self.graph.disconnect_merger(merger);
    }

    fn create_loop(&mut self, source_ref: &str) -> LoopId {
        let lp = self.graph.create_loop(source_ref);
        self.ops.push(GraphOp::CreateLoop(lp, source_ref.to_string()));
        lp
    }

    fn set_loop_source(&mut self, lp: LoopId, source_ref: &str) {
        self.ops.push(GraphOp::SetLoopSource(lp, source_ref.to_string()));
        if !self.graph.set_loop_source(lp, source_ref) {
            log::warn!("sim: set_loop_source on unknown id {:?}", lp);
        }
    }

    fn set_loop_volume(&mut self, lp: LoopId, value: f32) {
        self.ops.push(GraphOp::SetLoopVolume(lp, value));
        if !self.graph.set_loop_volume(lp, value) {
            log::warn!("sim: set_loop_volume on unknown id {:?}", lp);
        }
    }

    fn play_loop(&mut self, lp: LoopId) -> Result<(), PlaybackError> {
        self.ops.push(GraphOp::PlayLoop(lp));
        if let Some(error) = self.fail_play.take() {
            return Err(error);
        }
        if !self.graph.play_loop(lp) {
            return Err(PlaybackError::StartRefused(format!(
                "unknown loop player {:?}",
                lp
            )));
        }
        Ok(())
    }

    fn pause_loop(&mut self, lp: LoopId) {
        self.ops.push(GraphOp::PauseLoop(lp));
        if !self.graph.pause_loop(lp) {
            log::warn!("sim: pause_loop on unknown id {:?}", lp);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ops_record_in_call_order() {
        let mut sim = SimBackend::new();
        let ctx = sim.create_context().unwrap();
        let osc = sim.create_oscillator(ctx).unwrap();
        let gain = sim.create_gain(ctx).unwrap();
        sim.connect_oscillator(osc, gain);
        sim.start_oscillator(osc);

        assert_eq!(
            sim.ops(),
            &[
                GraphOp::CreateContext(ctx),
                GraphOp::CreateOscillator(osc),
                GraphOp::CreateGain(gain),
                GraphOp::ConnectOscillator(osc, gain),
                GraphOp::StartOscillator(osc),
            ]
        );
        assert_eq!(sim.live_oscillator_count(), 1);
    }

    #[test]
    fn test_scripted_context_denial_is_one_shot() {
        let mut sim = SimBackend::new();
        sim.deny_next_context("policy blocked");

        assert!(matches!(
            sim.create_context(),
            Err(ContextCreationError::Denied(reason)) if reason == "policy blocked"
        ));
        assert!(sim.create_context().is_ok());
    }

    #[test]
    fn test_scripted_node_fault() {
        let mut sim = SimBackend::new();
        let ctx = sim.create_context().unwrap();
        sim.fail_next_node("channel merger");

        assert!(sim.create_gain(ctx).is_ok());
        assert!(matches!(
            sim.create_merger(ctx, 2),
            Err(SynthesisError::NodeCreation { node: "channel merger", .. })
        ));
        assert!(sim.create_merger(ctx, 2).is_ok());
    }

    #[tokio::test]
    async fn test_deferred_resume_grant_transitions_to_running() {
        let mut sim = SimBackend::new();
        sim.start_suspended(true);
        sim.set_resume_mode(ResumeMode::Deferred);

        let ctx = sim.create_context().unwrap();
        assert_eq!(sim.context_state(ctx), ContextState::Suspended);

        let wait = sim.resume_context(ctx);
        assert!(sim.has_pending_resume());

        sim.grant_pending_resume();
        assert!(wait.wait().await.is_ok());
        assert_eq!(sim.context_state(ctx), ContextState::Running);
    }

    #[tokio::test]
    async fn test_deferred_resume_denial_keeps_suspended() {
        let mut sim = SimBackend::new();
        sim.start_suspended(true);
        sim.set_resume_mode(ResumeMode::Deferred);

        let ctx = sim.create_context().unwrap();
        let wait = sim.resume_context(ctx);
        sim.deny_pending_resume("no user gesture");

        assert!(matches!(
            wait.wait().await,
            Err(super::super::error::ResumeError::Refused(reason)) if reason == "no user gesture"
        ));
        assert_eq!(sim.context_state(ctx), ContextState::Suspended);
    }

    #[tokio::test]
    async fn test_resume_on_running_context_is_immediate() {
        let mut sim = SimBackend::new();
        let ctx = sim.create_context().unwrap();

        let wait = sim.resume_context(ctx);
        assert!(wait.wait().await.is_ok());
    }
}
