//! In-memory node-graph bookkeeping
//!
//! Shared by every backend: node tables for contexts,
//! oscillators, gains, mergers, and loop players, with the single-outgoing-
//! edge wiring the engine actually builds (oscillator → channel gain →
//! merger → master gain → destination). Ids are process-unique across all
//! node kinds so a stale handle can never alias a newer node.

use std::collections::HashMap;

use super::backend::{ContextId, ContextState, GainId, LoopId, MergerId, OscillatorId};
use super::error::SynthesisError;

/// Where a gain node routes its output
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum GainTarget {
    /// Into one input channel of a merger
    Merger(MergerId, u16),
    /// Straight to the hardware destination (the master stage)
    Destination,
}

#[derive(Debug)]
pub(crate) struct OscNode {
    pub ctx: ContextId,
    pub frequency: f64,
    pub started: bool,
    pub stopped: bool,
    pub target: Option<GainId>,
}

#[derive(Debug)]
pub(crate) struct GainNode {
    pub ctx: ContextId,
    pub value: f32,
    pub target: Option<GainTarget>,
}

#[derive(Debug)]
pub(crate) struct MergerNode {
    pub ctx: ContextId,
    pub channels: u16,
    pub target: Option<GainId>,
}

#[derive(Debug)]
pub(crate) struct LoopNode {
    pub source: String,
    pub volume: f32,
    pub playing: bool,
    /// Playback position in source frames (fractional; the render path
    /// steps it at the source rate)
    pub position: f64,
}

/// A fully wired oscillator chain that reaches the destination
///
/// Resolved from the tables: context running, oscillator started and not
/// stopped, and every hop of the wiring present. Amplitude is the product
/// of the gains on the path.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ResolvedChain {
    pub oscillator: OscillatorId,
    pub frequency: f64,
    pub amplitude: f32,
    /// Merger input channel, or None for a direct-to-destination chain
    pub channel: Option<u16>,
}

/// Node tables plus wiring state
#[derive(Debug, Default)]
pub(crate) struct GraphState {
    next_id: u64,
    contexts: HashMap<u64, ContextState>,
    oscillators: HashMap<u64, OscNode>,
    gains: HashMap<u64, GainNode>,
    mergers: HashMap<u64, MergerNode>,
    loops: HashMap<u64, LoopNode>,
}

impl GraphState {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn require_open(&self, ctx: ContextId, node: &'static str) -> Result<(), SynthesisError> {
        match self.contexts.get(&ctx.0) {
            Some(ContextState::Closed) | None => Err(SynthesisError::NodeCreation {
                node,
                reason: "processing context is closed".to_string(),
            }),
            Some(_) => Ok(()),
        }
    }

    // ───────────────────────────────────────────────────────────
    // Contexts
    // ───────────────────────────────────────────────────────────

    pub fn create_context(&mut self, initial: ContextState) -> ContextId {
        let id = self.next_id();
        self.contexts.insert(id, initial);
        ContextId(id)
    }

    /// Closed for ids this graph has never seen
    pub fn context_state(&self, ctx: ContextId) -> ContextState {
        self.contexts
            .get(&ctx.0)
            .copied()
            .unwrap_or(ContextState::Closed)
    }

    pub fn set_context_state(&mut self, ctx: ContextId, state: ContextState) -> bool {
        match self.contexts.get_mut(&ctx.0) {
            Some(s) => {
                *s = state;
                true
            }
            None => false,
        }
    }

    /// Contexts not yet closed
    pub fn open_context_count(&self) -> usize {
        self.contexts
            .values()
            .filter(|s| **s != ContextState::Closed)
            .count()
    }

    /// Idempotent; nodes of the context stay in the tables so late
    /// operations against them can be observed rather than masked
    pub fn close_context(&mut self, ctx: ContextId) -> bool {
        match self.contexts.get_mut(&ctx.0) {
            Some(s) if *s != ContextState::Closed => {
                *s = ContextState::Closed;
                true
            }
            _ => false,
        }
    }

    // ───────────────────────────────────────────────────────────
    // Node creation
    // ───────────────────────────────────────────────────────────

    pub fn create_oscillator(&mut self, ctx: ContextId) -> Result<OscillatorId, SynthesisError> {
        self.require_open(ctx, "oscillator")?;
        let id = self.next_id();
        self.oscillators.insert(
            id,
            OscNode {
                ctx,
                frequency: 440.0,
                started: false,
                stopped: false,
                target: None,
            },
        );
        Ok(OscillatorId(id))
    }

    pub fn create_gain(&mut self, ctx: ContextId) -> Result<GainId, SynthesisError> {
        self.require_open(ctx, "gain")?;
        let id = self.next_id();
        self.gains.insert(
            id,
            GainNode {
                ctx,
                value: 1.0,
                target: None,
            },
        );
        Ok(GainId(id))
    }

    pub fn create_merger(
        &mut self,
        ctx: ContextId,
        channels: u16,
    ) -> Result<MergerId, SynthesisError> {
        self.require_open(ctx, "channel merger")?;
        let id = self.next_id();
        self.mergers.insert(
            id,
            MergerNode {
                ctx,
                channels,
                target: None,
            },
        );
        Ok(MergerId(id))
    }

    // ───────────────────────────────────────────────────────────
    // Wiring and control (false = unknown id, caller logs)
    // ───────────────────────────────────────────────────────────

    pub fn set_frequency(&mut self, osc: OscillatorId, hz: f64) -> bool {
        match self.oscillators.get_mut(&osc.0) {
            Some(node) => {
                node.frequency = hz;
                true
            }
            None => false,
        }
    }

    pub fn set_gain(&mut self, gain: GainId, value: f32) -> bool {
        match self.gains.get_mut(&gain.0) {
            Some(node) => {
                node.value = value;
                true
            }
            None => false,
        }
    }

    pub fn connect_oscillator(&mut self, osc: OscillatorId, gain: GainId) -> bool {
        if !self.gains.contains_key(&gain.0) {
            return false;
        }
        match self.oscillators.get_mut(&osc.0) {
            Some(node) => {
                node.target = Some(gain);
                true
            }
            None => false,
        }
    }

    pub fn connect_gain_to_merger(&mut self, gain: GainId, merger: MergerId, channel: u16) -> bool {
        if !self.mergers.contains_key(&merger.0) {
            return false;
        }
        match self.gains.get_mut(&gain.0) {
            Some(node) => {
                node.target = Some(GainTarget::Merger(merger, channel));
                true
            }
            None => false,
        }
    }

    pub fn connect_merger(&mut self, merger: MergerId, gain: GainId) -> bool {
        if !self.gains.contains_key(&gain.0) {
            return false;
        }
        match self.mergers.get_mut(&merger.0) {
            Some(node) => {
                node.target = Some(gain);
                true
            }
            None => false,
        }
    }

    pub fn connect_to_destination(&mut self, gain: GainId) -> bool {
        match self.gains.get_mut(&gain.0) {
            Some(node) => {
                node.target = Some(GainTarget::Destination);
                true
            }
            None => false,
        }
    }

    pub fn start_oscillator(&mut self, osc: OscillatorId) -> bool {
        match self.oscillators.get_mut(&osc.0) {
            Some(node) if !node.stopped => {
                node.started = true;
                true
            }
            _ => false,
        }
    }

    pub fn stop_oscillator(&mut self, osc: OscillatorId) -> bool {
        match self.oscillators.get_mut(&osc.0) {
            Some(node) => {
                node.stopped = true;
                true
            }
            None => false,
        }
    }

    pub fn disconnect_oscillator(&mut self, osc: OscillatorId) -> bool {
        match self.oscillators.get_mut(&osc.0) {
            Some(node) => {
                node.target = None;
                true
            }
            None => false,
        }
    }

    pub fn disconnect_gain(&mut self, gain: GainId) -> bool {
        match self.gains.get_mut(&gain.0) {
            Some(node) => {
                node.target = None;
                true
            }
            None => false,
        }
    }

    pub fn disconnect_merger(&mut self, merger: MergerId) -> bool {
        match self.mergers.get_mut(&merger.0) {
            Some(node) => {
                node.target = None;
                true
            }
            None => false,
        }
    }

    // ───────────────────────────────────────────────────────────
    // Loop players
    // ───────────────────────────────────────────────────────────

    pub fn create_loop(&mut self, source: &str) -> LoopId {
        let id = self.next_id();
        self.loops.insert(
            id,
            LoopNode {
                source: source.to_string(),
                volume: 1.0,
                playing: false,
                position: 0.0,
            },
        );
        LoopId(id)
    }

    /// Swapping the source drops back to paused at position zero, like a
    /// media element reloading
    pub fn set_loop_source(&mut self, lp: LoopId, source: &str) -> bool {
        match self.loops.get_mut(&lp.0) {
            Some(node) => {
                node.source = source.to_string();
                node.position = 0.0;
                node.playing = false;
                true
            }
            None => false,
        }
    }

    pub fn set_loop_volume(&mut self, lp: LoopId, value: f32) -> bool {
        match self.loops.get_mut(&lp.0) {
            Some(node) => {
                node.volume = value;
                true
            }
            None => false,
        }
    }

    pub fn play_loop(&mut self, lp: LoopId) -> bool {
        match self.loops.get_mut(&lp.0) {
            Some(node) => {
                node.playing = true;
                true
            }
            None => false,
        }
    }

    pub fn pause_loop(&mut self, lp: LoopId) -> bool {
        match self.loops.get_mut(&lp.0) {
            Some(node) => {
                node.playing = false;
                true
            }
            None => false,
        }
    }

    // ───────────────────────────────────────────────────────────
    // Introspection
    // ───────────────────────────────────────────────────────────

    pub fn oscillator(&self, osc: OscillatorId) -> Option<&OscNode> {
        self.oscillators.get(&osc.0)
    }

    pub fn gain(&self, gain: GainId) -> Option<&GainNode> {
        self.gains.get(&gain.0)
    }

    pub fn merger(&self, merger: MergerId) -> Option<&MergerNode> {
        self.mergers.get(&merger.0)
    }

    pub fn loop_node(&self, lp: LoopId) -> Option<&LoopNode> {
        self.loops.get(&lp.0)
    }

    pub fn loop_node_mut(&mut self, lp: LoopId) -> Option<&mut LoopNode> {
        self.loops.get_mut(&lp.0)
    }

    pub fn oscillators(&self) -> impl Iterator<Item = (OscillatorId, &OscNode)> {
        self.oscillators.iter().map(|(id, n)| (OscillatorId(*id), n))
    }

    pub fn loops(&self) -> impl Iterator<Item = (LoopId, &LoopNode)> {
        self.loops.iter().map(|(id, n)| (LoopId(*id), n))
    }

    pub fn loop_count(&self) -> usize {
        self.loops.len()
    }

    /// Oscillators that are started and not yet stopped
    pub fn live_oscillator_count(&self) -> usize {
        self.oscillators
            .values()
            .filter(|n| n.started && !n.stopped)
            .count()
    }

    /// Resolve every audible oscillator chain
    ///
    /// Walks oscillator → gain → (merger → master gain →) destination and
    /// drops any chain that does not reach the destination. Suspended and
    /// closed contexts resolve to nothing.
    pub fn resolved_chains(&self) -> Vec<ResolvedChain> {
        let mut chains = Vec::new();

        for (id, osc) in self.oscillators() {
            if !osc.started || osc.stopped {
                continue;
            }
            if self.context_state(osc.ctx) != ContextState::Running {
                continue;
            }
            let Some(gain) = osc.target.and_then(|g| self.gains.get(&g.0)) else {
                continue;
            };

            match gain.target {
                Some(GainTarget::Destination) => chains.push(ResolvedChain {
                    oscillator: id,
                    frequency: osc.frequency,
                    amplitude: gain.value,
                    channel: None,
                }),
                Some(GainTarget::Merger(merger_id, channel)) => {
                    let Some(merger) = self.mergers.get(&merger_id.0) else {
                        continue;
                    };
                    let Some(master) = merger.target.and_then(|g| self.gains.get(&g.0)) else {
                        continue;
                    };
                    if master.target != Some(GainTarget::Destination) {
                        continue;
                    }
                    chains.push(ResolvedChain {
                        oscillator: id,
                        frequency: osc.frequency,
                        amplitude: gain.value * master.value,
                        channel: Some(channel),
                    });
                }
                None => {}
            }
        }

        chains.sort_by_key(|c| c.oscillator.0);
        chains
    }
}
