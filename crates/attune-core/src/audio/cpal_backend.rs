//! Live audio backend (CPAL)
//!
//! Plays the mix through the default output device. The control thread
//! owns the graph tables; every mutation re-resolves the audible chains
//! and pushes a compact render plan to the audio thread over a lock-free
//! SPSC queue, so the callback never touches shared state:
//!
//! ```text
//! ┌──────────────────┐                   ┌─────────────────────┐
//! │  Control thread  │───push(plan)─────►│   Plan Queue        │
//! │  (mixer facade)  │                   │  (lock-free SPSC)   │
//! └──────────────────┘                   └──────────┬──────────┘
//!                                                   │ pop()
//!                                                   ▼
//!                                        ┌─────────────────────┐
//!                                        │  CPAL Audio Thread  │
//!                                        │  (owns LiveState)   │
//!                                        └─────────────────────┘
//! ```
//!
//! The stream exists while a context is open. Closing the last context
//! drops the stream, which stops audio.

use std::collections::HashMap;
use std::f64::consts::TAU;
use std::path::PathBuf;
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};

use super::backend::{
    AudioBackend, ContextId, ContextState, GainId, LoopId, MergerId, OscillatorId, ResumeWait,
};
use super::decode::{decode_loop_source, DecodedLoop};
use super::error::{ContextCreationError, PlaybackError, ResumeError, SynthesisError};
use super::graph::{GraphState, ResolvedChain};
use crate::types::{Sample, SAMPLE_RATE};

/// Plan queue depth; plans are tiny and stale ones are skipped
const PLAN_QUEUE_CAPACITY: usize = 32;

/// One ambient loop as the audio thread sees it
struct LoopVoice {
    id: u64,
    /// None until the control side has decoded the source
    decoded: Option<Arc<DecodedLoop>>,
    volume: f32,
    playing: bool,
}

/// Everything the callback needs to synthesize the current mix
struct LivePlan {
    chains: Vec<ResolvedChain>,
    loops: Vec<LoopVoice>,
}

/// Callback-side DSP state
///
/// Owned exclusively by the audio thread. Phases and loop positions
/// survive plan swaps so updates never click or restart playback.
struct LiveState {
    plan_rx: rtrb::Consumer<LivePlan>,
    chains: Vec<ResolvedChain>,
    chain_phases: Vec<f64>,
    chain_steps: Vec<f64>,
    loops: Vec<LoopVoice>,
    loop_positions: Vec<f64>,
    /// Phase memory across plan swaps, keyed by oscillator id
    phases: HashMap<u64, f64>,
    /// Position memory across plan swaps: loop id → (source identity, frames)
    positions: HashMap<u64, (usize, f64)>,
    sample_rate: u32,
}

impl LiveState {
    fn new(plan_rx: rtrb::Consumer<LivePlan>, sample_rate: u32) -> Self {
        Self {
            plan_rx,
            chains: Vec::new(),
            chain_phases: Vec::new(),
            chain_steps: Vec::new(),
            loops: Vec::new(),
            loop_positions: Vec::new(),
            phases: HashMap::new(),
            positions: HashMap::new(),
            sample_rate,
        }
    }

    /// Take the newest queued plan, if any
    fn drain_plans(&mut self) {
        let mut newest = None;
        while let Ok(plan) = self.plan_rx.pop() {
            newest = Some(plan);
        }
        if let Some(plan) = newest {
            self.apply_plan(plan);
        }
    }

    fn apply_plan(&mut self, plan: LivePlan) {
        // Save phase memory for the outgoing plan
        for (chain, phase) in self.chains.iter().zip(&self.chain_phases) {
            self.phases.insert(chain.oscillator.0, *phase);
        }
        for (voice, pos) in self.loops.iter().zip(&self.loop_positions) {
            if let Some(decoded) = &voice.decoded {
                self.positions
                    .insert(voice.id, (Arc::as_ptr(decoded) as usize, *pos));
            }
        }

        self.chain_phases = plan
            .chains
            .iter()
            .map(|c| self.phases.get(&c.oscillator.0).copied().unwrap_or(0.0))
            .collect();
        self.chain_steps = plan
            .chains
            .iter()
            .map(|c| TAU * c.frequency / self.sample_rate as f64)
            .collect();
        // A swapped source starts over from the beginning
        self.loop_positions = plan
            .loops
            .iter()
            .map(|v| match (&v.decoded, self.positions.get(&v.id)) {
                (Some(decoded), Some((ptr, pos))) if *ptr == Arc::as_ptr(decoded) as usize => *pos,
                _ => 0.0,
            })
            .collect();

        self.chains = plan.chains;
        self.loops = plan.loops;
    }

    /// Fill one device buffer of interleaved output
    fn fill(&mut self, data: &mut [Sample], channels: usize) {
        self.drain_plans();

        for frame in data.chunks_mut(channels) {
            let mut left = 0.0f32;
            let mut right = 0.0f32;

            for (idx, chain) in self.chains.iter().enumerate() {
                let v = self.chain_phases[idx].sin() as Sample * chain.amplitude;
                match chain.channel {
                    Some(0) => left += v,
                    Some(_) => right += v,
                    None => {
                        left += v;
                        right += v;
                    }
                }
                self.chain_phases[idx] = (self.chain_phases[idx] + self.chain_steps[idx]) % TAU;
            }

            for (idx, voice) in self.loops.iter().enumerate() {
                if !voice.playing {
                    continue;
                }
                let Some(decoded) = &voice.decoded else {
                    continue;
                };
                let len = decoded.buffer.len();
                let pos = self.loop_positions[idx];
                let i0 = (pos.floor() as usize) % len;
                let i1 = (i0 + 1) % len;
                let frac = pos.fract() as f32;

                let a = decoded.buffer[i0];
                let b = decoded.buffer[i1];
                left += (a.left + (b.left - a.left) * frac) * voice.volume;
                right += (a.right + (b.right - a.right) * frac) * voice.volume;

                let step = decoded.sample_rate as f64 / self.sample_rate as f64;
                self.loop_positions[idx] = (pos + step) % len as f64;
            }

            frame[0] = left;
            if channels > 1 {
                frame[1] = right;
            }
            for ch in frame.iter_mut().skip(2) {
                *ch = 0.0;
            }
        }
    }
}

/// Live playback backend over the default output device
pub struct CpalBackend {
    graph: GraphState,
    sounds_dir: PathBuf,
    sample_rate: u32,
    decoded: HashMap<String, Arc<DecodedLoop>>,
    /// Keeps the stream alive; dropping it stops audio
    stream: Option<Stream>,
    plan_tx: Option<rtrb::Producer<LivePlan>>,
}

impl CpalBackend {
    pub fn new(sounds_dir: impl Into<PathBuf>) -> Self {
        Self {
            graph: GraphState::new(),
            sounds_dir: sounds_dir.into(),
            sample_rate: SAMPLE_RATE,
            decoded: HashMap::new(),
            stream: None,
            plan_tx: None,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Open the device stream on first use
    fn ensure_stream(&mut self) -> Result<(), ContextCreationError> {
        if self.stream.is_some() {
            return Ok(());
        }

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| ContextCreationError::Denied("no output device available".into()))?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        log::info!("Using audio device: {}", device_name);

        let supported_configs: Vec<_> = device
            .supported_output_configs()
            .map_err(|e| ContextCreationError::Denied(e.to_string()))?
            .collect();

        // Prefer f32 stereo at the session rate, then anything stereo
        let best = supported_configs
            .iter()
            .filter(|c| c.sample_format() == SampleFormat::F32)
            .filter(|c| c.channels() >= 2)
            .find(|c| {
                SAMPLE_RATE >= c.min_sample_rate().0 && SAMPLE_RATE <= c.max_sample_rate().0
            })
            .or_else(|| supported_configs.iter().find(|c| c.channels() >= 2))
            .or_else(|| supported_configs.first())
            .ok_or_else(|| {
                ContextCreationError::Denied("no suitable output configuration".into())
            })?;

        let sample_rate = if SAMPLE_RATE >= best.min_sample_rate().0
            && SAMPLE_RATE <= best.max_sample_rate().0
        {
            cpal::SampleRate(SAMPLE_RATE)
        } else {
            let fallback = best.max_sample_rate();
            log::warn!(
                "Audio device doesn't support {}Hz, falling back to {}Hz",
                SAMPLE_RATE,
                fallback.0
            );
            fallback
        };

        let stream_config = StreamConfig {
            channels: best.channels(),
            sample_rate,
            buffer_size: cpal::BufferSize::Default,
        };
        let channels = stream_config.channels as usize;

        log::info!(
            "Audio config: {} channels, {}Hz",
            stream_config.channels,
            sample_rate.0
        );

        let (plan_tx, plan_rx) = rtrb::RingBuffer::<LivePlan>::new(PLAN_QUEUE_CAPACITY);
        let mut state = LiveState::new(plan_rx, sample_rate.0);

        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                    state.fill(data, channels);
                },
                move |err| {
                    log::error!("Audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| ContextCreationError::Denied(e.to_string()))?;

        stream
            .play()
            .map_err(|e| ContextCreationError::Denied(e.to_string()))?;

        log::info!("Audio stream started");
        self.sample_rate = sample_rate.0;
        self.stream = Some(stream);
        self.plan_tx = Some(plan_tx);
        Ok(())
    }

    /// Re-resolve the graph and hand the audio thread a fresh plan
    fn push_plan(&mut self) {
        let Some(tx) = self.plan_tx.as_mut() else {
            return;
        };
        let plan = LivePlan {
            chains: self.graph.resolved_chains(),
            loops: self
                .graph
                .loops()
                .map(|(id, n)| LoopVoice {
                    id: id.0,
                    decoded: self.decoded.get(&n.source).cloned(),
                    volume: n.volume,
                    playing: n.playing,
                })
                .collect(),
        };
        if tx.push(plan).is_err() {
            // Queue full: the callback will catch up from a later plan
            log::debug!("Plan queue full, dropping update");
        }
    }

    fn ensure_decoded(&mut self, source: &str) -> Result<(), PlaybackError> {
        if self.decoded.contains_key(source) {
            return Ok(());
        }
        let path = self.sounds_dir.join(source);
        let decoded = decode_loop_source(&path)?;
        log::debug!(
            "Decoded {source}: {:.1}s at {} Hz",
            decoded.duration_secs(),
            decoded.sample_rate
        );
        self.decoded.insert(source.to_string(), Arc::new(decoded));
        Ok(())
    }
}

impl AudioBackend for CpalBackend {
    fn create_context(&mut self) -> Result<ContextId, ContextCreationError> {
        self.ensure_stream()?;
        Ok(self.graph.create_context(ContextState::Running))
    }

    fn context_state(&self, ctx: ContextId) -> ContextState {
        self.graph.context_state(ctx)
    }

    fn resume_context(&mut self, ctx: ContextId) -> ResumeWait {
        match self.graph.context_state(ctx) {
            ContextState::Running => ResumeWait::ready(Ok(())),
            ContextState::Suspended => {
                self.graph.set_context_state(ctx, ContextState::Running);
                self.push_plan();
                ResumeWait::ready(Ok(()))
            }
            ContextState::Closed | ContextState::Uninitialized => {
                ResumeWait::ready(Err(ResumeError::ContextClosed))
            }
        }
    }

    fn close_context(&mut self, ctx: ContextId) {
        if !self.graph.close_context(ctx) {
            return;
        }
        self.push_plan();
        if self.graph.open_context_count() == 0 {
            log::info!("Last context closed, stopping audio stream");
            self.plan_tx = None;
            self.stream = None;
        }
    }

    fn create_oscillator(&mut self, ctx: ContextId) -> Result<OscillatorId, SynthesisError> {
        self.graph.create_oscillator(ctx)
    }

    fn create_gain(&mut self, ctx: ContextId) -> Result<GainId, SynthesisError> {
        self.graph.create_gain(ctx)
    }

    fn create_merger(&mut self, ctx: ContextId, channels: u16) -> Result<MergerId, SynthesisError> {
        self.graph.create_merger(ctx, channels)
    }

    fn set_oscillator_frequency(&mut self, osc: OscillatorId, hz: f64) {
        if !self.graph.set_frequency(osc, hz) {
            log::warn!("live: set_oscillator_frequency on unknown id {:?}", osc);
        }
        self.push_plan();
    }

    fn set_gain(&mut self, gain: GainId, value: f32) {
        if !self.graph.set_gain(gain, value) {
            log::warn!("live: set_gain on unknown id {:?}", gain);
        }
        self.push_plan();
    }

    fn connect_oscillator(&mut self, osc: OscillatorId, gain: GainId) {
        if !self.graph.connect_oscillator(osc, gain) {
            log::warn!("live: connect_oscillator with unknown id {:?}", osc);
        }
        self.push_plan();
    }

    fn connect_gain_to_merger(&mut self, gain: GainId, merger: MergerId, channel: u16) {
        if !self.graph.connect_gain_to_merger(gain, merger, channel) {
            log::warn!("live: connect_gain_to_merger with unknown id {:?}", gain);
        }
        self.push_plan();
    }

    fn connect_merger(&mut self, merger: MergerId, gain: GainId) {
        if !self.graph.connect_merger(merger, gain) {
            log::warn!("live: connect_merger with unknown id {:?}", merger);
        }
        self.push_plan();
    }

    fn connect_to_destination(&mut self, gain: GainId) {
        if !self.graph.connect_to_destination(gain) {
            log::warn!("live: connect_to_destination with unknown id {:?}", gain);
        }
        self.push_plan();
    }

    fn start_oscillator(&mut self, osc: OscillatorId) {
        if !self.graph.start_oscillator(osc) {
            log::warn!("live: start_oscillator on unknown or stopped id {:?}", osc);
        }
        self.push_plan();
    }

    fn stop_oscillator(&mut self, osc: OscillatorId) {
        if !self.graph.stop_oscillator(osc) {
            log::warn!("live: stop_oscillator on unknown id {:?}", osc);
        }
        self.push_plan();
    }

    fn disconnect_oscillator(&mut self, osc: OscillatorId) {
        self.graph.disconnect_oscillator(osc);
        self.push_plan();
    }

    fn disconnect_gain(&mut self, gain: GainId) {
        self.graph.disconnect_gain(gain);
        self.push_plan();
    }

    fn disconnect_merger(&mut self, merger: MergerId) {
        self.graph.disconnect_merger(merger);
        self.push_plan();
    }

    fn create_loop(&mut self, source_ref: &str) -> LoopId {
        let lp = self.graph.create_loop(source_ref);
        self.push_plan();
        lp
    }

    fn set_loop_source(&mut self, lp: LoopId, source_ref: &str) {
        if !self.graph.set_loop_source(lp, source_ref) {
            log::warn!("live: set_loop_source on unknown id {:?}", lp);
        }
        self.push_plan();
    }

    fn set_loop_volume(&mut self, lp: LoopId, value: f32) {
        if !self.graph.set_loop_volume(lp, value) {
            log::warn!("live: set_loop_volume on unknown id {:?}", lp);
        }
        self.push_plan();
    }

    fn play_loop(&mut self, lp: LoopId) -> Result<(), PlaybackError> {
        let source = match self.graph.loop_node(lp) {
            Some(node) => node.source.clone(),
            None => {
                return Err(PlaybackError::StartRefused(format!(
                    "unknown loop player {:?}",
                    lp
                )))
            }
        };
        self.ensure_decoded(&source)?;
        self.graph.play_loop(lp);
        self.push_plan();
        Ok(())
    }

    fn pause_loop(&mut self, lp: LoopId) {
        if !self.graph.pause_loop(lp) {
            log::warn!("live: pause_loop on unknown id {:?}", lp);
        }
        self.push_plan();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{StereoBuffer, StereoSample};

    fn plan_with_chain(frequency: f64, amplitude: f32, channel: Option<u16>) -> LivePlan {
        LivePlan {
            chains: vec![ResolvedChain {
                oscillator: OscillatorId(1),
                frequency,
                amplitude,
                channel,
            }],
            loops: Vec::new(),
        }
    }

    fn state_with_plan(plan: LivePlan) -> (LiveState, rtrb::Producer<LivePlan>) {
        let (mut tx, rx) = rtrb::RingBuffer::new(4);
        tx.push(plan).unwrap();
        (LiveState::new(rx, 48000), tx)
    }

    #[test]
    fn test_fill_routes_left_channel_only() {
        let (mut state, _tx) = state_with_plan(plan_with_chain(200.0, 0.5, Some(0)));
        let mut data = vec![0.0f32; 512 * 2];
        state.fill(&mut data, 2);

        let left_peak = data
            .chunks(2)
            .map(|f| f[0].abs())
            .fold(0.0f32, f32::max);
        let right_peak = data
            .chunks(2)
            .map(|f| f[1].abs())
            .fold(0.0f32, f32::max);
        assert!(left_peak > 0.3, "left peak: {left_peak}");
        assert_eq!(right_peak, 0.0);
    }

    #[test]
    fn test_phase_continuity_across_plan_swap() {
        let (mut state, _tx) = state_with_plan(plan_with_chain(200.0, 1.0, None));
        let mut data = vec![0.0f32; 64 * 2];
        state.fill(&mut data, 2);
        let last = data[data.len() - 2];

        // A fresh plan for the same oscillator id: the wave must continue,
        // not restart at phase zero
        state.apply_plan(plan_with_chain(200.0, 1.0, None));
        let mut next = vec![0.0f32; 2 * 2];
        state.fill(&mut next, 2);

        let expected_step = (std::f64::consts::TAU * 200.0 / 48000.0).sin() as f32;
        assert!(
            (next[0] - last).abs() < expected_step.abs() + 0.01,
            "discontinuity: {last} -> {}",
            next[0]
        );
    }

    #[test]
    fn test_loop_position_resets_on_source_identity_change() {
        let mut ramp = StereoBuffer::with_capacity(1000);
        for i in 0..1000 {
            ramp.push(StereoSample::mono(i as f32 / 1000.0));
        }
        let first = Arc::new(DecodedLoop {
            buffer: ramp,
            sample_rate: 48000,
        });
        let second = Arc::new(DecodedLoop {
            buffer: StereoBuffer::silence(1000),
            sample_rate: 48000,
        });

        let voice = |decoded: &Arc<DecodedLoop>| LoopVoice {
            id: 7,
            decoded: Some(decoded.clone()),
            volume: 1.0,
            playing: true,
        };

        let (mut state, _tx) = state_with_plan(LivePlan {
            chains: Vec::new(),
            loops: vec![voice(&first)],
        });
        let mut data = vec![0.0f32; 100 * 2];
        state.fill(&mut data, 2);
        assert!(state.loop_positions[0] > 0.0);

        // Same id, same buffer: position carries over
        state.apply_plan(LivePlan {
            chains: Vec::new(),
            loops: vec![voice(&first)],
        });
        assert!(state.loop_positions[0] > 0.0);

        // Same id, different buffer: starts over
        state.apply_plan(LivePlan {
            chains: Vec::new(),
            loops: vec![voice(&second)],
        });
        assert_eq!(state.loop_positions[0], 0.0);
    }

    #[test]
    fn test_fill_takes_newest_queued_plan() {
        let (mut tx, rx) = rtrb::RingBuffer::new(4);
        tx.push(plan_with_chain(200.0, 1.0, Some(0))).unwrap();
        tx.push(plan_with_chain(210.0, 0.0, Some(0))).unwrap();

        let mut state = LiveState::new(rx, 48000);
        let mut data = vec![0.0f32; 128 * 2];
        state.fill(&mut data, 2);

        // The second plan has zero amplitude, so output is silent
        assert!(data.iter().all(|v| *v == 0.0));
    }
}
