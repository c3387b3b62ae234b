//! Offline render backend
//!
//! The real output path for headless use: implements the backend port over
//! the in-memory graph and synthesizes the result into a [`StereoBuffer`]
//! at the session rate. Oscillators render as sine waves through their gain
//! chains; ambient loops decode once per source ref and resample by
//! stepping the playback position at the source/output rate ratio.
//!
//! Contexts never start suspended here. There is no autoplay policy to
//! satisfy offline, so resume requests settle immediately.

use std::collections::HashMap;
use std::f64::consts::TAU;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;

use super::backend::{
    AudioBackend, ContextId, ContextState, GainId, LoopId, MergerId, OscillatorId, ResumeWait,
};
use super::decode::{decode_loop_source, DecodedLoop};
use super::error::{ContextCreationError, PlaybackError, ResumeError, SynthesisError};
use super::graph::GraphState;
use crate::types::{Sample, StereoBuffer, StereoSample, SAMPLE_RATE};

/// Offline synthesis backend
pub struct RenderBackend {
    graph: GraphState,
    sounds_dir: PathBuf,
    sample_rate: u32,
    decoded: HashMap<String, DecodedLoop>,
    /// Oscillator phases persist across render calls so consecutive
    /// renders stay continuous
    phases: HashMap<u64, f64>,
}

impl RenderBackend {
    pub fn new(sounds_dir: impl Into<PathBuf>) -> Self {
        Self {
            graph: GraphState::new(),
            sounds_dir: sounds_dir.into(),
            sample_rate: SAMPLE_RATE,
            decoded: HashMap::new(),
            phases: HashMap::new(),
        }
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn sounds_dir(&self) -> &Path {
        &self.sounds_dir
    }

    /// Synthesize the next `duration` of the current graph
    pub fn render(&mut self, duration: Duration) -> StereoBuffer {
        let frames = (duration.as_secs_f64() * self.sample_rate as f64).round() as usize;
        let mut out = StereoBuffer::silence(frames);

        for chain in self.graph.resolved_chains() {
            let mut phase = self.phases.get(&chain.oscillator.0).copied().unwrap_or(0.0);
            let step = TAU * chain.frequency / self.sample_rate as f64;

            for i in 0..frames {
                let v = phase.sin() as Sample * chain.amplitude;
                match chain.channel {
                    Some(0) => out[i].left += v,
                    Some(_) => out[i].right += v,
                    None => out[i] += StereoSample::mono(v),
                }
                phase = (phase + step) % TAU;
            }

            self.phases.insert(chain.oscillator.0, phase);
        }

        self.render_loops(&mut out, frames);
        out
    }

    /// Render and write a float WAV, the whole session in one file
    pub fn render_to_wav(&mut self, duration: Duration, path: &Path) -> anyhow::Result<()> {
        let buffer = self.render(duration);

        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: self.sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };

        let mut writer = hound::WavWriter::create(path, spec)
            .with_context(|| format!("Failed to create WAV file: {}", path.display()))?;

        for frame in buffer.iter() {
            writer.write_sample(frame.left)?;
            writer.write_sample(frame.right)?;
        }

        writer
            .finalize()
            .with_context(|| format!("Failed to finalize WAV file: {}", path.display()))?;

        log::info!(
            "Rendered {:.1}s to {}",
            duration.as_secs_f64(),
            path.display()
        );
        Ok(())
    }

    /// Mix every playing loop into the output, advancing positions
    fn render_loops(&mut self, out: &mut StereoBuffer, frames: usize) {
        let playing: Vec<(LoopId, String, f32, f64)> = self
            .graph
            .loops()
            .filter(|(_, n)| n.playing)
            .map(|(id, n)| (id, n.source.clone(), n.volume, n.position))
            .collect();

        for (lp, source, volume, start_pos) in playing {
            let Some(decoded) = self.decoded.get(&source) else {
                // Playing but never decoded means play_loop was bypassed;
                // render silence rather than guess
                log::warn!("Loop {:?} playing without decoded source {source}", lp);
                continue;
            };

            let len = decoded.buffer.len() as f64;
            let step = decoded.sample_rate as f64 / self.sample_rate as f64;
            let mut pos = start_pos;

            for i in 0..frames {
                let i0 = (pos.floor() as usize) % decoded.buffer.len();
                let i1 = (i0 + 1) % decoded.buffer.len();
                let frac = pos.fract() as f32;

                let a = decoded.buffer[i0];
                let b = decoded.buffer[i1];
                let sample = StereoSample::new(
                    a.left + (b.left - a.left) * frac,
                    a.right + (b.right - a.right) * frac,
                );
                out[i] += sample * volume;

                pos = (pos + step) % len;
            }

            if let Some(node) = self.graph.loop_node_mut(lp) {
                node.position = pos;
            }
        }
    }

    /// Decode the source if this is its first use
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
        self.decoded.insert(source.to_string(), decoded);
        Ok(())
    }
}

impl AudioBackend for RenderBackend {
    fn create_context(&mut self) -> Result<ContextId, ContextCreationError> {
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
                ResumeWait::ready(Ok(()))
            }
            ContextState::Closed | ContextState::Uninitialized => {
                ResumeWait::ready(Err(ResumeError::ContextClosed))
            }
        }
    }

    fn close_context(&mut self, ctx: ContextId) {
        self.graph.close_context(ctx);
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
            log::warn!("render: set_oscillator_frequency on unknown id {:?}", osc);
        }
    }

    fn set_gain(&mut self, gain: GainId, value: f32) {
        if !self.graph.set_gain(gain, value) {
            log::warn!("render: set_gain on unknown id {:?}", gain);
        }
    }

    fn connect_oscillator(&mut self, osc: OscillatorId, gain: GainId) {
        if !self.graph.connect_oscillator(osc, gain) {
            log::warn!("render: connect_oscillator with unknown id {:?}", osc);
        }
    }

    fn connect_gain_to_merger(&mut self, gain: GainId, merger: MergerId, channel: u16) {
        if !self.graph.connect_gain_to_merger(gain, merger, channel) {
            log::warn!("render: connect_gain_to_merger with unknown id {:?}", gain);
        }
    }

    fn connect_merger(&mut self, merger: MergerId, gain: GainId) {
        if !self.graph.connect_merger(merger, gain) {
            log::warn!("render: connect_merger with unknown id {:?}", merger);
        }
    }

    fn connect_to_destination(&mut self, gain: GainId) {
        if !self.graph.connect_to_destination(gain) {
            log::warn!("render: connect_to_destination with unknown id {:?}", gain);
        }
    }

    fn start_oscillator(&mut self, osc: OscillatorId) {
        if !self.graph.start_oscillator(osc) {
            log::warn!("render: start_oscillator on unknown or stopped id {:?}", osc);
        }
    }

    fn stop_oscillator(&mut self, osc: OscillatorId) {
        if !self.graph.stop_oscillator(osc) {
            log::warn!("render: stop_oscillator on unknown id {:?}", osc);
        }
        self.phases.remove(&osc.0);
    }

    fn disconnect_oscillator(&mut self, osc: OscillatorId) {
        self.graph.disconnect_oscillator(osc);
    }

    fn disconnect_gain(&mut self, gain: GainId) {
        self.graph.disconnect_gain(gain);
    }

    fn disconnect_merger(&mut self, merger: MergerId) {
        self.graph.disconnect_merger(merger);
    }

    fn create_loop(&mut self, source_ref: &str) -> LoopId {
        self.graph.create_loop(source_ref)
    }

    fn set_loop_source(&mut self, lp: LoopId, source_ref: &str) {
        if !self.graph.set_loop_source(lp, source_ref) {
            log::warn!("render: set_loop_source on unknown id {:?}", lp);
        }
    }

    fn set_loop_volume(&mut self, lp: LoopId, value: f32) {
        if !self.graph.set_loop_volume(lp, value) {
            log::warn!("render: set_loop_volume on unknown id {:?}", lp);
        }
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
        Ok(())
    }

    fn pause_loop(&mut self, lp: LoopId) {
        if !self.graph.pause_loop(lp) {
            log::warn!("render: pause_loop on unknown id {:?}", lp);
        }
    }
}
