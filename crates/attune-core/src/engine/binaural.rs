//! Binaural oscillator pair
//!
//! Two sine oscillators a few hertz apart, one per ear:
//!
//! ```text
//! left osc (200 Hz)          ──► left gain  ──► merger ch 0 ─┐
//! right osc (200 Hz + beat)  ──► right gain ──► merger ch 1 ─┴─► master
//! ```
//!
//! The perceived beat is the difference between the ears, so the carrier
//! stays fixed and only the right oscillator moves. Retuning replaces the
//! whole pair: oscillators are one-shot sources, so the old pair is torn
//! down completely before the next one is built. At most one pair exists
//! at any moment.

use crate::audio::{AudioBackend, ContextId, GainId, MergerId, OscillatorId, SynthesisError};

/// Carrier for the left ear; the right ear rides `beat_hz` above it
pub const BASE_FREQUENCY_HZ: f64 = 200.0;

struct OscillatorPair {
    left: OscillatorId,
    right: OscillatorId,
    left_gain: GainId,
    right_gain: GainId,
    merger: MergerId,
}

/// Nodes created so far during a build, unwound on failure
#[derive(Default)]
struct PartialPair {
    left: Option<OscillatorId>,
    right: Option<OscillatorId>,
    left_gain: Option<GainId>,
    right_gain: Option<GainId>,
    merger: Option<MergerId>,
}

impl PartialPair {
    /// Unhook everything so no half-built node stays wired
    fn unwind<B: AudioBackend>(self, backend: &mut B) {
        for osc in [self.left, self.right].into_iter().flatten() {
            backend.disconnect_oscillator(osc);
        }
        for gain in [self.left_gain, self.right_gain].into_iter().flatten() {
            backend.disconnect_gain(gain);
        }
        if let Some(merger) = self.merger {
            backend.disconnect_merger(merger);
        }
    }
}

#[derive(Default)]
pub struct BinauralSynth {
    pair: Option<OscillatorPair>,
}

impl BinauralSynth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.pair.is_some()
    }

    /// The frequencies a pair tuned to `beat_hz` plays
    pub fn tuned_frequencies(beat_hz: f64) -> (f64, f64) {
        (BASE_FREQUENCY_HZ, BASE_FREQUENCY_HZ + beat_hz)
    }

    /// Build a pair tuned to `beat_hz`, replacing any existing one
    ///
    /// Teardown happens first, so a failure partway through leaves no
    /// pair at all rather than two.
    pub fn activate<B: AudioBackend>(
        &mut self,
        backend: &mut B,
        ctx: ContextId,
        master: GainId,
        beat_hz: f64,
    ) -> Result<(), SynthesisError> {
        self.deactivate(backend);

        let mut partial = PartialPair::default();
        match Self::build(backend, ctx, master, beat_hz, &mut partial) {
            Ok(pair) => {
                log::debug!(
                    "Binaural pair active: {:.2} Hz / {:.2} Hz",
                    BASE_FREQUENCY_HZ,
                    BASE_FREQUENCY_HZ + beat_hz
                );
                self.pair = Some(pair);
                Ok(())
            }
            Err(e) => {
                partial.unwind(backend);
                Err(e)
            }
        }
    }

    fn build<B: AudioBackend>(
        backend: &mut B,
        ctx: ContextId,
        master: GainId,
        beat_hz: f64,
        partial: &mut PartialPair,
    ) -> Result<OscillatorPair, SynthesisError> {
        let left = backend.create_oscillator(ctx)?;
        partial.left = Some(left);
        let right = backend.create_oscillator(ctx)?;
        partial.right = Some(right);
        let left_gain = backend.create_gain(ctx)?;
        partial.left_gain = Some(left_gain);
        let right_gain = backend.create_gain(ctx)?;
        partial.right_gain = Some(right_gain);
        let merger = backend.create_merger(ctx, 2)?;
        partial.merger = Some(merger);

        backend.set_oscillator_frequency(left, BASE_FREQUENCY_HZ);
        backend.set_oscillator_frequency(right, BASE_FREQUENCY_HZ + beat_hz);

        // Channel gains stay at the backend default; the master stage
        // carries the user's volume
        backend.connect_oscillator(left, left_gain);
        backend.connect_oscillator(right, right_gain);
        backend.connect_gain_to_merger(left_gain, merger, 0);
        backend.connect_gain_to_merger(right_gain, merger, 1);
        backend.connect_merger(merger, master);

        backend.start_oscillator(left);
        backend.start_oscillator(right);

        Ok(OscillatorPair {
            left,
            right,
            left_gain,
            right_gain,
            merger,
        })
    }

    /// Stop and unhook the pair; safe to call with none active
    pub fn deactivate<B: AudioBackend>(&mut self, backend: &mut B) {
        let Some(pair) = self.pair.take() else {
            return;
        };
        backend.stop_oscillator(pair.left);
        backend.stop_oscillator(pair.right);
        backend.disconnect_oscillator(pair.left);
        backend.disconnect_oscillator(pair.right);
        backend.disconnect_gain(pair.left_gain);
        backend.disconnect_gain(pair.right_gain);
        backend.disconnect_merger(pair.merger);
        log::debug!("Binaural pair torn down");
    }
}
