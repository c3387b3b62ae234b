//! Mixer facade
//!
//! Single entry point for everything a frontend does: binaural on/off,
//! preset and custom-frequency changes, ambient selection, volumes, and
//! the primary-player status feed. Owns the backend and the three units
//! (context manager, binaural pair, ambient loop) and keeps one logical
//! [`MixerState`] snapshot that is the entire read contract.
//!
//! # Resume handling
//!
//! Turning the beat on may require the platform to resume a suspended
//! context. `toggle_binaural` requests the resume, flags the state
//! optimistically, and returns; the pair is built by [`AudioMixer::settle`]
//! once the platform answers. Every other operation stays synchronous and
//! responsive while that answer is outstanding. A toggle-off in the gap
//! cancels the intent; a late grant builds nothing.

use crossbeam::channel::{unbounded, Receiver, Sender};

use crate::audio::{
    AudioBackend, ContextState, MixerResult, PlaybackError, ResumeWait, SynthesisError,
};
use crate::presets::{AmbientSound, BinauralPreset, PresetCatalog};
use crate::types::PlayerStatus;

use super::ambient::AmbientLoop;
use super::binaural::BinauralSynth;
use super::context::ContextManager;

pub const DEFAULT_BINAURAL_VOLUME: u8 = 30;
pub const DEFAULT_AMBIENT_VOLUME: u8 = 40;

/// Snapshot of everything a frontend renders
#[derive(Debug, Clone, PartialEq)]
pub struct MixerState {
    pub binaural_active: bool,
    pub active_preset: BinauralPreset,
    pub custom_frequency: f64,
    pub binaural_volume: u8,
    pub ambient_volume: u8,
    pub active_ambient: Option<AmbientSound>,
    pub primary_status: PlayerStatus,
}

impl MixerState {
    /// True when the session is producing (or about to produce) sound
    pub fn is_audibly_active(&self) -> bool {
        self.binaural_active
            || self.active_ambient.is_some()
            || self.primary_status == PlayerStatus::Playing
    }
}

/// Pushed to every subscriber
#[derive(Debug, Clone, PartialEq)]
pub enum MixerEvent {
    /// After every successful mutation
    StateChanged(MixerState),
    /// The external session timer ran out
    SessionExpired,
    /// Alongside every rollback; the state events already carry the
    /// reverted snapshot
    Failure(String),
}

/// A resume request in flight, tagged with the intent generation that
/// started it
struct PendingResume {
    wait: ResumeWait,
    epoch: u64,
}

pub struct AudioMixer<B: AudioBackend> {
    backend: B,
    catalog: PresetCatalog,
    context: ContextManager,
    synth: BinauralSynth,
    ambient: AmbientLoop,
    state: MixerState,
    pending: Option<PendingResume>,
    /// Bumped whenever the activation intent changes; stale resume
    /// answers are discarded against it
    epoch: u64,
    subscribers: Vec<Sender<MixerEvent>>,
}

impl<B: AudioBackend> AudioMixer<B> {
    pub fn new(backend: B) -> Self {
        let catalog = PresetCatalog::new();
        let state = MixerState {
            binaural_active: false,
            active_preset: catalog.default_preset().clone(),
            custom_frequency: catalog.custom_frequency(),
            binaural_volume: DEFAULT_BINAURAL_VOLUME,
            ambient_volume: DEFAULT_AMBIENT_VOLUME,
            active_ambient: None,
            primary_status: PlayerStatus::Idle,
        };
        Self {
            backend,
            catalog,
            context: ContextManager::new(DEFAULT_BINAURAL_VOLUME),
            synth: BinauralSynth::new(),
            ambient: AmbientLoop::new(DEFAULT_AMBIENT_VOLUME),
            state,
            pending: None,
            epoch: 0,
            subscribers: Vec::new(),
        }
    }

    // ───────────────────────────────────────────────────────────
    // Binaural
    // ───────────────────────────────────────────────────────────

    /// Flip the beat; returns the new desired state
    ///
    /// Turning on requests a context resume and returns immediately with
    /// the flag set; [`AudioMixer::settle`] builds the pair once the
    /// platform answers. Turning off tears down right away and cancels
    /// any outstanding request.
    pub fn toggle_binaural(&mut self) -> Result<bool, SynthesisError> {
        if self.state.binaural_active {
            self.epoch += 1;
            self.pending = None;
            self.synth.deactivate(&mut self.backend);
            self.state.binaural_active = false;
            self.publish();
            log::info!("Binaural beat off");
            return Ok(false);
        }

        if let Err(e) = self.context.ensure(&mut self.backend) {
            let err = SynthesisError::from(e);
            self.announce_failure(&err);
            return Err(err);
        }

        let wait = self.context.begin_resume(&mut self.backend);
        self.epoch += 1;
        self.pending = Some(PendingResume {
            wait,
            epoch: self.epoch,
        });
        self.state.binaural_active = true;
        self.publish();
        log::info!("Binaural beat requested");
        Ok(true)
    }

    /// Complete an outstanding resume; no-op when none is pending
    ///
    /// On a grant, builds the pair tuned to whatever preset is selected
    /// by now. On a denial or build failure, reverts the flag and
    /// surfaces the error. An answer that arrives after the intent
    /// changed is discarded.
    pub async fn settle(&mut self) -> Result<(), SynthesisError> {
        let Some(PendingResume { wait, epoch }) = self.pending.take() else {
            return Ok(());
        };
        let result = wait.wait().await;

        if epoch != self.epoch || !self.state.binaural_active {
            log::debug!("Resume settled after intent changed; discarding");
            return Ok(());
        }

        if let Err(e) = result {
            let err = SynthesisError::from(e);
            self.state.binaural_active = false;
            self.publish();
            self.announce_failure(&err);
            return Err(err);
        }

        let Some((ctx, master)) = self.context.handles() else {
            self.state.binaural_active = false;
            self.publish();
            return Ok(());
        };

        let beat = self.state.active_preset.frequency;
        if let Err(e) = self.synth.activate(&mut self.backend, ctx, master, beat) {
            self.state.binaural_active = false;
            self.publish();
            self.announce_failure(&e);
            return Err(e);
        }

        log::info!(
            "Binaural beat active: '{}' at {:.2} Hz",
            self.state.active_preset.id,
            beat
        );
        Ok(())
    }

    /// Switch presets; a live pair is retuned in place
    ///
    /// Selecting the custom preset adopts the stored custom frequency
    /// rather than whatever the caller's copy carries.
    pub fn set_preset(&mut self, preset: &BinauralPreset) -> Result<(), SynthesisError> {
        if self.state.active_preset.id == preset.id {
            return Ok(());
        }
        let mut next = preset.clone();
        if next.is_custom() {
            next.frequency = self.state.custom_frequency;
        }
        self.state.active_preset = next;

        let result = self.retune_if_live();
        self.publish();
        if let Err(ref e) = result {
            self.announce_failure(e);
        }
        result
    }

    /// Clamped to the supported beat range; retunes when the custom
    /// preset is selected and a pair is live
    pub fn set_custom_frequency(&mut self, hz: f64) -> Result<(), SynthesisError> {
        let clamped = self.catalog.set_custom_frequency(hz);
        if clamped == self.state.custom_frequency {
            return Ok(());
        }
        self.state.custom_frequency = clamped;

        let result = if self.state.active_preset.is_custom() {
            self.state.active_preset.frequency = clamped;
            self.retune_if_live()
        } else {
            Ok(())
        };
        self.publish();
        if let Err(ref e) = result {
            self.announce_failure(e);
        }
        result
    }

    fn retune_if_live(&mut self) -> Result<(), SynthesisError> {
        if !self.synth.is_active() {
            return Ok(());
        }
        let Some((ctx, master)) = self.context.handles() else {
            return Ok(());
        };
        let beat = self.state.active_preset.frequency;
        match self.synth.activate(&mut self.backend, ctx, master, beat) {
            Ok(()) => {
                log::debug!("Retuned to {:.2} Hz beat", beat);
                Ok(())
            }
            Err(e) => {
                // The old pair is gone and the new one never came up
                self.state.binaural_active = false;
                Err(e)
            }
        }
    }

    // ───────────────────────────────────────────────────────────
    // Volumes
    // ───────────────────────────────────────────────────────────

    /// Master level for the beat; always succeeds, applies immediately
    pub fn set_binaural_volume(&mut self, percent: u8) {
        let percent = percent.min(100);
        self.state.binaural_volume = percent;
        self.context.set_master_gain(&mut self.backend, percent);
        self.publish();
    }

    pub fn set_ambient_volume(&mut self, percent: u8) {
        let percent = percent.min(100);
        self.state.ambient_volume = percent;
        self.ambient.set_volume(&mut self.backend, percent);
        self.publish();
    }

    // ───────────────────────────────────────────────────────────
    // Ambient and primary
    // ───────────────────────────────────────────────────────────

    /// Select (or deselect with `None`) the ambient layer
    ///
    /// On failure the previous selection stands and the user retries
    /// explicitly; nothing is replayed automatically.
    pub fn set_active_ambient(&mut self, sound: Option<&AmbientSound>) -> Result<(), PlaybackError> {
        match self.ambient.select(&mut self.backend, sound) {
            Ok(()) => {
                self.state.active_ambient = sound.cloned();
                self.publish();
                Ok(())
            }
            Err(e) => {
                self.announce_failure(&e);
                Err(e)
            }
        }
    }

    /// Status feed from the external media player; write-only
    pub fn set_primary_status(&mut self, status: PlayerStatus) {
        if self.state.primary_status == status {
            return;
        }
        self.state.primary_status = status;
        self.publish();
    }

    /// Apply a mood suggestion: custom frequency first so a custom
    /// preset lands on the suggested value, then preset, then ambient
    pub fn apply_suggestion(
        &mut self,
        preset: &BinauralPreset,
        ambient: Option<&AmbientSound>,
        custom_hz: Option<f64>,
    ) -> MixerResult<()> {
        if let Some(hz) = custom_hz {
            self.set_custom_frequency(hz)?;
        }
        self.set_preset(preset)?;
        if let Some(sound) = ambient {
            self.set_active_ambient(Some(sound))?;
        }
        Ok(())
    }

    // ───────────────────────────────────────────────────────────
    // Lifecycle
    // ───────────────────────────────────────────────────────────

    /// The external session timer ran out: quiet the mix and tell the
    /// subscribers, leaving the context open for a quick restart
    pub fn on_session_expire(&mut self) {
        log::info!("Session expired, quieting the mix");
        self.epoch += 1;
        self.pending = None;
        self.synth.deactivate(&mut self.backend);
        self.ambient.pause(&mut self.backend);

        let changed = self.state.binaural_active || self.state.active_ambient.is_some();
        self.state.binaural_active = false;
        self.state.active_ambient = None;
        if changed {
            self.publish();
        }
        self.announce(MixerEvent::SessionExpired);
    }

    /// Full teardown: oscillators, then the ambient handle, then the
    /// context. Idempotent; also runs on drop. A later toggle starts
    /// over with a fresh context.
    pub fn shutdown(&mut self) {
        self.epoch += 1;
        self.pending = None;
        self.synth.deactivate(&mut self.backend);
        self.ambient.pause(&mut self.backend);
        self.context.close(&mut self.backend);

        let changed = self.state.binaural_active || self.state.active_ambient.is_some();
        self.state.binaural_active = false;
        self.state.active_ambient = None;
        if changed {
            self.publish();
        }
        log::debug!("Mixer shut down");
    }

    // ───────────────────────────────────────────────────────────
    // Reads and plumbing
    // ───────────────────────────────────────────────────────────

    pub fn state(&self) -> MixerState {
        self.state.clone()
    }

    pub fn catalog(&self) -> &PresetCatalog {
        &self.catalog
    }

    pub fn context_state(&self) -> ContextState {
        self.context.state(&self.backend)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Register an observer; events arrive on the returned channel
    pub fn subscribe(&mut self) -> Receiver<MixerEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.push(tx);
        rx
    }

    fn publish(&mut self) {
        let event = MixerEvent::StateChanged(self.state.clone());
        self.announce(event);
    }

    fn announce(&mut self, event: MixerEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn announce_failure(&mut self, err: &dyn std::fmt::Display) {
        log::error!("Mixer operation failed: {err}");
        self.announce(MixerEvent::Failure(err.to_string()));
    }
}

impl<B: AudioBackend> Drop for AudioMixer<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{GraphOp, ResumeMode, SimBackend};

    fn mixer() -> AudioMixer<SimBackend> {
        AudioMixer::new(SimBackend::new())
    }

    fn preset(mixer: &AudioMixer<SimBackend>, id: &str) -> BinauralPreset {
        mixer.catalog().preset(id).unwrap().clone()
    }

    fn ambient_sound(mixer: &AudioMixer<SimBackend>, id: &str) -> AmbientSound {
        mixer.catalog().ambient(id).unwrap().clone()
    }

    /// The first gain the context manager creates is the master stage
    fn master_gain_value(mixer: &AudioMixer<SimBackend>) -> f32 {
        let gain = mixer
            .backend()
            .ops()
            .iter()
            .find_map(|op| match op {
                GraphOp::CreateGain(g) => Some(*g),
                _ => None,
            })
            .expect("no master gain created");
        mixer.backend().gain_value(gain).expect("gain vanished")
    }

    #[tokio::test]
    async fn test_default_sleep_session_builds_offset_pair() {
        let mut m = mixer();

        assert!(m.toggle_binaural().unwrap());
        m.settle().await.unwrap();

        let freqs = m.backend().live_oscillator_frequencies();
        assert_eq!(freqs.len(), 2);
        assert_eq!(freqs[0], 200.0);
        assert!((freqs[1] - 203.5).abs() < 1e-9);
        assert!(m.state().binaural_active);
        assert_eq!(master_gain_value(&m), 0.3);
    }

    #[tokio::test]
    async fn test_preset_switch_rebuilds_exactly_once() {
        let mut m = mixer();
        let focus = preset(&m, "focus");
        let meditate = preset(&m, "meditate");

        m.set_preset(&focus).unwrap();
        m.toggle_binaural().unwrap();
        m.settle().await.unwrap();

        m.backend_mut().clear_ops();
        m.set_preset(&meditate).unwrap();

        let freqs = m.backend().live_oscillator_frequencies();
        assert_eq!(freqs[0], 200.0);
        assert!((freqs[1] - 207.83).abs() < 1e-9);
        assert_eq!(m.backend().live_oscillator_count(), 2);

        let stops = m
            .backend()
            .ops()
            .iter()
            .filter(|op| matches!(op, GraphOp::StopOscillator(_)))
            .count();
        let creates = m
            .backend()
            .ops()
            .iter()
            .filter(|op| matches!(op, GraphOp::CreateOscillator(_)))
            .count();
        assert_eq!(stops, 2);
        assert_eq!(creates, 2);
    }

    #[tokio::test]
    async fn test_preset_round_trip_restores_frequencies() {
        let mut m = mixer();
        let sleep = preset(&m, "sleep");
        let focus = preset(&m, "focus");

        m.toggle_binaural().unwrap();
        m.settle().await.unwrap();

        m.set_preset(&focus).unwrap();
        m.set_preset(&sleep).unwrap();

        let freqs = m.backend().live_oscillator_frequencies();
        assert_eq!(freqs[0], 200.0);
        assert!((freqs[1] - 203.5).abs() < 1e-9);
        assert_eq!(m.backend().live_oscillator_count(), 2);
    }

    #[test]
    fn test_ambient_switch_reuses_single_handle() {
        let mut m = mixer();
        let rain = ambient_sound(&m, "rain");
        let ocean = ambient_sound(&m, "ocean");

        m.set_active_ambient(Some(&rain)).unwrap();
        assert_eq!(m.backend().loop_sources(), vec!["rain.mp3".to_string()]);
        assert!(m.backend().any_loop_playing());

        m.set_active_ambient(Some(&ocean)).unwrap();
        assert_eq!(m.backend().loop_count(), 1);
        assert_eq!(m.backend().loop_sources(), vec!["ocean.mp3".to_string()]);
        assert!(m.backend().any_loop_playing());
        assert_eq!(m.state().active_ambient.unwrap().id, "ocean");
    }

    #[tokio::test]
    async fn test_resume_denial_reverts_flag_with_no_pair() {
        let mut m = mixer();
        m.backend_mut().start_suspended(true);
        m.backend_mut().set_resume_mode(ResumeMode::Deferred);
        let events = m.subscribe();

        assert!(m.toggle_binaural().unwrap());
        assert!(m.state().binaural_active);

        m.backend_mut().deny_pending_resume("no user gesture");
        let err = m.settle().await.unwrap_err();
        assert!(matches!(err, SynthesisError::Resume(_)));

        assert!(!m.state().binaural_active);
        assert_eq!(m.backend().live_oscillator_count(), 0);
        let events: Vec<_> = events.try_iter().collect();
        assert!(events
            .iter()
            .any(|e| matches!(e, MixerEvent::Failure(msg) if msg.contains("no user gesture"))));
        assert!(matches!(
            events.last(),
            Some(MixerEvent::Failure(_))
        ));
    }

    #[tokio::test]
    async fn test_toggle_off_while_pending_swallows_late_grant() {
        let mut m = mixer();
        m.backend_mut().start_suspended(true);
        m.backend_mut().set_resume_mode(ResumeMode::Deferred);

        assert!(m.toggle_binaural().unwrap());
        assert!(!m.toggle_binaural().unwrap());

        // The platform grants after the user already backed out
        m.backend_mut().grant_pending_resume();
        m.settle().await.unwrap();

        assert!(!m.state().binaural_active);
        assert_eq!(m.backend().live_oscillator_count(), 0);
    }

    #[tokio::test]
    async fn test_volume_ops_responsive_while_resume_pending() {
        let mut m = mixer();
        m.backend_mut().start_suspended(true);
        m.backend_mut().set_resume_mode(ResumeMode::Deferred);

        m.toggle_binaural().unwrap();
        m.set_binaural_volume(80);
        m.set_ambient_volume(10);
        assert_eq!(m.state().binaural_volume, 80);
        assert_eq!(m.state().ambient_volume, 10);

        m.backend_mut().grant_pending_resume();
        m.settle().await.unwrap();

        assert_eq!(m.backend().live_oscillator_count(), 2);
        assert_eq!(master_gain_value(&m), 0.8);
    }

    #[tokio::test]
    async fn test_custom_frequency_clamps_and_retunes_live_pair() {
        let mut m = mixer();
        let custom = preset(&m, "custom");

        m.set_preset(&custom).unwrap();
        m.toggle_binaural().unwrap();
        m.settle().await.unwrap();

        m.set_custom_frequency(0.5).unwrap();
        assert_eq!(m.state().custom_frequency, 1.0);
        assert_eq!(m.state().active_preset.frequency, 1.0);

        m.set_custom_frequency(45.0).unwrap();
        assert_eq!(m.state().custom_frequency, 40.0);

        m.set_custom_frequency(12.0).unwrap();
        let freqs = m.backend().live_oscillator_frequencies();
        assert_eq!(freqs[0], 200.0);
        assert!((freqs[1] - 212.0).abs() < 1e-9);
    }

    #[test]
    fn test_custom_preset_adopts_stored_frequency() {
        let mut m = mixer();
        let custom = preset(&m, "custom");
        let sleep = preset(&m, "sleep");

        m.set_custom_frequency(9.0).unwrap();
        m.set_preset(&custom).unwrap();
        assert_eq!(m.state().active_preset.frequency, 9.0);

        // Leaving custom does not disturb the stored value
        m.set_preset(&sleep).unwrap();
        assert_eq!(m.state().custom_frequency, 9.0);
        assert_eq!(m.state().active_preset.frequency, 3.5);
    }

    #[test]
    fn test_custom_frequency_change_is_inert_for_fixed_presets() {
        let mut m = mixer();

        m.set_custom_frequency(22.0).unwrap();
        assert_eq!(m.state().custom_frequency, 22.0);
        assert_eq!(m.state().active_preset.frequency, 3.5);
    }

    #[test]
    fn test_ambient_failure_keeps_previous_selection() {
        let mut m = mixer();
        let rain = ambient_sound(&m, "rain");
        let ocean = ambient_sound(&m, "ocean");
        let events = m.subscribe();

        m.set_active_ambient(Some(&rain)).unwrap();
        m.backend_mut()
            .fail_next_play(PlaybackError::StartRefused("device busy".into()));
        assert!(m.set_active_ambient(Some(&ocean)).is_err());

        assert_eq!(m.state().active_ambient.unwrap().id, "rain");
        assert!(!m.backend().any_loop_playing());
        assert!(events
            .try_iter()
            .any(|e| matches!(e, MixerEvent::Failure(_))));
    }

    #[tokio::test]
    async fn test_context_denial_surfaces_and_leaves_state_clean() {
        let mut m = mixer();
        m.backend_mut().deny_next_context("policy blocked");

        let err = m.toggle_binaural().unwrap_err();
        assert!(matches!(err, SynthesisError::Context(_)));
        assert!(!m.state().binaural_active);

        // Nothing pending; settle is a no-op
        m.settle().await.unwrap();
        assert_eq!(m.backend().live_oscillator_count(), 0);
    }

    #[tokio::test]
    async fn test_session_expiry_quiets_everything_and_notifies() {
        let mut m = mixer();
        let rain = ambient_sound(&m, "rain");
        let events = m.subscribe();

        m.toggle_binaural().unwrap();
        m.settle().await.unwrap();
        m.set_active_ambient(Some(&rain)).unwrap();

        m.on_session_expire();

        let state = m.state();
        assert!(!state.binaural_active);
        assert!(state.active_ambient.is_none());
        assert!(!state.is_audibly_active());
        assert_eq!(m.backend().live_oscillator_count(), 0);
        assert!(!m.backend().any_loop_playing());
        assert!(events
            .try_iter()
            .any(|e| matches!(e, MixerEvent::SessionExpired)));
        // Expiry is not a shutdown; the context survives for a restart
        assert_eq!(m.context_state(), ContextState::Running);
    }

    #[tokio::test]
    async fn test_shutdown_then_toggle_rebuilds_fresh_context() {
        let mut m = mixer();

        m.toggle_binaural().unwrap();
        m.settle().await.unwrap();

        m.shutdown();
        assert_eq!(m.context_state(), ContextState::Closed);
        assert_eq!(m.backend().live_oscillator_count(), 0);
        m.shutdown();

        m.toggle_binaural().unwrap();
        m.settle().await.unwrap();
        assert_eq!(m.backend().live_oscillator_count(), 2);

        let contexts = m
            .backend()
            .ops()
            .iter()
            .filter(|op| matches!(op, GraphOp::CreateContext(_)))
            .count();
        assert_eq!(contexts, 2);
    }

    #[test]
    fn test_primary_status_drives_activity_signal() {
        let mut m = mixer();
        assert!(!m.state().is_audibly_active());

        m.set_primary_status(PlayerStatus::Playing);
        assert!(m.state().is_audibly_active());

        m.set_primary_status(PlayerStatus::Paused);
        assert!(!m.state().is_audibly_active());
    }

    #[test]
    fn test_subscribers_receive_state_changes() {
        let mut m = mixer();
        let events = m.subscribe();

        m.set_binaural_volume(55);

        match events.try_recv() {
            Ok(MixerEvent::StateChanged(state)) => {
                assert_eq!(state.binaural_volume, 55);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_apply_suggestion_lands_custom_frequency_and_ambient() {
        let mut m = mixer();
        let custom = preset(&m, "custom");
        let rain = ambient_sound(&m, "rain");

        m.toggle_binaural().unwrap();
        m.settle().await.unwrap();

        m.apply_suggestion(&custom, Some(&rain), Some(9.0)).unwrap();

        let state = m.state();
        assert_eq!(state.active_preset.id, "custom");
        assert_eq!(state.active_preset.frequency, 9.0);
        assert_eq!(state.active_ambient.unwrap().id, "rain");
        let freqs = m.backend().live_oscillator_frequencies();
        assert!((freqs[1] - 209.0).abs() < 1e-9);
    }
}
