//! Ambient loop player
//!
//! One looping handle for the life of the unit. The first selection
//! creates it; every later selection swaps the source in place, which
//! restarts playback from the beginning. Deselecting pauses the handle
//! but keeps it around for the next selection.

use crate::audio::{AudioBackend, LoopId, PlaybackError};
use crate::presets::AmbientSound;

pub struct AmbientLoop {
    handle: Option<LoopId>,
    volume_percent: u8,
}

impl AmbientLoop {
    pub fn new(volume_percent: u8) -> Self {
        Self {
            handle: None,
            volume_percent: volume_percent.min(100),
        }
    }

    /// Point the handle at a sound and play, or pause on `None`
    ///
    /// Selecting the sound that is already loaded still restarts it from
    /// the beginning. A playback failure leaves the handle paused; the
    /// caller decides what the selection state should read.
    pub fn select<B: AudioBackend>(
        &mut self,
        backend: &mut B,
        sound: Option<&AmbientSound>,
    ) -> Result<(), PlaybackError> {
        let Some(sound) = sound else {
            self.pause(backend);
            return Ok(());
        };

        let handle = match self.handle {
            Some(handle) => {
                backend.set_loop_source(handle, &sound.loop_source_ref);
                handle
            }
            None => {
                let handle = backend.create_loop(&sound.loop_source_ref);
                self.handle = Some(handle);
                handle
            }
        };

        backend.set_loop_volume(handle, self.volume_percent as f32 / 100.0);
        backend.play_loop(handle)?;
        log::debug!("Ambient loop playing: {}", sound.id);
        Ok(())
    }

    /// Pause without dropping the handle; no-op before first selection
    pub fn pause<B: AudioBackend>(&mut self, backend: &mut B) {
        if let Some(handle) = self.handle {
            backend.pause_loop(handle);
        }
    }

    /// Clamps, stores, and applies when a handle exists
    pub fn set_volume<B: AudioBackend>(&mut self, backend: &mut B, percent: u8) {
        self.volume_percent = percent.min(100);
        if let Some(handle) = self.handle {
            backend.set_loop_volume(handle, self.volume_percent as f32 / 100.0);
        }
    }

    pub fn volume_percent(&self) -> u8 {
        self.volume_percent
    }
}
