//! Processing context lifecycle
//!
//! One context at a time, created lazily on first use. Creation also
//! builds the master output stage: a gain node wired to the destination,
//! initialized from the binaural volume so the first pair comes up at the
//! user's level. A closed context is terminal; the next `ensure` call
//! starts over with a fresh one.

use crate::audio::{
    AudioBackend, ContextCreationError, ContextId, ContextState, GainId, ResumeError, ResumeWait,
};

pub struct ContextManager {
    handles: Option<(ContextId, GainId)>,
    volume_percent: u8,
}

impl ContextManager {
    pub fn new(volume_percent: u8) -> Self {
        Self {
            handles: None,
            volume_percent: volume_percent.min(100),
        }
    }

    /// Context and master gain, creating both if needed
    ///
    /// A failure while building the master stage closes the fresh context
    /// so nothing half-wired leaks into later calls.
    pub fn ensure<B: AudioBackend>(
        &mut self,
        backend: &mut B,
    ) -> Result<(ContextId, GainId), ContextCreationError> {
        if let Some((ctx, master)) = self.handles {
            if backend.context_state(ctx) != ContextState::Closed {
                return Ok((ctx, master));
            }
        }

        let ctx = backend.create_context()?;
        let master = match backend.create_gain(ctx) {
            Ok(gain) => gain,
            Err(e) => {
                backend.close_context(ctx);
                return Err(ContextCreationError::MasterChain(e.to_string()));
            }
        };
        backend.set_gain(master, self.volume_percent as f32 / 100.0);
        backend.connect_to_destination(master);

        self.handles = Some((ctx, master));
        log::info!(
            "Processing context ready (master volume {}%)",
            self.volume_percent
        );
        Ok((ctx, master))
    }

    pub fn handles(&self) -> Option<(ContextId, GainId)> {
        self.handles
    }

    /// Ask the platform to resume; running contexts settle immediately
    pub fn begin_resume<B: AudioBackend>(&mut self, backend: &mut B) -> ResumeWait {
        match self.handles {
            Some((ctx, _)) => match backend.context_state(ctx) {
                ContextState::Running => ResumeWait::ready(Ok(())),
                _ => backend.resume_context(ctx),
            },
            None => ResumeWait::ready(Err(ResumeError::ContextClosed)),
        }
    }

    /// Close the current context; the handles stay so `state` reads
    /// Closed until a fresh `ensure`
    pub fn close<B: AudioBackend>(&mut self, backend: &mut B) {
        if let Some((ctx, _)) = self.handles {
            backend.close_context(ctx);
        }
    }

    /// Clamps, stores, and applies when a master stage exists
    pub fn set_master_gain<B: AudioBackend>(&mut self, backend: &mut B, percent: u8) {
        self.volume_percent = percent.min(100);
        if let Some((_, master)) = self.handles {
            backend.set_gain(master, self.volume_percent as f32 / 100.0);
        }
    }

    pub fn volume_percent(&self) -> u8 {
        self.volume_percent
    }

    pub fn state<B: AudioBackend>(&self, backend: &B) -> ContextState {
        match self.handles {
            Some((ctx, _)) => backend.context_state(ctx),
            None => ContextState::Uninitialized,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{GraphOp, ResumeMode, SimBackend};

    #[test]
    fn test_ensure_is_lazy_and_reuses_handles() {
        let mut sim = SimBackend::new();
        let mut manager = ContextManager::new(30);
        assert_eq!(manager.state(&sim), ContextState::Uninitialized);

        let first = manager.ensure(&mut sim).unwrap();
        let second = manager.ensure(&mut sim).unwrap();
        assert_eq!(first, second);

        let creates = sim
            .ops()
            .iter()
            .filter(|op| matches!(op, GraphOp::CreateContext(_)))
            .count();
        assert_eq!(creates, 1);
    }

    #[test]
    fn test_master_gain_initialized_from_volume() {
        let mut sim = SimBackend::new();
        let mut manager = ContextManager::new(30);

        let (_, master) = manager.ensure(&mut sim).unwrap();
        assert_eq!(sim.gain_value(master), Some(0.3));
    }

    #[test]
    fn test_creation_denial_leaves_uninitialized() {
        let mut sim = SimBackend::new();
        sim.deny_next_context("policy blocked");
        let mut manager = ContextManager::new(30);

        assert!(matches!(
            manager.ensure(&mut sim),
            Err(ContextCreationError::Denied(_))
        ));
        assert_eq!(manager.state(&sim), ContextState::Uninitialized);
    }

    #[test]
    fn test_master_chain_failure_closes_fresh_context() {
        let mut sim = SimBackend::new();
        sim.fail_next_node("gain");
        let mut manager = ContextManager::new(30);

        assert!(matches!(
            manager.ensure(&mut sim),
            Err(ContextCreationError::MasterChain(_))
        ));
        assert_eq!(manager.state(&sim), ContextState::Uninitialized);
        assert!(sim
            .ops()
            .iter()
            .any(|op| matches!(op, GraphOp::CloseContext(_))));
    }

    #[test]
    fn test_close_is_terminal_until_fresh_ensure() {
        let mut sim = SimBackend::new();
        let mut manager = ContextManager::new(30);

        let (first_ctx, _) = manager.ensure(&mut sim).unwrap();
        manager.close(&mut sim);
        manager.close(&mut sim);
        assert_eq!(manager.state(&sim), ContextState::Closed);

        let (second_ctx, _) = manager.ensure(&mut sim).unwrap();
        assert_ne!(first_ctx, second_ctx);
        assert_eq!(manager.state(&sim), ContextState::Running);
    }

    #[test]
    fn test_set_master_gain_clamps_and_applies_later() {
        let mut sim = SimBackend::new();
        let mut manager = ContextManager::new(30);

        // Stored before any context exists
        manager.set_master_gain(&mut sim, 150);
        assert_eq!(manager.volume_percent(), 100);

        let (_, master) = manager.ensure(&mut sim).unwrap();
        assert_eq!(sim.gain_value(master), Some(1.0));

        manager.set_master_gain(&mut sim, 55);
        assert_eq!(sim.gain_value(master), Some(0.55));
    }

    #[test]
    fn test_begin_resume_short_circuits_when_running() {
        let mut sim = SimBackend::new();
        let mut manager = ContextManager::new(30);
        manager.ensure(&mut sim).unwrap();

        let _wait = manager.begin_resume(&mut sim);
        assert!(!sim
            .ops()
            .iter()
            .any(|op| matches!(op, GraphOp::ResumeRequested(_))));
    }

    #[tokio::test]
    async fn test_begin_resume_delegates_when_suspended() {
        let mut sim = SimBackend::new();
        sim.start_suspended(true);
        sim.set_resume_mode(ResumeMode::Deferred);
        let mut manager = ContextManager::new(30);
        manager.ensure(&mut sim).unwrap();

        let wait = manager.begin_resume(&mut sim);
        assert!(sim.has_pending_resume());

        sim.grant_pending_resume();
        assert!(wait.wait().await.is_ok());
        assert_eq!(manager.state(&sim), ContextState::Running);
    }
}
