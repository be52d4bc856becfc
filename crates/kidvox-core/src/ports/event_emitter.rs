//! Event emitter port for session events.
//!
//! Implementations handle transport details (channels, UI bridges, logs).

use crate::events::SessionEvent;

/// Trait for emitting session events to a hosting screen.
///
/// Keeps channel types out of the orchestrator's public API.
///
/// # Implementations
///
/// - [`NoopEmitter`] - for tests and hosts that poll `current_state()`
/// - `ChannelEmitter` in `kidvox-voice` - unbounded mpsc channel
pub trait SessionEventEmitter: Send + Sync {
    /// Emit a session event.
    ///
    /// Must not block; it is called from synchronous stop paths.
    fn emit(&self, event: SessionEvent);
}

/// A no-op event emitter.
#[derive(Debug, Clone, Default)]
pub struct NoopEmitter;

impl NoopEmitter {
    /// Create a new no-op emitter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl SessionEventEmitter for NoopEmitter {
    fn emit(&self, _event: SessionEvent) {}
}
