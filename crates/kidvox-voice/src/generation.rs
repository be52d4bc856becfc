//! Generation tokens: invalidate stale asynchronous completions.
//!
//! Every hard-stop, reset, pause and new playback bumps the shared counter.
//! An asynchronous completion captures a [`GenerationTicket`] when it is
//! scheduled and discards its result unless the ticket is still current, so
//! a `speak()` that resolves after the user navigated away can never advance
//! the queue or resurrect session state.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared, monotonically increasing generation counter.
#[derive(Debug, Clone, Default)]
pub struct GenerationCounter {
    current: Arc<AtomicU64>,
}

impl GenerationCounter {
    /// Create a counter starting at generation 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The current generation.
    #[must_use]
    pub fn current(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }

    /// Invalidate every outstanding ticket and return the new generation.
    pub fn bump(&self) -> u64 {
        self.current.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Capture the current generation.
    #[must_use]
    pub fn ticket(&self) -> GenerationTicket {
        GenerationTicket {
            generation: self.current(),
            counter: Arc::clone(&self.current),
        }
    }

    /// Whether `generation` is still the current one.
    #[must_use]
    pub fn is_current(&self, generation: u64) -> bool {
        self.current() == generation
    }
}

/// A generation captured at scheduling time.
#[derive(Debug, Clone)]
pub struct GenerationTicket {
    generation: u64,
    counter: Arc<AtomicU64>,
}

impl GenerationTicket {
    /// The captured generation value.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether nothing has bumped the counter since this ticket was taken.
    #[must_use]
    pub fn is_current(&self) -> bool {
        self.counter.load(Ordering::SeqCst) == self.generation
    }
}
