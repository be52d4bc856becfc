//! Playback lifecycle guard: stops everything when the host goes away.
//!
//! Hosts publish [`LifecycleSignal`]s (tab hidden, navigation, teardown) on a
//! [`LifecycleSignals`] broadcaster. A [`PlaybackLifecycleGuard`] subscribed
//! to it calls the target's synchronous hard-stop once per signal. The
//! subscription is a single scoped [`LifecycleSubscription`]; dropping it
//! unsubscribes and performs the teardown stop, including during unwinding.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::session::SpeechSession;

/// Broadcast channel capacity for lifecycle signals.
const CHANNEL_CAPACITY: usize = 16;

/// A host event after which no audio may keep playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleSignal {
    /// The page or window became hidden.
    VisibilityHidden,
    /// The user navigated to another screen.
    NavigatedAway,
    /// The hosting screen is being torn down.
    Teardown,
}

/// Anything with a synchronous, idempotent hard-stop.
pub trait Stoppable: Send + Sync {
    /// Stop all audio and microphone activity.
    fn hard_stop(&self);
}

impl Stoppable for SpeechSession {
    fn hard_stop(&self) {
        Self::hard_stop(self);
    }
}

/// Broadcaster hosts publish lifecycle signals on.
#[derive(Debug, Clone)]
pub struct LifecycleSignals {
    sender: broadcast::Sender<LifecycleSignal>,
}

impl LifecycleSignals {
    /// Create a broadcaster with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Publish a signal to every subscriber.
    ///
    /// Delivery is asynchronous: a subscribed guard stops its target when
    /// its listener task next runs, not before `publish` returns. Hosts that
    /// need the stop to have happened on return call
    /// [`PlaybackLifecycleGuard::handle`] directly from the trigger.
    pub fn publish(&self, signal: LifecycleSignal) {
        if self.sender.send(signal).is_err() {
            tracing::trace!(?signal, "No lifecycle subscribers");
        }
    }

    /// New receiver for [`PlaybackLifecycleGuard::subscribe`].
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleSignal> {
        self.sender.subscribe()
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for LifecycleSignals {
    fn default() -> Self {
        Self::new()
    }
}

/// Calls a hard-stop for every lifecycle signal.
#[derive(Clone)]
pub struct PlaybackLifecycleGuard {
    target: Arc<dyn Stoppable>,
}

impl std::fmt::Debug for PlaybackLifecycleGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackLifecycleGuard").finish_non_exhaustive()
    }
}

impl PlaybackLifecycleGuard {
    /// Guard `target`.
    #[must_use]
    pub fn new(target: Arc<dyn Stoppable>) -> Self {
        Self { target }
    }

    /// Guard a speech session.
    #[must_use]
    pub fn for_session(session: &SpeechSession) -> Self {
        Self::new(Arc::new(session.clone()))
    }

    /// Stop everything now. Safe to call any number of times.
    pub fn hard_stop(&self) {
        self.target.hard_stop();
    }

    /// React to one signal. The target is stopped before this returns.
    pub fn handle(&self, signal: LifecycleSignal) {
        tracing::info!(?signal, "Lifecycle signal, stopping playback");
        self.hard_stop();
    }

    /// Listen on `signals` until the returned subscription is dropped.
    ///
    /// Signals are handled on a spawned listener task, so a stop lags the
    /// publish by one scheduling turn; use [`handle`](Self::handle) where
    /// that matters. Outside a tokio runtime no listener task runs; the
    /// subscription still stops the target when dropped.
    pub fn subscribe(&self, mut signals: broadcast::Receiver<LifecycleSignal>) -> LifecycleSubscription {
        let guard = self.clone();
        let task = tokio::runtime::Handle::try_current().ok().map(|runtime| {
            runtime.spawn(async move {
                loop {
                    match signals.recv().await {
                        Ok(signal) => guard.handle(signal),
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::debug!(skipped, "Lifecycle receiver lagged, stopping");
                            guard.hard_stop();
                        }
                        Err(RecvError::Closed) => {
                            tracing::debug!("Lifecycle channel closed");
                            break;
                        }
                    }
                }
            })
        });
        if task.is_none() {
            tracing::warn!("No tokio runtime, lifecycle signals will not be observed");
        }

        LifecycleSubscription {
            guard: Some(self.clone()),
            task,
        }
    }
}

/// Scoped lifecycle subscription.
///
/// Dropping it stops the listener and performs the teardown hard-stop.
#[must_use = "dropping the subscription immediately stops playback"]
pub struct LifecycleSubscription {
    guard: Option<PlaybackLifecycleGuard>,
    task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for LifecycleSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleSubscription")
            .field("active", &self.guard.is_some())
            .finish()
    }
}

impl LifecycleSubscription {
    /// Unsubscribe and stop. Equivalent to dropping.
    pub fn dispose(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if let Some(guard) = self.guard.take() {
            guard.handle(LifecycleSignal::Teardown);
        }
    }
}

impl Drop for LifecycleSubscription {
    fn drop(&mut self) {
        self.teardown();
    }
}
