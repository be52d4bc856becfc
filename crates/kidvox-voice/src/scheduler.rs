//! Audio queue scheduler: speaks queued fragments strictly in order.
//!
//! # Design
//!
//! - One drain worker at a time. The worker's generation is recorded in
//!   `active`; `drain()` is a no-op while that generation is current.
//! - The head item stays queued while it plays and is popped only after
//!   it completes (or fails), so `pause()` keeps the queue position.
//! - Each playback start bumps the shared generation. `reset()`, `pause()`
//!   and hard-stops bump it too; a worker whose generation is stale exits
//!   without touching the queue, so late completions are no-ops.
//! - The playing item's [`PlaybackSession`] is cancelled by `reset()` and
//!   `pause()`, so a playback that has not reached the sink yet never
//!   starts.
//! - Items are handed off with a yield between them, never by recursion.
//! - `on_start` is `FnOnce` and fires when an item first starts; a resumed
//!   head replays its audio without re-firing it.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use kidvox_core::LanguageProfile;

use crate::error::VoiceError;
use crate::generation::GenerationCounter;
use crate::synthesis::{PlaybackSession, SpeechSynthesisAdapter};

/// Callback fired at an item boundary.
pub type ItemCallback = Box<dyn FnOnce() + Send + 'static>;

/// Callback fired when the queue empties naturally, with the generation of
/// the worker that drained it.
pub type DrainedCallback = Arc<dyn Fn(u64) + Send + Sync + 'static>;

/// One fragment waiting to be spoken.
pub struct QueueItem {
    text: String,
    on_start: Option<ItemCallback>,
    on_end: Option<ItemCallback>,
}

impl QueueItem {
    /// Item with no callbacks.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            on_start: None,
            on_end: None,
        }
    }

    /// Fire `f` when the item starts playing.
    #[must_use]
    pub fn on_start(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.on_start = Some(Box::new(f));
        self
    }

    /// Fire `f` when the item finished (or failed).
    #[must_use]
    pub fn on_end(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.on_end = Some(Box::new(f));
        self
    }

    /// The fragment text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }
}

impl std::fmt::Debug for QueueItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueItem")
            .field("text", &self.text)
            .field("on_start", &self.on_start.is_some())
            .field("on_end", &self.on_end.is_some())
            .finish()
    }
}

#[derive(Default)]
struct QueueState {
    items: VecDeque<QueueItem>,
    active: Option<u64>,
    playing: Option<PlaybackSession>,
    paused: bool,
    profile: Option<LanguageProfile>,
    on_drained: Option<DrainedCallback>,
}

struct SchedulerInner {
    adapter: Arc<SpeechSynthesisAdapter>,
    generation: GenerationCounter,
    guard_delay: Duration,
    state: Mutex<QueueState>,
}

impl SchedulerInner {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// FIFO scheduler driving the synthesis adapter one item at a time.
///
/// Cheap to clone; clones share the same queue.
#[derive(Clone)]
pub struct AudioQueueScheduler {
    inner: Arc<SchedulerInner>,
}

impl AudioQueueScheduler {
    /// Create a scheduler sharing `generation` with its owner.
    ///
    /// `guard_delay` is the pause before draining continues after a failed
    /// item.
    #[must_use]
    pub fn new(
        adapter: Arc<SpeechSynthesisAdapter>,
        generation: GenerationCounter,
        guard_delay: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                adapter,
                generation,
                guard_delay,
                state: Mutex::new(QueueState::default()),
            }),
        }
    }

    /// Profile used for every subsequently spoken item.
    pub fn set_profile(&self, profile: LanguageProfile) {
        self.inner.lock().profile = Some(profile);
    }

    /// Register the drained notification.
    pub fn set_on_drained(&self, callback: DrainedCallback) {
        self.inner.lock().on_drained = Some(callback);
    }

    /// Current generation.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.inner.generation.current()
    }

    /// Items still queued, including a playing or paused head.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    /// Whether nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a drain worker is running.
    #[must_use]
    pub fn is_draining(&self) -> bool {
        let state = self.inner.lock();
        state
            .active
            .is_some_and(|g| self.inner.generation.is_current(g))
    }

    /// Whether the queue is paused.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.inner.lock().paused
    }

    /// Append an item; starts draining if the scheduler was idle.
    pub fn enqueue(&self, item: QueueItem) {
        let paused = {
            let mut state = self.inner.lock();
            tracing::debug!(text = %item.text, queued = state.items.len() + 1, "Enqueued fragment");
            state.items.push_back(item);
            state.paused
        };
        if !paused {
            self.drain();
        }
    }

    /// Append several items at once; the worker cannot observe a partial
    /// batch.
    pub fn extend(&self, items: impl IntoIterator<Item = QueueItem>) {
        let paused = {
            let mut state = self.inner.lock();
            let before = state.items.len();
            state.items.extend(items);
            tracing::debug!(added = state.items.len() - before, queued = state.items.len(), "Enqueued fragments");
            state.paused
        };
        if !paused {
            self.drain();
        }
    }

    /// Start a drain worker unless one is already active. Single-flight.
    pub fn drain(&self) {
        let mut state = self.inner.lock();
        if state.paused || state.items.is_empty() {
            return;
        }
        if state
            .active
            .is_some_and(|g| self.inner.generation.is_current(g))
        {
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::error!("Cannot drain audio queue outside a tokio runtime");
            return;
        };

        let generation = self.inner.generation.current();
        state.active = Some(generation);
        drop(state);

        runtime.spawn(run_worker(Arc::clone(&self.inner), generation));
    }

    /// Clear the queue and invalidate in-flight completions.
    ///
    /// Dropped items never fire their callbacks. Audio is not stopped here;
    /// the owner cancels the adapter.
    pub fn reset(&self) {
        let dropped = {
            let mut state = self.inner.lock();
            state.paused = false;
            state.active = None;
            self.inner.generation.bump();
            if let Some(playing) = state.playing.take() {
                playing.cancel();
            }
            std::mem::take(&mut state.items)
        };
        if !dropped.is_empty() {
            tracing::debug!(dropped = dropped.len(), "Audio queue reset");
        }
    }

    /// Stop audio without advancing or dropping the head item.
    ///
    /// Returns `false` if there was nothing to pause.
    pub fn pause(&self) -> bool {
        {
            let mut state = self.inner.lock();
            if state.paused || state.items.is_empty() {
                return false;
            }
            state.paused = true;
            state.active = None;
            self.inner.generation.bump();
            if let Some(playing) = state.playing.take() {
                playing.cancel();
            }
        }
        self.inner.adapter.cancel();
        tracing::debug!("Audio queue paused");
        true
    }

    /// Replay the head item from its start and continue draining.
    pub fn resume(&self) {
        {
            let mut state = self.inner.lock();
            if !state.paused {
                return;
            }
            state.paused = false;
        }
        tracing::debug!("Audio queue resumed");
        self.drain();
    }
}

/// Drain loop. Exits as soon as its generation is stale.
async fn run_worker(inner: Arc<SchedulerInner>, mut generation: u64) {
    loop {
        let (text, on_start, profile, session) = {
            let mut state = inner.lock();
            if !inner.generation.is_current(generation) || state.paused {
                return;
            }

            let profile = state.profile.clone();
            let Some(head) = state.items.front_mut() else {
                state.active = None;
                let on_drained = state.on_drained.clone();
                drop(state);
                tracing::debug!(generation, "Audio queue drained");
                if let Some(cb) = on_drained {
                    cb(generation);
                }
                return;
            };
            let text = head.text.clone();
            let on_start = head.on_start.take();

            // New playback start.
            let session = PlaybackSession::new(inner.generation.bump());
            state.active = Some(session.generation());
            state.playing = Some(session.clone());
            (text, on_start, profile, session)
        };
        generation = session.generation();

        if let Some(cb) = on_start {
            cb();
        }

        let result = match &profile {
            Some(profile) => inner.adapter.speak(&session, &text, profile).await,
            None => Err(VoiceError::UnsupportedLanguage),
        };

        if !inner.generation.is_current(generation) {
            tracing::debug!(generation, "Discarding stale playback completion");
            return;
        }

        let failed = match result {
            Ok(()) => false,
            Err(e) => {
                tracing::warn!(error = %e, text = %text, "Fragment failed, continuing");
                true
            }
        };

        let on_end = {
            let mut state = inner.lock();
            if !inner.generation.is_current(generation) {
                return;
            }
            state.playing = None;
            state.items.pop_front().and_then(|item| item.on_end)
        };
        if let Some(cb) = on_end {
            cb();
        }

        if failed {
            tokio::time::sleep(inner.guard_delay).await;
        } else {
            tokio::task::yield_now().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use kidvox_core::{
        Confidence, Language, ProviderError, Settings, SynthesisProvider, SynthesisRequest,
        SynthesizedAudio,
    };

    use super::*;
    use crate::audio_io::{AudioSink, PlaybackDoneCallback};
    use crate::gate::DeviceGate;

    struct EchoProvider;

    #[async_trait]
    impl SynthesisProvider for EchoProvider {
        fn name(&self) -> &str {
            "echo"
        }

        async fn synthesize(
            &self,
            request: &SynthesisRequest,
        ) -> Result<SynthesizedAudio, ProviderError> {
            if request.text == "FAIL" {
                return Err(ProviderError::InvalidResponse("bad".into()));
            }
            Ok(SynthesizedAudio {
                bytes: request.text.as_bytes().to_vec(),
                format: request.output_format,
            })
        }
    }

    /// Completes each clip 100 ms after it starts (virtual time).
    #[derive(Default)]
    struct TimedSink {
        played: Mutex<Vec<String>>,
        current: Mutex<Option<tokio::task::JoinHandle<()>>>,
    }

    impl AudioSink for TimedSink {
        fn play(
            &self,
            audio: SynthesizedAudio,
            on_done: PlaybackDoneCallback,
        ) -> Result<(), VoiceError> {
            self.played
                .lock()
                .unwrap()
                .push(String::from_utf8(audio.bytes).unwrap());
            let handle = tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                on_done();
            });
            *self.current.lock().unwrap() = Some(handle);
            Ok(())
        }

        fn stop(&self) {
            if let Some(h) = self.current.lock().unwrap().take() {
                h.abort();
            }
        }

        fn is_playing(&self) -> bool {
            self.current
                .lock()
                .unwrap()
                .as_ref()
                .is_some_and(|h| !h.is_finished())
        }
    }

    fn scheduler() -> (AudioQueueScheduler, Arc<TimedSink>) {
        let sink = Arc::new(TimedSink::default());
        let adapter = SpeechSynthesisAdapter::new(
            Arc::clone(&sink) as Arc<dyn AudioSink>,
            DeviceGate::new(),
            Settings::with_defaults(),
        )
        .with_primary(Arc::new(EchoProvider));
        let scheduler = AudioQueueScheduler::new(
            Arc::new(adapter),
            GenerationCounter::new(),
            Duration::from_millis(300),
        );
        scheduler.set_profile(LanguageProfile::for_language(
            Language::English,
            Confidence::None,
        ));
        (scheduler, sink)
    }

    fn logged(log: &Arc<Mutex<Vec<String>>>, text: &str) -> QueueItem {
        let (start_log, end_log) = (Arc::clone(log), Arc::clone(log));
        let (s, e) = (format!("start:{text}"), format!("end:{text}"));
        QueueItem::new(text)
            .on_start(move || start_log.lock().unwrap().push(s))
            .on_end(move || end_log.lock().unwrap().push(e))
    }

    #[tokio::test(start_paused = true)]
    async fn items_play_in_fifo_order_with_callbacks_interleaved() {
        let (scheduler, sink) = scheduler();
        let log = Arc::new(Mutex::new(Vec::new()));
        let drained = Arc::new(AtomicUsize::new(0));
        let d = Arc::clone(&drained);
        scheduler.set_on_drained(Arc::new(move |_| {
            d.fetch_add(1, Ordering::SeqCst);
        }));

        for text in ["B", "Ball", "Banana"] {
            scheduler.enqueue(logged(&log, text));
        }
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(
            *log.lock().unwrap(),
            [
                "start:B",
                "end:B",
                "start:Ball",
                "end:Ball",
                "start:Banana",
                "end:Banana"
            ]
        );
        assert_eq!(*sink.played.lock().unwrap(), ["B", "Ball", "Banana"]);
        assert_eq!(drained.load(Ordering::SeqCst), 1);
        assert!(scheduler.is_empty());
        assert!(!scheduler.is_draining());
    }

    #[tokio::test(start_paused = true)]
    async fn drain_is_single_flight() {
        let (scheduler, sink) = scheduler();
        scheduler.enqueue(QueueItem::new("one"));
        scheduler.enqueue(QueueItem::new("two"));
        for _ in 0..5 {
            scheduler.drain();
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(*sink.played.lock().unwrap(), ["one", "two"]);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_drops_items_and_silences_completions() {
        let (scheduler, _sink) = scheduler();
        let log = Arc::new(Mutex::new(Vec::new()));
        for text in ["B", "Ball", "Banana"] {
            scheduler.enqueue(logged(&log, text));
        }
        tokio::time::sleep(Duration::from_millis(150)).await;

        scheduler.reset();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(*log.lock().unwrap(), ["start:B", "end:B", "start:Ball"]);
        assert!(scheduler.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn pause_and_resume_replay_the_head() {
        let (scheduler, sink) = scheduler();
        let log = Arc::new(Mutex::new(Vec::new()));
        for text in ["B", "Ball", "Banana"] {
            scheduler.enqueue(logged(&log, text));
        }
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(scheduler.pause());
        assert!(!scheduler.pause());
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(scheduler.len(), 2);

        scheduler.resume();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(
            *sink.played.lock().unwrap(),
            ["B", "Ball", "Ball", "Banana"]
        );
        assert_eq!(
            *log.lock().unwrap(),
            [
                "start:B",
                "end:B",
                "start:Ball",
                "end:Ball",
                "start:Banana",
                "end:Banana"
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failure_counts_as_completion() {
        let (scheduler, sink) = scheduler();
        let log = Arc::new(Mutex::new(Vec::new()));
        for text in ["FAIL", "after"] {
            scheduler.enqueue(logged(&log, text));
        }
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(
            *log.lock().unwrap(),
            ["start:FAIL", "end:FAIL", "start:after", "end:after"]
        );
        assert_eq!(*sink.played.lock().unwrap(), ["after"]);
    }

    #[tokio::test(start_paused = true)]
    async fn enqueue_while_paused_waits_for_resume() {
        let (scheduler, sink) = scheduler();
        scheduler.enqueue(QueueItem::new("one"));
        tokio::time::sleep(Duration::from_millis(50)).await;
        scheduler.pause();
        scheduler.enqueue(QueueItem::new("two"));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(*sink.played.lock().unwrap(), ["one"]);

        scheduler.resume();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(*sink.played.lock().unwrap(), ["one", "one", "two"]);
    }
}
