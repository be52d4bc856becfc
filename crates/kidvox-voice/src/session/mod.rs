//! Speech session: the single entry point hosting screens talk to.
//!
//! A session ties the pieces together:
//!
//! ```text
//!   build_script ──► LanguageDetector ──► profile
//!   start_session ─► AudioQueueScheduler ─► SpeechSynthesisAdapter ─► sink
//!                         │ drained
//!                         ▼
//!   listen / hold ─► SpeechRecognitionController ─► AnswerEvaluator
//!                                                       │ response
//!                                                       ▼
//!                                              AudioQueueScheduler …
//! ```
//!
//! Hosts see states and [`SessionEvent`]s only. Every asynchronous
//! completion carries the generation it started under and is dropped if a
//! hard-stop happened in between.
//!
//! Lock order: the session core lock may be held while calling into the
//! scheduler, never the other way round. The scheduler fires its callbacks
//! with its own lock released.

mod builder;
mod strategy;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use kidvox_core::{
    LanguageProfile, SessionEvent, SessionEventEmitter, SessionState, Transcript, UserNotice,
};
use tokio_util::sync::CancellationToken;

use crate::detector::LanguageDetector;
use crate::error::VoiceError;
use crate::gate::{DeviceGate, DeviceOwner};
use crate::generation::{GenerationCounter, GenerationTicket};
use crate::recognition::SpeechRecognitionController;
use crate::scheduler::{AudioQueueScheduler, QueueItem};
use crate::state_machine::{SessionStateMachine, SessionTrigger, TransitionError};
use crate::synthesis::SpeechSynthesisAdapter;
use crate::text_utils::normalize_fragment;

pub use builder::SessionBuilder;
pub use strategy::{
    AnswerContext, AnswerEvaluator, Evaluation, FnEvaluator, ScriptSource, SilentEvaluator,
    StaticScript,
};

// ── Shared state ───────────────────────────────────────────────────

struct SessionCore {
    machine: SessionStateMachine,
    script: Vec<String>,
    profile: Option<LanguageProfile>,
    transcript: Option<Transcript>,
    next_fragment: usize,
    /// Cancelled and replaced by every hard-stop.
    stop: CancellationToken,
}

struct SessionInner {
    this: Weak<SessionInner>,
    detector: LanguageDetector,
    adapter: Arc<SpeechSynthesisAdapter>,
    scheduler: AudioQueueScheduler,
    recognition: Option<Arc<SpeechRecognitionController>>,
    evaluator: Arc<dyn AnswerEvaluator>,
    script_source: Option<Arc<dyn ScriptSource>>,
    emitter: Arc<dyn SessionEventEmitter>,
    generation: GenerationCounter,
    gate: DeviceGate,
    pinned_profile: Option<LanguageProfile>,
    core: Mutex<SessionCore>,
}

impl SessionInner {
    fn lock(&self) -> MutexGuard<'_, SessionCore> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `trigger` and announce the new state if it changed.
    fn apply(
        &self,
        core: &mut SessionCore,
        trigger: SessionTrigger,
    ) -> Result<SessionState, TransitionError> {
        let before = core.machine.state();
        let after = core.machine.apply(trigger)?;
        if after != before {
            tracing::info!(from = %before, to = %after, "Session state changed");
            self.emitter.emit(SessionEvent::StateChanged(after));
        }
        Ok(after)
    }

    fn notify(&self, notice: UserNotice) {
        tracing::info!(?notice, "User notice");
        self.emitter.emit(SessionEvent::Notice(notice));
    }

    /// Queue items for `fragments`, numbering them after earlier ones.
    ///
    /// Fragment events are emitted under the core lock and only while the
    /// stop token of this run is live, so none can follow `HardStopped`.
    fn enqueue_fragments(&self, core: &mut SessionCore, fragments: &[String]) {
        let items: Vec<QueueItem> = fragments
            .iter()
            .map(|text| {
                let index = core.next_fragment;
                core.next_fragment += 1;

                let started = self.fragment_emitter(&core.stop);
                let finished = self.fragment_emitter(&core.stop);
                let announced = text.clone();
                QueueItem::new(text.as_str())
                    .on_start(move || {
                        started(SessionEvent::FragmentStarted {
                            index,
                            text: announced,
                        });
                    })
                    .on_end(move || finished(SessionEvent::FragmentFinished { index }))
            })
            .collect();
        self.scheduler.extend(items);
    }

    /// Emits an event unless `stop` was cancelled; checked under the core
    /// lock, which every hard-stop holds while it announces itself.
    fn fragment_emitter(
        &self,
        stop: &CancellationToken,
    ) -> impl Fn(SessionEvent) + Send + 'static {
        let this = self.this.clone();
        let stop = stop.clone();
        move |event| {
            let Some(inner) = this.upgrade() else {
                return;
            };
            let _core = inner.lock();
            if stop.is_cancelled() {
                tracing::debug!(?event, "Dropping fragment event after stop");
                return;
            }
            inner.emitter.emit(event);
        }
    }

    /// The scheduler emptied its queue under `generation`.
    fn on_queue_drained(&self, generation: u64) {
        let mut core = self.lock();
        if !self.generation.is_current(generation) {
            tracing::debug!(generation, "Ignoring stale drain notification");
            return;
        }
        if !matches!(
            core.machine.state(),
            SessionState::Reading | SessionState::Analyzing
        ) {
            return;
        }
        if let Err(e) = self.apply(&mut core, SessionTrigger::QueueDrained) {
            tracing::warn!(error = %e, "Drain notification rejected");
        }
    }

    fn hard_stop(&self) {
        let mut core = self.lock();
        std::mem::replace(&mut core.stop, CancellationToken::new()).cancel();

        // Invalidate completions before stopping audio so a cancelled
        // playback is never mistaken for a finished one.
        self.scheduler.reset();
        self.adapter.cancel();
        if let Some(recognition) = &self.recognition {
            recognition.cancel();
        }
        // Leases of cancelled tasks may only drop once those tasks run again.
        self.gate.force_release();

        let before = core.machine.state();
        if self.apply(&mut core, SessionTrigger::HardStop).is_err() {
            return;
        }
        if before != SessionState::Initial {
            let generation = self.generation.current();
            tracing::info!(generation, from = %before, "Session hard-stopped");
            self.emitter.emit(SessionEvent::HardStopped { generation });
        }
    }
}

// ── Public API ─────────────────────────────────────────────────────

/// A speech session driving one script, its questions and answers.
///
/// Cheap to clone; clones drive the same session. Assemble one with
/// [`SessionBuilder`].
#[derive(Clone)]
pub struct SpeechSession {
    inner: Arc<SessionInner>,
}

impl std::fmt::Debug for SpeechSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechSession")
            .field("state", &self.current_state())
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

impl SpeechSession {
    fn from_parts(parts: SessionParts) -> Self {
        let inner = Arc::new_cyclic(|this| SessionInner {
            this: this.clone(),
            detector: parts.detector,
            adapter: parts.adapter,
            scheduler: parts.scheduler,
            recognition: parts.recognition,
            evaluator: parts.evaluator,
            script_source: parts.script_source,
            emitter: parts.emitter,
            generation: parts.generation,
            gate: parts.gate,
            pinned_profile: parts.pinned_profile,
            core: Mutex::new(SessionCore {
                machine: SessionStateMachine::new(parts.max_attempts),
                script: Vec::new(),
                profile: None,
                transcript: None,
                next_fragment: 0,
                stop: CancellationToken::new(),
            }),
        });

        let weak = inner.this.clone();
        inner.scheduler.set_on_drained(Arc::new(move |generation| {
            if let Some(inner) = weak.upgrade() {
                inner.on_queue_drained(generation);
            }
        }));

        Self { inner }
    }

    // ── Observation ────────────────────────────────────────────────

    /// Current session state.
    #[must_use]
    pub fn current_state(&self) -> SessionState {
        self.inner.lock().machine.state()
    }

    /// Last final transcript (recognised or submitted).
    #[must_use]
    pub fn current_transcript(&self) -> Option<Transcript> {
        self.inner.lock().transcript.clone()
    }

    /// Profile the current script is read with.
    #[must_use]
    pub fn current_profile(&self) -> Option<LanguageProfile> {
        self.inner.lock().profile.clone()
    }

    /// The cached script.
    #[must_use]
    pub fn script(&self) -> Vec<String> {
        self.inner.lock().script.clone()
    }

    /// Answers still allowed before the session finishes.
    #[must_use]
    pub fn remaining_attempts(&self) -> u32 {
        self.inner.lock().machine.remaining_attempts()
    }

    /// Current generation; bumped by every playback start, pause and stop.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.inner.generation.current()
    }

    /// Which device direction currently holds the shared audio gate.
    #[must_use]
    pub fn device_owner(&self) -> DeviceOwner {
        self.inner.gate.owner()
    }

    // ── Script ─────────────────────────────────────────────────────

    /// Normalise `fragments`, pick a language profile and cache both.
    ///
    /// Uses the pinned profile when one was configured, otherwise detects
    /// the language of the whole script. Fails with
    /// [`VoiceError::UnsupportedLanguage`] (and a notice) when detection
    /// gives up, and [`VoiceError::NoScript`] when every fragment is blank.
    pub async fn build_script<I, S>(&self, fragments: I) -> Result<LanguageProfile, VoiceError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let script: Vec<String> = fragments
            .into_iter()
            .map(|f| normalize_fragment(f.as_ref()))
            .filter(|f| !f.is_empty())
            .collect();
        if script.is_empty() {
            return Err(VoiceError::NoScript);
        }
        self.ensure_can_apply(SessionTrigger::ScriptBuilt)?;

        let profile = match &self.inner.pinned_profile {
            Some(profile) => profile.clone(),
            None => match self.inner.detector.detect(&script.join(" ")).await {
                Some(profile) => profile,
                None => {
                    tracing::warn!(fragments = script.len(), "Script language undetermined");
                    self.inner.notify(UserNotice::UnsupportedLanguage);
                    return Err(VoiceError::UnsupportedLanguage);
                }
            },
        };

        let mut core = self.inner.lock();
        check(&core, SessionTrigger::ScriptBuilt)?;
        tracing::info!(
            fragments = script.len(),
            code = %profile.code,
            confidence = ?profile.confidence,
            "Script built"
        );
        core.script = script;
        core.profile = Some(profile.clone());
        core.transcript = None;
        Ok(profile)
    }

    /// Fetch the script from the configured [`ScriptSource`] and build it.
    pub async fn load_script(&self) -> Result<LanguageProfile, VoiceError> {
        let Some(source) = self.inner.script_source.clone() else {
            return Err(VoiceError::NoScript);
        };
        let fragments = source.fragments().await?;
        self.build_script(fragments).await
    }

    /// Start reading the built script.
    pub fn start_session(&self) -> Result<(), VoiceError> {
        let inner = &self.inner;
        let mut core = inner.lock();
        let Some(profile) = core.profile.clone() else {
            return Err(VoiceError::NoScript);
        };
        if core.script.is_empty() {
            return Err(VoiceError::NoScript);
        }

        inner.apply(&mut core, SessionTrigger::ScriptBuilt)?;
        inner.scheduler.set_profile(profile);
        core.next_fragment = 0;
        let script = core.script.clone();
        inner.enqueue_fragments(&mut core, &script);
        Ok(())
    }

    /// Read the cached script again from the first fragment.
    pub fn replay(&self) -> Result<(), VoiceError> {
        let inner = &self.inner;
        let mut core = inner.lock();
        if core.script.is_empty() {
            return Err(VoiceError::NoScript);
        }
        inner.apply(&mut core, SessionTrigger::Replay)?;
        core.next_fragment = 0;
        let script = core.script.clone();
        inner.enqueue_fragments(&mut core, &script);
        tracing::info!(fragments = script.len(), "Replaying script");
        Ok(())
    }

    // ── Playback control ───────────────────────────────────────────

    /// Stop audio, keeping the current fragment for [`resume`](Self::resume).
    pub fn pause(&self) -> Result<(), VoiceError> {
        let inner = &self.inner;
        let mut core = inner.lock();
        check(&core, SessionTrigger::Pause)?;
        if !inner.scheduler.pause() {
            tracing::debug!("Nothing queued to pause");
        }
        inner.apply(&mut core, SessionTrigger::Pause)?;
        Ok(())
    }

    /// Replay the paused fragment from its start and continue.
    pub fn resume(&self) -> Result<(), VoiceError> {
        let inner = &self.inner;
        let mut core = inner.lock();
        inner.apply(&mut core, SessionTrigger::Resume)?;
        inner.scheduler.resume();

        // The queue may have emptied just as the pause landed.
        if inner.scheduler.is_empty() && !inner.scheduler.is_draining() {
            inner.apply(&mut core, SessionTrigger::QueueDrained)?;
        }
        Ok(())
    }

    /// Stop all audio and microphone activity. Synchronous, idempotent and
    /// safe to call from any thread at any time.
    pub fn hard_stop(&self) {
        self.inner.hard_stop();
    }

    // ── Answers ────────────────────────────────────────────────────

    /// Listen for one spoken answer, then evaluate it and queue the response.
    ///
    /// Returns the recognised transcript. A no-speech result returns the
    /// session to `asking` without using up an attempt.
    pub async fn listen(&self) -> Result<Transcript, VoiceError> {
        let recognition = self.recognition()?;
        let (ticket, locale, stop) = self.begin_listening()?;

        let result = tokio::select! {
            biased;
            () = stop.cancelled() => {
                recognition.cancel();
                Err(VoiceError::Cancelled)
            }
            r = recognition.start_once(&locale) => r,
        };
        let transcript = self.finish_recognition(&ticket, result)?;
        self.submit(transcript.clone()).await?;
        Ok(transcript)
    }

    /// Start press-and-hold capture. Interim transcripts arrive as
    /// [`SessionEvent::Transcript`] events.
    pub fn begin_hold(&self) -> Result<(), VoiceError> {
        let recognition = self.recognition()?;
        let inner = &self.inner;
        let mut core = inner.lock();
        check(&core, SessionTrigger::ListenStarted)?;
        let locale = listen_locale(&core)?;

        let ticket = inner.generation.ticket();
        let emitter = Arc::clone(&inner.emitter);
        let on_partial = Arc::new(move |partial: Transcript| {
            if ticket.is_current() {
                emitter.emit(SessionEvent::Transcript(partial));
            }
        });

        if let Err(e) = recognition.start_continuous(&locale, on_partial) {
            drop(core);
            return Err(self.recognition_start_failed(e));
        }
        inner.apply(&mut core, SessionTrigger::ListenStarted)?;
        Ok(())
    }

    /// Finish press-and-hold capture, then evaluate the answer.
    pub async fn end_hold(&self) -> Result<Transcript, VoiceError> {
        let recognition = self.recognition()?;
        let ticket = self.inner.generation.ticket();

        let result = match recognition.stop().await {
            Err(e @ VoiceError::ResourceConflict(_)) => return Err(e),
            other => other,
        };
        let transcript = self.finish_recognition(&ticket, result)?;
        self.submit(transcript.clone()).await?;
        Ok(transcript)
    }

    /// Submit an answer that was not spoken (typed, or chosen on screen).
    ///
    /// Allowed while asking or listening; a running capture is cancelled.
    pub async fn submit_answer(&self, transcript: Transcript) -> Result<Evaluation, VoiceError> {
        if self.current_state() == SessionState::Listening {
            if let Some(recognition) = &self.inner.recognition {
                recognition.cancel();
            }
        }
        self.submit(Transcript::final_text(transcript.text)).await
    }

    // ── Internals ──────────────────────────────────────────────────

    fn recognition(&self) -> Result<Arc<SpeechRecognitionController>, VoiceError> {
        self.inner
            .recognition
            .clone()
            .ok_or(VoiceError::NoInputDevice)
    }

    fn ensure_can_apply(&self, trigger: SessionTrigger) -> Result<(), VoiceError> {
        check(&self.inner.lock(), trigger)
    }

    fn begin_listening(
        &self,
    ) -> Result<(GenerationTicket, String, CancellationToken), VoiceError> {
        let inner = &self.inner;
        let mut core = inner.lock();
        check(&core, SessionTrigger::ListenStarted)?;
        if inner.adapter.is_speaking() {
            return Err(VoiceError::ResourceConflict(
                "cannot listen while audio is playing".to_string(),
            ));
        }
        let locale = listen_locale(&core)?;
        inner.apply(&mut core, SessionTrigger::ListenStarted)?;
        Ok((inner.generation.ticket(), locale, core.stop.clone()))
    }

    fn recognition_start_failed(&self, error: VoiceError) -> VoiceError {
        if error.is_terminal() {
            if let Some(notice) = error.notice() {
                self.inner.notify(notice);
            }
            self.inner.hard_stop();
        }
        error
    }

    /// Map a recognition result onto the session.
    fn finish_recognition(
        &self,
        ticket: &GenerationTicket,
        result: Result<Transcript, VoiceError>,
    ) -> Result<Transcript, VoiceError> {
        if !ticket.is_current() {
            tracing::debug!(generation = ticket.generation(), "Discarding stale recognition result");
            return Err(VoiceError::Cancelled);
        }

        let error = match result {
            Ok(transcript) => return Ok(transcript),
            Err(e) => e,
        };

        if error.is_terminal() {
            tracing::warn!(error = %error, "Recognition failed, stopping session");
            if let Some(notice) = error.notice() {
                self.inner.notify(notice);
            }
            self.inner.hard_stop();
            return Err(error);
        }

        let mut core = self.inner.lock();
        // A submitted answer may have cancelled the capture already.
        if core.machine.state() != SessionState::Listening {
            return Err(error);
        }
        tracing::info!(error = %error, "Recognition ended without an answer");
        self.inner
            .apply(&mut core, SessionTrigger::RecognitionFailed)?;
        drop(core);
        if let Some(notice) = error.notice() {
            self.inner.notify(notice);
        }
        Err(error)
    }

    /// Evaluate `answer` and queue the response.
    async fn submit(&self, answer: Transcript) -> Result<Evaluation, VoiceError> {
        let inner = &self.inner;
        let (ticket, context) = {
            let mut core = inner.lock();
            inner.apply(&mut core, SessionTrigger::FinalTranscript)?;
            core.transcript = Some(answer.clone());
            inner.emitter.emit(SessionEvent::Transcript(answer.clone()));

            let context = AnswerContext {
                answer,
                attempt: core.machine.attempts(),
                remaining: core.machine.remaining_attempts(),
                script: core.script.clone(),
                profile: core.profile.clone(),
            };
            (inner.generation.ticket(), context)
        };

        tracing::info!(attempt = context.attempt, remaining = context.remaining, "Evaluating answer");
        let evaluation = inner.evaluator.evaluate(context).await;

        let mut core = inner.lock();
        if !ticket.is_current() || core.machine.state() != SessionState::Analyzing {
            tracing::debug!("Discarding evaluation after stop");
            return Err(VoiceError::Cancelled);
        }
        if evaluation.finished {
            core.machine.request_finish();
        }

        let response: Vec<String> = evaluation
            .response
            .iter()
            .map(|f| normalize_fragment(f))
            .filter(|f| !f.is_empty())
            .collect();
        if response.is_empty() {
            inner.apply(&mut core, SessionTrigger::QueueDrained)?;
        } else {
            inner.enqueue_fragments(&mut core, &response);
        }
        Ok(evaluation)
    }
}

fn check(core: &SessionCore, trigger: SessionTrigger) -> Result<(), VoiceError> {
    if core.machine.can_apply(trigger) {
        Ok(())
    } else {
        Err(TransitionError {
            from: core.machine.state(),
            trigger,
        }
        .into())
    }
}

fn listen_locale(core: &SessionCore) -> Result<String, VoiceError> {
    core.profile
        .as_ref()
        .map(|p| p.recognition_locale.clone())
        .ok_or(VoiceError::NoScript)
}

/// Everything [`SessionBuilder`] hands to a new session.
struct SessionParts {
    detector: LanguageDetector,
    adapter: Arc<SpeechSynthesisAdapter>,
    scheduler: AudioQueueScheduler,
    recognition: Option<Arc<SpeechRecognitionController>>,
    evaluator: Arc<dyn AnswerEvaluator>,
    script_source: Option<Arc<dyn ScriptSource>>,
    emitter: Arc<dyn SessionEventEmitter>,
    generation: GenerationCounter,
    gate: DeviceGate,
    pinned_profile: Option<LanguageProfile>,
    max_attempts: u32,
}
