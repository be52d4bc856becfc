//! Assembles a [`SpeechSession`] from providers, devices and strategies.

use std::sync::Arc;
use std::time::Duration;

use kidvox_core::{
    LanguageDetectionService, LanguageProfile, NoopEmitter, RecognitionProvider, SessionEvent,
    SessionEventEmitter, Settings, SynthesisProvider, validate_settings,
};
use tokio::sync::mpsc;

use super::{AnswerEvaluator, ScriptSource, SessionParts, SilentEvaluator, SpeechSession};
use crate::audio_io::{AudioSink, AudioSource};
use crate::detector::LanguageDetector;
use crate::emitter::ChannelEmitter;
use crate::error::VoiceError;
use crate::gate::DeviceGate;
use crate::generation::GenerationCounter;
use crate::recognition::SpeechRecognitionController;
use crate::scheduler::AudioQueueScheduler;
use crate::synthesis::SpeechSynthesisAdapter;

/// Builder for [`SpeechSession`].
///
/// An audio sink and at least one synthesis provider are required.
/// Recognition is optional; without it [`SpeechSession::listen`] fails with
/// [`VoiceError::NoInputDevice`].
///
/// ```ignore
/// let (session, mut events) = SessionBuilder::new(settings)
///     .sink(sink)
///     .synthesis(cloud_tts)
///     .fallback(espeak)
///     .recognition(cloud_stt, microphone)
///     .evaluator(quiz)
///     .build_with_events()?;
/// ```
#[must_use]
pub struct SessionBuilder {
    settings: Settings,
    sink: Option<Arc<dyn AudioSink>>,
    synthesis: Option<Arc<dyn SynthesisProvider>>,
    fallback: Option<Arc<dyn SynthesisProvider>>,
    recognition: Option<(Arc<dyn RecognitionProvider>, Arc<dyn AudioSource>)>,
    detection: Option<Arc<dyn LanguageDetectionService>>,
    profile: Option<LanguageProfile>,
    evaluator: Option<Arc<dyn AnswerEvaluator>>,
    script_source: Option<Arc<dyn ScriptSource>>,
}

impl SessionBuilder {
    /// Start from `settings`.
    pub const fn new(settings: Settings) -> Self {
        Self {
            settings,
            sink: None,
            synthesis: None,
            fallback: None,
            recognition: None,
            detection: None,
            profile: None,
            evaluator: None,
            script_source: None,
        }
    }

    /// Where synthesised audio is played.
    pub fn sink(mut self, sink: Arc<dyn AudioSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Primary synthesis provider.
    pub fn synthesis(mut self, provider: Arc<dyn SynthesisProvider>) -> Self {
        self.synthesis = Some(provider);
        self
    }

    /// Built-in fallback engine. Ignored when the settings disable it.
    pub fn fallback(mut self, provider: Arc<dyn SynthesisProvider>) -> Self {
        self.fallback = Some(provider);
        self
    }

    /// Recognition provider and the microphone it listens through.
    pub fn recognition(
        mut self,
        provider: Arc<dyn RecognitionProvider>,
        source: Arc<dyn AudioSource>,
    ) -> Self {
        self.recognition = Some((provider, source));
        self
    }

    /// Remote language-detection service tried before the local heuristic.
    pub fn detection_service(mut self, service: Arc<dyn LanguageDetectionService>) -> Self {
        self.detection = Some(service);
        self
    }

    /// Skip detection and always use `profile`.
    pub fn profile(mut self, profile: LanguageProfile) -> Self {
        self.profile = Some(profile);
        self
    }

    /// How answers are judged. Defaults to [`SilentEvaluator`].
    pub fn evaluator(mut self, evaluator: Arc<dyn AnswerEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    /// Where [`SpeechSession::load_script`] gets its fragments.
    pub fn script_source(mut self, source: Arc<dyn ScriptSource>) -> Self {
        self.script_source = Some(source);
        self
    }

    /// Build a session whose events are discarded.
    pub fn build(self) -> Result<SpeechSession, VoiceError> {
        self.build_with_emitter(Arc::new(NoopEmitter::new()))
    }

    /// Build a session and the receiving end of its event stream.
    pub fn build_with_events(
        self,
    ) -> Result<(SpeechSession, mpsc::UnboundedReceiver<SessionEvent>), VoiceError> {
        let (emitter, events) = ChannelEmitter::channel();
        let session = self.build_with_emitter(Arc::new(emitter))?;
        Ok((session, events))
    }

    /// Build a session reporting to `emitter`.
    ///
    /// `emitter` is called with session locks held; it must not block or
    /// call back into the session.
    pub fn build_with_emitter(
        self,
        emitter: Arc<dyn SessionEventEmitter>,
    ) -> Result<SpeechSession, VoiceError> {
        validate_settings(&self.settings).map_err(|e| VoiceError::Configuration(e.to_string()))?;

        let sink = self
            .sink
            .ok_or_else(|| VoiceError::Configuration("no audio sink configured".to_string()))?;
        let fallback = self
            .fallback
            .filter(|_| self.settings.effective_fallback_engine());
        if self.synthesis.is_none() && fallback.is_none() {
            return Err(VoiceError::Configuration(
                "no synthesis provider configured".to_string(),
            ));
        }

        let gate = DeviceGate::new();
        let generation = GenerationCounter::new();

        let mut adapter = SpeechSynthesisAdapter::new(sink, gate.clone(), self.settings.clone());
        if let Some(primary) = self.synthesis {
            adapter = adapter.with_primary(primary);
        }
        if let Some(fallback) = fallback {
            adapter = adapter.with_fallback(fallback);
        }
        let adapter = Arc::new(adapter);

        let scheduler = AudioQueueScheduler::new(
            Arc::clone(&adapter),
            generation.clone(),
            Duration::from_millis(self.settings.effective_guard_delay_ms()),
        );

        let recognition = self.recognition.map(|(provider, source)| {
            Arc::new(SpeechRecognitionController::new(
                provider,
                source,
                gate.clone(),
                self.settings.recognition.clone(),
            ))
        });

        let detector = LanguageDetector::from_settings(&self.settings, self.detection);

        tracing::debug!(
            recognition = recognition.is_some(),
            pinned_profile = self.profile.is_some(),
            max_attempts = self.settings.effective_max_attempts(),
            "Speech session assembled"
        );

        Ok(SpeechSession::from_parts(SessionParts {
            detector,
            adapter,
            scheduler,
            recognition,
            evaluator: self
                .evaluator
                .unwrap_or_else(|| Arc::new(SilentEvaluator)),
            script_source: self.script_source,
            emitter,
            generation,
            gate,
            pinned_profile: self.profile,
            max_attempts: self.settings.effective_max_attempts(),
        }))
    }
}
