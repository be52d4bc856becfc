//! Speech synthesis adapter: one fragment in, played audio out.
//!
//! [`SpeechSynthesisAdapter::speak`] resolves when the sink reports the
//! clip finished. [`SpeechSynthesisAdapter::cancel`] is synchronous: it
//! cancels the live [`PlaybackSession`], stops the sink and releases the
//! output lease before returning, whatever point `speak` has reached.
//!
//! Provider policy: a transient failure of the primary provider is retried
//! once; after that (or on a permanent failure) the fallback engine is used
//! if one is configured.

use std::sync::{Arc, Mutex, PoisonError};

use kidvox_core::{
    AudioFormat, LanguageProfile, ProviderError, Settings, SynthesisProvider, SynthesisRequest,
    SynthesizedAudio,
};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::audio_io::AudioSink;
use crate::error::VoiceError;
use crate::gate::{DeviceGate, DeviceLease};
use crate::text_utils::normalize_fragment;

/// One in-flight synthesis + playback.
///
/// Created by the scheduler for each fragment and handed to the adapter by
/// reference; the adapter keeps a clone of the cancel token while live.
#[derive(Debug, Clone)]
pub struct PlaybackSession {
    generation: u64,
    cancel: CancellationToken,
}

impl PlaybackSession {
    /// New session for `generation`.
    #[must_use]
    pub fn new(generation: u64) -> Self {
        Self {
            generation,
            cancel: CancellationToken::new(),
        }
    }

    /// Generation captured when the session was created.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Cancel this session.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the session has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

struct LiveHandle {
    generation: u64,
    cancel: CancellationToken,
    _lease: DeviceLease,
}

/// Adapter between fragments and the synthesis providers + audio sink.
pub struct SpeechSynthesisAdapter {
    primary: Option<Arc<dyn SynthesisProvider>>,
    fallback: Option<Arc<dyn SynthesisProvider>>,
    sink: Arc<dyn AudioSink>,
    gate: DeviceGate,
    settings: Settings,
    live: Mutex<Option<LiveHandle>>,
}

impl SpeechSynthesisAdapter {
    /// Create an adapter playing through `sink`.
    #[must_use]
    pub fn new(sink: Arc<dyn AudioSink>, gate: DeviceGate, settings: Settings) -> Self {
        Self {
            primary: None,
            fallback: None,
            sink,
            gate,
            settings,
            live: Mutex::new(None),
        }
    }

    /// Set the primary (high-fidelity) provider.
    #[must_use]
    pub fn with_primary(mut self, provider: Arc<dyn SynthesisProvider>) -> Self {
        self.primary = Some(provider);
        self
    }

    /// Set the built-in fallback provider.
    #[must_use]
    pub fn with_fallback(mut self, provider: Arc<dyn SynthesisProvider>) -> Self {
        self.fallback = Some(provider);
        self
    }

    /// Whether a playback session is live.
    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.lock_live().is_some()
    }

    /// Speak one fragment, resolving when playback physically finishes.
    ///
    /// Any live prior handle is cancelled first. Blank fragments complete
    /// immediately. Returns [`VoiceError::Cancelled`] if `session` is
    /// cancelled (directly or via [`cancel`](Self::cancel)) before the audio
    /// finished.
    pub async fn speak(
        &self,
        session: &PlaybackSession,
        text: &str,
        profile: &LanguageProfile,
    ) -> Result<(), VoiceError> {
        self.cancel();

        let text = normalize_fragment(text);
        if text.is_empty() {
            tracing::debug!("Skipping blank fragment");
            return Ok(());
        }
        if session.is_cancelled() {
            return Err(VoiceError::Cancelled);
        }

        let lease = self.gate.acquire_output()?;
        *self.lock_live() = Some(LiveHandle {
            generation: session.generation,
            cancel: session.cancel.clone(),
            _lease: lease,
        });

        let result = self.synthesize_and_play(session, &text, profile).await;
        self.release(session.generation);
        result
    }

    /// Stop output immediately and release the live handle and sink.
    ///
    /// Synchronous and idempotent.
    pub fn cancel(&self) {
        let live = self.lock_live().take();
        if let Some(live) = live {
            live.cancel.cancel();
            self.sink.stop();
            tracing::debug!(generation = live.generation, "Playback cancelled");
        }
    }

    async fn synthesize_and_play(
        &self,
        session: &PlaybackSession,
        text: &str,
        profile: &LanguageProfile,
    ) -> Result<(), VoiceError> {
        let cancel = &session.cancel;

        let audio = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(VoiceError::Cancelled),
            audio = self.synthesize(text, profile) => audio?,
        };
        if cancel.is_cancelled() {
            return Err(VoiceError::Cancelled);
        }

        let (done_tx, done_rx) = oneshot::channel();
        self.sink.play(
            audio,
            Box::new(move || {
                let _ = done_tx.send(());
            }),
        )?;

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                // Covers a cancel that raced the play() call above.
                self.sink.stop();
                Err(VoiceError::Cancelled)
            }
            done = done_rx => done.map_err(|_| VoiceError::Cancelled),
        }
    }

    async fn synthesize(
        &self,
        text: &str,
        profile: &LanguageProfile,
    ) -> Result<SynthesizedAudio, VoiceError> {
        let request = SynthesisRequest {
            text: text.to_string(),
            locale: profile.code.clone(),
            voice: profile.synthesis_voice.clone(),
            prosody: self.settings.effective_prosody(profile),
            output_format: self.settings.effective_output_format(),
        };

        let mut last_error: Option<ProviderError> = None;

        if let Some(primary) = &self.primary {
            match primary.synthesize(&request).await {
                Ok(audio) => return Ok(audio),
                Err(e) if e.is_transient() => {
                    tracing::warn!(provider = primary.name(), error = %e, "Synthesis failed, retrying once");
                    match primary.synthesize(&request).await {
                        Ok(audio) => return Ok(audio),
                        Err(e) => last_error = Some(e),
                    }
                }
                Err(e) => last_error = Some(e),
            }
        }

        if let Some(fallback) = &self.fallback {
            if let Some(e) = &last_error {
                tracing::warn!(error = %e, fallback = fallback.name(), "Falling back to built-in synthesis");
            }
            let request = SynthesisRequest {
                output_format: AudioFormat::Wav16k,
                ..request
            };
            return fallback
                .synthesize(&request)
                .await
                .map_err(|e| VoiceError::SynthesisFailed(e.to_string()));
        }

        Err(VoiceError::SynthesisFailed(last_error.map_or_else(
            || "no synthesis provider configured".to_string(),
            |e| e.to_string(),
        )))
    }

    fn release(&self, generation: u64) {
        let mut live = self.lock_live();
        if live.as_ref().is_some_and(|l| l.generation == generation) {
            *live = None;
        }
    }

    fn lock_live(&self) -> std::sync::MutexGuard<'_, Option<LiveHandle>> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
