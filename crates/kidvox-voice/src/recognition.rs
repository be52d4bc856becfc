//! Speech recognition controller: one microphone session at a time.
//!
//! Two capture modes:
//!
//! - [`start_once`](SpeechRecognitionController::start_once) captures a
//!   single utterance, ended by energy endpointing, and returns its
//!   transcript.
//! - [`start_continuous`](SpeechRecognitionController::start_continuous)
//!   captures until [`stop`](SpeechRecognitionController::stop)
//!   (press-and-hold), producing interim transcripts periodically from the
//!   audio captured so far.
//!
//! A second start while a session is active is rejected with
//! [`VoiceError::ResourceConflict`]. `stop()` and `cancel()` release the
//! microphone before returning.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use kidvox_core::{
    ProviderError, RecognitionProvider, RecognitionRequest, RecognitionSettings, Transcript,
};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::audio_io::AudioSource;
use crate::endpoint::{EndpointEvent, EnergyEndpointer};
use crate::error::VoiceError;
use crate::gate::{DeviceGate, DeviceLease};

/// Callback receiving interim transcripts in press-and-hold mode.
pub type PartialCallback = Arc<dyn Fn(Transcript) + Send + Sync + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CaptureMode {
    Once,
    Continuous,
}

struct ActiveCapture {
    id: u64,
    mode: CaptureMode,
    locale: String,
    cancel: CancellationToken,
    _lease: DeviceLease,
}

/// Controller owning the microphone source and the recognition provider.
pub struct SpeechRecognitionController {
    provider: Arc<dyn RecognitionProvider>,
    source: Arc<dyn AudioSource>,
    gate: DeviceGate,
    config: RecognitionSettings,
    /// Root token; `cancel()` swaps it so in-flight provider calls stop too.
    root: Mutex<CancellationToken>,
    active: Mutex<Option<ActiveCapture>>,
    next_id: AtomicU64,
}

impl SpeechRecognitionController {
    /// Create a controller.
    #[must_use]
    pub fn new(
        provider: Arc<dyn RecognitionProvider>,
        source: Arc<dyn AudioSource>,
        gate: DeviceGate,
        config: RecognitionSettings,
    ) -> Self {
        Self {
            provider,
            source,
            gate,
            config,
            root: Mutex::new(CancellationToken::new()),
            active: Mutex::new(None),
            next_id: AtomicU64::new(0),
        }
    }

    /// Whether a capture session holds the microphone.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.lock_active().is_some()
    }

    /// Capture one utterance and recognize it.
    ///
    /// Fails with [`VoiceError::NoSpeech`] when endpointing times out or the
    /// provider hears nothing, and [`VoiceError::Cancelled`] after
    /// [`cancel`](Self::cancel).
    pub async fn start_once(&self, locale: &str) -> Result<Transcript, VoiceError> {
        let (id, cancel) = self.begin(CaptureMode::Once, locale)?;
        tracing::info!(locale, "Listening for one utterance");

        let endpoint = self.await_endpoint(id, &cancel).await;
        let samples = self.finish_capture(id)?;
        endpoint?;

        let text = self.recognize(locale, samples, &cancel).await?;
        Ok(Transcript::final_text(text))
    }

    /// Start press-and-hold capture. Interim transcripts are delivered to
    /// `on_partial` every `partial_interval_ms` while audio keeps arriving.
    pub fn start_continuous(
        self: &Arc<Self>,
        locale: &str,
        on_partial: PartialCallback,
    ) -> Result<(), VoiceError> {
        let (id, cancel) = self.begin(CaptureMode::Continuous, locale)?;
        tracing::info!(locale, "Press-and-hold capture started");

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return Ok(());
        };
        let controller = Arc::clone(self);
        let locale = locale.to_string();
        runtime.spawn(async move {
            controller
                .run_partials(id, &locale, &cancel, on_partial)
                .await;
        });
        Ok(())
    }

    /// Finish press-and-hold capture and recognize everything captured.
    ///
    /// The microphone is released before the provider is called.
    pub async fn stop(&self) -> Result<Transcript, VoiceError> {
        let (id, locale, cancel) = {
            let active = self.lock_active();
            match active.as_ref() {
                Some(a) if a.mode == CaptureMode::Continuous => {
                    (a.id, a.locale.clone(), a.cancel.clone())
                }
                _ => {
                    return Err(VoiceError::ResourceConflict(
                        "no press-and-hold capture is active".to_string(),
                    ));
                }
            }
        };

        let samples = self.finish_capture(id)?;
        tracing::info!(samples = samples.len(), "Press-and-hold capture stopped");
        if samples.is_empty() {
            return Err(VoiceError::NoSpeech);
        }

        // Stop the interim task; the final call hangs off the root so a
        // later cancel() still reaches it.
        cancel.cancel();
        let final_token = self.lock_root().child_token();

        let text = self.recognize(&locale, samples, &final_token).await?;
        Ok(Transcript::final_text(text))
    }

    /// Abort any capture and in-flight recognition. Synchronous, idempotent.
    pub fn cancel(&self) {
        let old_root = std::mem::replace(&mut *self.lock_root(), CancellationToken::new());
        old_root.cancel();

        let active = self.lock_active().take();
        if let Some(active) = active {
            active.cancel.cancel();
            if let Err(e) = self.source.stop_capture() {
                tracing::warn!(error = %e, "Failed to stop capture during cancel");
            }
            tracing::debug!(id = active.id, "Recognition cancelled");
        }
    }

    fn begin(&self, mode: CaptureMode, locale: &str) -> Result<(u64, CancellationToken), VoiceError> {
        let mut active = self.lock_active();
        if active.is_some() {
            return Err(VoiceError::ResourceConflict(
                "a recognition session is already active".to_string(),
            ));
        }

        let lease = self.gate.acquire_input()?;
        self.source.start_capture()?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = self.lock_root().child_token();
        *active = Some(ActiveCapture {
            id,
            mode,
            locale: locale.to_string(),
            cancel: cancel.clone(),
            _lease: lease,
        });
        Ok((id, cancel))
    }

    /// Stop the source and release the lease if `id` still owns it.
    fn finish_capture(&self, id: u64) -> Result<Vec<f32>, VoiceError> {
        let mut active = self.lock_active();
        if !active.as_ref().is_some_and(|a| a.id == id) {
            return Err(VoiceError::Cancelled);
        }
        let samples = self.source.stop_capture();
        *active = None;
        samples
    }

    async fn await_endpoint(&self, id: u64, cancel: &CancellationToken) -> Result<(), VoiceError> {
        let mut endpointer = EnergyEndpointer::new(RecognitionSettings {
            sample_rate: self.source.sample_rate(),
            ..self.config.clone()
        });
        let mut ticker = tokio::time::interval(poll_interval(&self.config));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut offset = 0;

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(VoiceError::Cancelled),
                _ = ticker.tick() => {}
            }
            if !self.lock_active().as_ref().is_some_and(|a| a.id == id) {
                return Err(VoiceError::Cancelled);
            }

            let chunk = self.source.captured_since(offset)?;
            offset += chunk.len();
            match endpointer.feed(&chunk) {
                Some(EndpointEvent::UtteranceEnd) => return Ok(()),
                Some(EndpointEvent::NoSpeech) => {
                    tracing::info!(elapsed_ms = endpointer.elapsed_ms(), "No speech detected");
                    return Err(VoiceError::NoSpeech);
                }
                Some(EndpointEvent::SpeechStart) | None => {}
            }
        }
    }

    async fn run_partials(
        &self,
        id: u64,
        locale: &str,
        cancel: &CancellationToken,
        on_partial: PartialCallback,
    ) {
        let interval = Duration::from_millis(u64::from(self.config.partial_interval_ms.max(100)));
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_len = 0;

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                _ = ticker.tick() => {}
            }
            if !self.lock_active().as_ref().is_some_and(|a| a.id == id) {
                return;
            }

            let samples = match self.source.captured_since(0) {
                Ok(samples) => samples,
                Err(e) => {
                    tracing::warn!(error = %e, "Interim capture read failed");
                    return;
                }
            };
            if samples.len() == last_len {
                continue;
            }
            last_len = samples.len();

            let request = RecognitionRequest {
                locale: locale.to_string(),
                samples,
                sample_rate: self.source.sample_rate(),
            };
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                r = self.provider.recognize(&request) => r,
            };
            match result {
                Ok(r) if !r.text.trim().is_empty() => {
                    on_partial(Transcript::partial(r.text.trim()));
                }
                Ok(_) | Err(ProviderError::NoSpeech) => {}
                Err(e) => tracing::debug!(error = %e, "Interim recognition failed"),
            }
        }
    }

    /// Call the provider, retrying a transient failure once.
    async fn recognize(
        &self,
        locale: &str,
        samples: Vec<f32>,
        cancel: &CancellationToken,
    ) -> Result<String, VoiceError> {
        let request = RecognitionRequest {
            locale: locale.to_string(),
            samples,
            sample_rate: self.source.sample_rate(),
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(VoiceError::Cancelled),
                r = self.provider.recognize(&request) => r,
            };

            match result {
                Ok(r) => {
                    let text = r.text.trim();
                    if text.is_empty() {
                        return Err(VoiceError::NoSpeech);
                    }
                    tracing::debug!(provider = self.provider.name(), confidence = r.confidence, "Recognized");
                    return Ok(text.to_string());
                }
                Err(e) if e.is_transient() && attempt == 1 => {
                    tracing::warn!(provider = self.provider.name(), error = %e, "Recognition failed, retrying once");
                }
                Err(e) => return Err(VoiceError::from_recognition(e)),
            }
        }
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveCapture>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_root(&self) -> MutexGuard<'_, CancellationToken> {
        self.root.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn poll_interval(config: &RecognitionSettings) -> Duration {
    Duration::from_millis(u64::from(config.poll_interval_ms.max(10)))
}
