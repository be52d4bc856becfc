//! CLI bootstrap - the composition root.
//!
//! This module is the only place where the CLI wires concrete speech
//! providers and audio devices together:
//! - Settings from the environment (via kidvox-core)
//! - Cloud synthesis, recognition and detection adapters (via kidvox-voice)
//! - The `espeak-ng` fallback engine
//! - WAV-file output, or the default speaker and microphone
//!
//! Command handlers receive a [`CliContext`] and ask it for what they need.

use std::sync::Arc;

use anyhow::{Context, Result};
use kidvox_core::{
    LanguageDetectionService, RecognitionProvider, Settings, SynthesisProvider, validate_settings,
};
use kidvox_voice::backend::{
    CloudRecognitionProvider, CloudSynthesisProvider, EspeakSynthesisProvider,
    RemoteLanguageDetector, SpeechTokenIssuer,
};
use kidvox_voice::{AudioSink, AudioSource, LanguageDetector, SessionBuilder, WavFileSink};

use crate::commands::OutputArgs;
use crate::error::CliError;

/// Fully composed context for CLI commands.
#[derive(Debug, Clone)]
pub struct CliContext {
    /// Validated settings.
    pub settings: Settings,
}

impl CliContext {
    /// Context over explicit settings.
    pub const fn new(settings: Settings) -> Self {
        Self { settings }
    }

    /// Load and validate settings from `KIDVOX_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let settings = Settings::from_env()?;
        validate_settings(&settings)?;
        tracing::debug!(
            cloud = settings.has_cloud_credentials(),
            remote_detection = settings.detection_endpoint.is_some(),
            "Settings loaded"
        );
        Ok(Self::new(settings))
    }

    /// Shared token issuer, when cloud credentials are configured.
    pub fn cloud_tokens(&self) -> Result<Option<SpeechTokenIssuer>> {
        if !self.settings.has_cloud_credentials() {
            return Ok(None);
        }
        let tokens = SpeechTokenIssuer::from_settings(&self.settings)
            .context("Failed to configure speech token issuer")?;
        Ok(Some(tokens))
    }

    /// Remote detection service, when an endpoint is configured.
    fn detection_service(&self) -> Result<Option<Arc<dyn LanguageDetectionService>>> {
        let remote = RemoteLanguageDetector::from_settings(&self.settings)
            .context("Failed to configure language detection service")?;
        Ok(remote.map(|r| Arc::new(r) as Arc<dyn LanguageDetectionService>))
    }

    /// Language detector; `local_only` skips the remote tier.
    pub fn detector(&self, local_only: bool) -> Result<LanguageDetector> {
        let remote = if local_only {
            None
        } else {
            self.detection_service()?
        };
        Ok(LanguageDetector::from_settings(&self.settings, remote))
    }

    /// Session builder with synthesis, fallback, detection and the sink of
    /// `output` wired in. Recognition is left to the caller.
    pub fn session_builder(&self, output: &AudioOutput) -> Result<SessionBuilder> {
        let mut builder = SessionBuilder::new(self.settings.clone())
            .sink(Arc::clone(&output.sink))
            .fallback(Arc::new(EspeakSynthesisProvider::new()));

        if let Some(tokens) = self.cloud_tokens()? {
            let tts = CloudSynthesisProvider::from_settings(&self.settings, tokens)
                .context("Failed to configure cloud synthesis")?;
            builder = builder.synthesis(Arc::new(tts) as Arc<dyn SynthesisProvider>);
        } else {
            tracing::info!("No cloud speech credentials, using the built-in voice");
        }

        if let Some(service) = self.detection_service()? {
            builder = builder.detection_service(service);
        }
        Ok(builder)
    }

    /// Cloud recognition provider. Recognition has no local engine.
    pub fn recognizer(&self) -> Result<Arc<dyn RecognitionProvider>> {
        let tokens = self.cloud_tokens()?.ok_or_else(|| {
            CliError::Config(
                "speech recognition needs KIDVOX_SPEECH_REGION and KIDVOX_SPEECH_KEY".to_string(),
            )
        })?;
        let stt = CloudRecognitionProvider::from_settings(&self.settings, tokens)
            .context("Failed to configure cloud recognition")?;
        Ok(Arc::new(stt))
    }
}

/// Where a session's audio goes, and the microphone that came with it.
pub struct AudioOutput {
    /// Playback target.
    pub sink: Arc<dyn AudioSink>,
    /// The file sink, when writing clips to disk.
    pub files: Option<Arc<WavFileSink>>,
    /// Live microphone opened alongside a live speaker.
    pub microphone: Option<Arc<dyn AudioSource>>,
}

impl AudioOutput {
    /// Open the output selected by `args`.
    pub fn open(args: &OutputArgs) -> Result<Self> {
        #[cfg(feature = "local-audio")]
        if args.live {
            let (speaker, microphone) = kidvox_voice::open_local_audio()?;
            return Ok(Self {
                sink: speaker,
                files: None,
                microphone: Some(microphone),
            });
        }

        let files = Arc::new(
            WavFileSink::new(&args.out_dir)
                .with_context(|| format!("Cannot write clips to {}", args.out_dir.display()))?
                .with_realtime(args.realtime),
        );
        Ok(Self {
            sink: Arc::clone(&files) as Arc<dyn AudioSink>,
            files: Some(files),
            microphone: None,
        })
    }

    /// Print where the clips went.
    pub fn report(&self) {
        if let Some(files) = &self.files {
            println!(
                "Wrote {} clip(s) to {}",
                files.clips_written(),
                files.dir().display()
            );
        }
    }
}
