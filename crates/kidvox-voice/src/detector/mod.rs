//! Language detection: chooses the voice and recognition locale for a script.
//!
//! The remote detection service is consulted first, bounded by a timeout.
//! Any failure, timeout or absence of the service falls through to the
//! local [`heuristic`]. A remote answer that arrives in time always wins
//! over the heuristic.

mod heuristic;

use std::sync::Arc;
use std::time::Duration;

use kidvox_core::{
    Confidence, DEFAULT_DETECTION_PREFIX_CHARS, DEFAULT_DETECTION_TIMEOUT_MS, DetectedLanguage,
    Language, LanguageDetectionService, LanguageProfile, Settings,
};

pub use heuristic::detect_language;

/// Two-tier language detector.
#[derive(Clone)]
pub struct LanguageDetector {
    remote: Option<Arc<dyn LanguageDetectionService>>,
    timeout: Duration,
    prefix_chars: usize,
}

impl Default for LanguageDetector {
    fn default() -> Self {
        Self::local_only()
    }
}

impl std::fmt::Debug for LanguageDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LanguageDetector")
            .field("remote", &self.remote.is_some())
            .field("timeout", &self.timeout)
            .field("prefix_chars", &self.prefix_chars)
            .finish()
    }
}

impl LanguageDetector {
    /// Detector using only the local heuristic.
    #[must_use]
    pub const fn local_only() -> Self {
        Self {
            remote: None,
            timeout: Duration::from_millis(DEFAULT_DETECTION_TIMEOUT_MS),
            prefix_chars: DEFAULT_DETECTION_PREFIX_CHARS,
        }
    }

    /// Detector configured from settings, with an optional remote service.
    #[must_use]
    pub fn from_settings(
        settings: &Settings,
        remote: Option<Arc<dyn LanguageDetectionService>>,
    ) -> Self {
        Self {
            remote,
            timeout: Duration::from_millis(settings.effective_detection_timeout_ms()),
            prefix_chars: settings.effective_detection_prefix_chars(),
        }
    }

    /// Use `service` as the first tier.
    #[must_use]
    pub fn with_remote(mut self, service: Arc<dyn LanguageDetectionService>) -> Self {
        self.remote = Some(service);
        self
    }

    /// Time budget for the remote call.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Detect the language of `text`.
    ///
    /// Returns `None` for blank text and when neither tier is confident;
    /// callers must refuse to start a session in that case.
    pub async fn detect(&self, text: &str) -> Option<LanguageProfile> {
        if text.trim().is_empty() {
            return None;
        }

        if let Some(remote) = &self.remote {
            let prefix: String = text.chars().take(self.prefix_chars).collect();
            match tokio::time::timeout(self.timeout, remote.detect(&prefix)).await {
                Ok(Ok(detected)) => {
                    if let Some(profile) = profile_from_remote(detected) {
                        tracing::debug!(code = %profile.code, "Language detected remotely");
                        return Some(profile);
                    }
                    tracing::warn!("Remote detection returned an empty code, using heuristic");
                }
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "Remote detection failed, using heuristic");
                }
                Err(_) => {
                    tracing::warn!(
                        timeout_ms = self.timeout.as_millis(),
                        "Remote detection timed out, using heuristic"
                    );
                }
            }
        }

        self.detect_local(text)
    }

    /// Local tier only. Pure: identical input gives an identical profile.
    #[must_use]
    pub fn detect_local(&self, text: &str) -> Option<LanguageProfile> {
        let language = detect_language(text, self.prefix_chars)?;
        tracing::debug!(code = language.locale(), "Language detected heuristically");
        Some(LanguageProfile::for_language(language, Confidence::Heuristic))
    }
}

fn profile_from_remote(detected: DetectedLanguage) -> Option<LanguageProfile> {
    let code = detected.code.trim();
    if code.is_empty() {
        return None;
    }

    let mut profile = Language::from_code(code).map_or_else(
        || LanguageProfile {
            code: code.to_string(),
            recognition_locale: code.to_string(),
            synthesis_voice: String::new(),
            confidence: Confidence::Certain,
        },
        |lang| LanguageProfile::for_language(lang, Confidence::Certain),
    );

    let voice = detected.voice.trim();
    if !voice.is_empty() {
        profile.synthesis_voice = voice.to_string();
    }
    if profile.synthesis_voice.is_empty() {
        return None;
    }
    Some(profile)
}
