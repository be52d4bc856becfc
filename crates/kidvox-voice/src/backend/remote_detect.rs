//! Remote language-detection client.
//!
//! Posts `{ "text": ... }` and expects `{ "code": "uz-UZ", "voice": ... }`.
//! The detector bounds the call with its own timeout; this client only
//! caps the connection.

use std::time::Duration;

use async_trait::async_trait;
use kidvox_core::{
    DEFAULT_DETECTION_PREFIX_CHARS, DetectedLanguage, LanguageDetectionService, ProviderError,
    Settings,
};
use reqwest::Client;
use serde::Serialize;

use super::http;

/// HTTP client for the detection endpoint.
#[derive(Debug, Clone)]
pub struct RemoteLanguageDetector {
    client: Client,
    endpoint: String,
    prefix_chars: usize,
}

#[derive(Serialize)]
struct DetectRequest<'a> {
    text: &'a str,
}

impl RemoteLanguageDetector {
    /// Client for `endpoint`.
    pub fn new(endpoint: impl Into<String>) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http::build_client(Duration::from_secs(10))?,
            endpoint: endpoint.into(),
            prefix_chars: DEFAULT_DETECTION_PREFIX_CHARS,
        })
    }

    /// Client for the endpoint in `settings`, or `None` when unset.
    pub fn from_settings(settings: &Settings) -> Result<Option<Self>, ProviderError> {
        settings
            .detection_endpoint
            .as_ref()
            .map(|endpoint| {
                Self::new(endpoint.clone())
                    .map(|d| d.with_prefix_chars(settings.effective_detection_prefix_chars()))
            })
            .transpose()
    }

    /// Send at most `prefix_chars` characters.
    #[must_use]
    pub const fn with_prefix_chars(mut self, prefix_chars: usize) -> Self {
        self.prefix_chars = prefix_chars;
        self
    }
}

/// Leading `max_chars` characters of `text`, cut on a char boundary.
fn prefix(text: &str, max_chars: usize) -> &str {
    text.char_indices()
        .nth(max_chars)
        .map_or(text, |(end, _)| &text[..end])
}

fn validate(detected: DetectedLanguage) -> Result<DetectedLanguage, ProviderError> {
    if detected.code.trim().is_empty() {
        return Err(ProviderError::InvalidResponse(
            "detection response has no language code".to_string(),
        ));
    }
    Ok(detected)
}

#[async_trait]
impl LanguageDetectionService for RemoteLanguageDetector {
    async fn detect(&self, text: &str) -> Result<DetectedLanguage, ProviderError> {
        let body = DetectRequest {
            text: prefix(text, self.prefix_chars),
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| http::send_error(&e))?;
        let response = http::check_status(response).await?;
        let detected: DetectedLanguage = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse detection: {e}")))?;
        tracing::debug!(code = %detected.code, voice = %detected.voice, "Remote detection answered");
        validate(detected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_respects_char_boundaries() {
        assert_eq!(prefix("Ўзбекча", 3), "Ўзб");
        assert_eq!(prefix("abc", 10), "abc");
        assert_eq!(prefix("", 5), "");
    }

    #[test]
    fn empty_code_is_rejected() {
        let detected = DetectedLanguage {
            code: " ".into(),
            voice: "x".into(),
        };
        assert!(matches!(validate(detected), Err(ProviderError::InvalidResponse(_))));
    }

    #[test]
    fn response_body_deserialises() {
        let detected: DetectedLanguage =
            serde_json::from_str(r#"{"code":"uz-UZ","voice":"uz-UZ-MadinaNeural"}"#).unwrap();
        assert_eq!(validate(detected.clone()).unwrap(), detected);
    }

    #[test]
    fn from_settings_is_none_without_endpoint() {
        assert!(RemoteLanguageDetector::from_settings(&Settings::with_defaults())
            .unwrap()
            .is_none());

        let settings = Settings {
            detection_endpoint: Some("https://detect.example.test/v1".into()),
            detection_prefix_chars: Some(200),
            ..Settings::with_defaults()
        };
        let detector = RemoteLanguageDetector::from_settings(&settings).unwrap().unwrap();
        assert_eq!(detector.prefix_chars, 200);
    }
}
