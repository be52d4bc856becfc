//! Cloud short-utterance recognition over REST.
//!
//! The captured samples are uploaded as 16-bit PCM WAV; the service answers
//! with a recognition status and, on success, a ranked list of hypotheses.

use async_trait::async_trait;
use kidvox_core::{
    ProviderError, RecognitionProvider, RecognitionRequest, RecognitionResult, Settings,
};
use reqwest::Client;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use url::Url;

use super::http;
use super::token::SpeechTokenIssuer;
use crate::audio_file::encode_wav;

/// REST recognition provider.
#[derive(Debug, Clone)]
pub struct CloudRecognitionProvider {
    client: Client,
    endpoint: Url,
    tokens: SpeechTokenIssuer,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RecognitionResponse {
    recognition_status: String,
    #[serde(default)]
    display_text: Option<String>,
    #[serde(default, rename = "NBest")]
    n_best: Vec<Hypothesis>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Hypothesis {
    #[serde(default)]
    confidence: f32,
    #[serde(default)]
    display: String,
}

impl CloudRecognitionProvider {
    /// Provider posting to `endpoint` with tokens from `tokens`.
    pub fn new(endpoint: &str, tokens: SpeechTokenIssuer) -> Result<Self, ProviderError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| ProviderError::Unavailable(format!("Invalid recognition endpoint: {e}")))?;
        Ok(Self {
            client: http::build_client(http::DEFAULT_TIMEOUT)?,
            endpoint,
            tokens,
        })
    }

    /// Provider for the region configured in `settings`.
    pub fn from_settings(settings: &Settings, tokens: SpeechTokenIssuer) -> Result<Self, ProviderError> {
        let endpoint = settings.recognition_endpoint().ok_or_else(|| {
            ProviderError::Unavailable("speech region not configured".to_string())
        })?;
        Self::new(&endpoint, tokens)
    }

    fn request_url(&self, locale: &str) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("language", locale)
            .append_pair("format", "detailed");
        url
    }
}

/// Interpret a recognition response body.
fn parse_recognition(body: &str) -> Result<RecognitionResult, ProviderError> {
    let response: RecognitionResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse recognition: {e}")))?;

    match response.recognition_status.as_str() {
        "Success" => {
            let best = response
                .n_best
                .into_iter()
                .max_by(|a, b| a.confidence.total_cmp(&b.confidence));
            let (text, confidence) = match best {
                Some(h) if !h.display.trim().is_empty() => (h.display, h.confidence),
                _ => (response.display_text.unwrap_or_default(), 1.0),
            };
            if text.trim().is_empty() {
                return Err(ProviderError::NoSpeech);
            }
            Ok(RecognitionResult {
                text: text.trim().to_string(),
                confidence,
            })
        }
        "NoMatch" | "InitialSilenceTimeout" | "BabbleTimeout" => Err(ProviderError::NoSpeech),
        "Error" => Err(ProviderError::Unavailable(
            "recognition service reported an error".to_string(),
        )),
        other => Err(ProviderError::InvalidResponse(format!(
            "unknown recognition status {other}"
        ))),
    }
}

#[async_trait]
impl RecognitionProvider for CloudRecognitionProvider {
    fn name(&self) -> &str {
        "cloud-stt"
    }

    async fn recognize(&self, request: &RecognitionRequest) -> Result<RecognitionResult, ProviderError> {
        if request.samples.is_empty() {
            return Err(ProviderError::NoSpeech);
        }
        let wav = encode_wav(&request.samples, request.sample_rate)
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        let token = self.tokens.bearer().await?;

        tracing::debug!(
            locale = %request.locale,
            samples = request.samples.len(),
            bytes = wav.len(),
            "Uploading utterance for recognition"
        );

        let response = self
            .client
            .post(self.request_url(&request.locale))
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .header(
                CONTENT_TYPE,
                format!("audio/wav; codecs=audio/pcm; samplerate={}", request.sample_rate),
            )
            .header(ACCEPT, "application/json")
            .body(wav)
            .send()
            .await
            .map_err(|e| http::send_error(&e))?;

        let response = match http::check_status(response).await {
            Ok(response) => response,
            Err(e @ ProviderError::Unauthorized(_)) => {
                self.tokens.invalidate().await;
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let body = response
            .text()
            .await
            .map_err(|e| http::send_error(&e))?;
        parse_recognition(&body)
    }
}
