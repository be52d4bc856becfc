//! Cloud neural synthesis over REST.
//!
//! Each fragment is sent as SSML carrying the profile's voice and the
//! locale's prosody; the response body is the encoded clip.

use async_trait::async_trait;
use kidvox_core::{ProviderError, Settings, SynthesisProvider, SynthesisRequest, SynthesizedAudio};
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};

use super::http;
use super::token::SpeechTokenIssuer;
use crate::text_utils::build_ssml;

/// REST synthesis provider.
#[derive(Debug, Clone)]
pub struct CloudSynthesisProvider {
    client: Client,
    endpoint: String,
    tokens: SpeechTokenIssuer,
}

impl CloudSynthesisProvider {
    /// Provider posting to `endpoint` with tokens from `tokens`.
    pub fn new(endpoint: impl Into<String>, tokens: SpeechTokenIssuer) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http::build_client(http::DEFAULT_TIMEOUT)?,
            endpoint: endpoint.into(),
            tokens,
        })
    }

    /// Provider for the region configured in `settings`.
    pub fn from_settings(settings: &Settings, tokens: SpeechTokenIssuer) -> Result<Self, ProviderError> {
        let endpoint = settings.synthesis_endpoint().ok_or_else(|| {
            ProviderError::Unavailable("speech region not configured".to_string())
        })?;
        Self::new(endpoint, tokens)
    }
}

/// SSML document for `request`.
fn request_ssml(request: &SynthesisRequest) -> String {
    build_ssml(&request.text, &request.locale, &request.voice, request.prosody)
}

#[async_trait]
impl SynthesisProvider for CloudSynthesisProvider {
    fn name(&self) -> &str {
        "cloud-tts"
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<SynthesizedAudio, ProviderError> {
        let token = self.tokens.bearer().await?;
        let ssml = request_ssml(request);

        tracing::debug!(
            voice = %request.voice,
            chars = request.text.chars().count(),
            format = request.output_format.provider_name(),
            "Requesting cloud synthesis"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .header(CONTENT_TYPE, "application/ssml+xml")
            .header("X-Microsoft-OutputFormat", request.output_format.provider_name())
            .body(ssml)
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

        let bytes = response
            .bytes()
            .await
            .map_err(|e| http::send_error(&e))?;
        if bytes.is_empty() {
            return Err(ProviderError::InvalidResponse("empty audio body".to_string()));
        }

        Ok(SynthesizedAudio {
            bytes: bytes.to_vec(),
            format: request.output_format,
        })
    }
}
