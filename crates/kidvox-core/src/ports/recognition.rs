//! Speech recognition provider port.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::ProviderError;

/// One captured utterance to recognise.
#[derive(Debug, Clone)]
pub struct RecognitionRequest {
    /// Recognition locale, e.g. `"uz-UZ"`.
    pub locale: String,
    /// Mono f32 PCM samples in `[-1.0, 1.0]`.
    pub samples: Vec<f32>,
    /// Sample rate of `samples` in Hz.
    pub sample_rate: u32,
}

/// Best hypothesis for an utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionResult {
    /// Recognised text.
    pub text: String,
    /// Provider confidence in `[0.0, 1.0]`.
    pub confidence: f32,
}

/// Backend-agnostic speech-to-text provider.
///
/// Implementations must be `Send + Sync` so the controller can share them
/// across the interim-result task and the caller.
#[async_trait]
pub trait RecognitionProvider: Send + Sync {
    /// Short provider name for logs.
    fn name(&self) -> &str;

    /// Recognise a captured utterance.
    ///
    /// Returns [`ProviderError::NoSpeech`] when the audio holds no speech.
    async fn recognize(
        &self,
        request: &RecognitionRequest,
    ) -> Result<RecognitionResult, ProviderError>;
}
