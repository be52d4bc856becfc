//! Remote language-detection port.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::ProviderError;

/// Wire shape returned by the detection endpoint: `{ "code", "voice" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedLanguage {
    /// Locale code, e.g. `"uz-UZ"`.
    pub code: String,
    /// Synthesis voice suggested by the service.
    pub voice: String,
}

/// Authoritative (tier 1) language detection.
#[async_trait]
pub trait LanguageDetectionService: Send + Sync {
    /// Detect the language of `text`.
    async fn detect(&self, text: &str) -> Result<DetectedLanguage, ProviderError>;
}
