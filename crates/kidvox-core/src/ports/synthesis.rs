//! Speech synthesis provider port.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::ProviderError;
use crate::language::Prosody;

/// Encoded audio formats the providers can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum AudioFormat {
    /// RIFF WAV, 16 kHz, 16-bit mono PCM.
    #[default]
    Wav16k,
    /// RIFF WAV, 24 kHz, 16-bit mono PCM.
    Wav24k,
    /// MP3, 24 kHz, 48 kbit/s mono.
    Mp3,
}

impl AudioFormat {
    /// Value of the provider's output-format request header.
    #[must_use]
    pub const fn provider_name(self) -> &'static str {
        match self {
            Self::Wav16k => "riff-16khz-16bit-mono-pcm",
            Self::Wav24k => "riff-24khz-16bit-mono-pcm",
            Self::Mp3 => "audio-24khz-48kbitrate-mono-mp3",
        }
    }

    /// File extension for saved audio.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Wav16k | Self::Wav24k => "wav",
            Self::Mp3 => "mp3",
        }
    }
}

/// One fragment to synthesise.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    /// Normalised plain text (providers escape it for their own markup).
    pub text: String,
    /// Locale of the text, e.g. `"uz-UZ"`.
    pub locale: String,
    /// Provider voice name.
    pub voice: String,
    /// Fixed per-locale rate and pitch.
    pub prosody: Prosody,
    /// Requested output encoding.
    pub output_format: AudioFormat,
}

/// Playable audio produced for one fragment.
#[derive(Debug, Clone)]
pub struct SynthesizedAudio {
    /// Encoded audio bytes.
    pub bytes: Vec<u8>,
    /// Encoding of `bytes`.
    pub format: AudioFormat,
}

/// Backend-agnostic text-to-speech provider.
#[async_trait]
pub trait SynthesisProvider: Send + Sync {
    /// Short provider name for logs.
    fn name(&self) -> &str;

    /// Synthesise one fragment into encoded audio.
    async fn synthesize(
        &self,
        request: &SynthesisRequest,
    ) -> Result<SynthesizedAudio, ProviderError>;
}
