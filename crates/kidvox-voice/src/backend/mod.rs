//! Provider adapters: concrete implementations of the core speech ports.
//!
//! The orchestrator works on `Arc<dyn SynthesisProvider>`,
//! `Arc<dyn RecognitionProvider>` and `Arc<dyn LanguageDetectionService>`
//! (see `kidvox_core::ports`), so engines can be swapped without touching
//! the session logic.
//!
//! | Module              | Port                        | Transport        |
//! |---------------------|-----------------------------|------------------|
//! | [`cloud_tts`]       | `SynthesisProvider`         | HTTPS + SSML     |
//! | [`cloud_stt`]       | `RecognitionProvider`       | HTTPS + WAV      |
//! | [`remote_detect`]   | `LanguageDetectionService`  | HTTPS + JSON     |
//! | [`espeak`]          | `SynthesisProvider`         | `espeak-ng` child process |
//!
//! The cloud adapters share one bearer token per subscription key, issued
//! by [`token::SpeechTokenIssuer`].

pub mod cloud_stt;
pub mod cloud_tts;
pub mod espeak;
mod http;
pub mod remote_detect;
pub mod token;

pub use cloud_stt::CloudRecognitionProvider;
pub use cloud_tts::CloudSynthesisProvider;
pub use espeak::EspeakSynthesisProvider;
pub use remote_detect::RemoteLanguageDetector;
pub use token::{SpeechTokenIssuer, TokenCache};
