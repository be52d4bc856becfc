//! Core domain types and port definitions for kidvox.
//!
//! This crate holds the transport-agnostic vocabulary shared by the speech
//! orchestrator (`kidvox-voice`) and its hosts (`kidvox-cli`, embedding
//! screens): language profiles, session states, transcripts, events, the
//! provider ports, and settings. It performs no I/O.

pub mod events;
pub mod language;
pub mod ports;
pub mod session;
pub mod settings;

// Re-export commonly used types for convenience
pub use events::{SessionEvent, UserNotice};
pub use language::{Confidence, Language, LanguageProfile, Prosody};
pub use ports::{
    AudioFormat, DetectedLanguage, LanguageDetectionService, NoopEmitter, ProviderError,
    RecognitionProvider, RecognitionRequest, RecognitionResult, SessionEventEmitter,
    SynthesisProvider, SynthesisRequest, SynthesizedAudio,
};
pub use session::{SessionState, Transcript};
pub use settings::{
    DEFAULT_DETECTION_PREFIX_CHARS, DEFAULT_DETECTION_TIMEOUT_MS, DEFAULT_GUARD_DELAY_MS,
    DEFAULT_MAX_ATTEMPTS, RecognitionSettings, Settings, SettingsError, validate_settings,
};
