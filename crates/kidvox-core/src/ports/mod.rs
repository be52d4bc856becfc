//! Port definitions: trait abstractions for the external speech services.
//!
//! # Design Rules
//!
//! - Ports carry plain data (no reqwest, audio device or process types).
//! - Concrete providers live in `kidvox-voice::backend`; the orchestrator
//!   only ever holds `Arc<dyn …>` trait objects so providers can be swapped
//!   or faked in tests.
//! - Every port reports failures as [`ProviderError`], whose
//!   [`is_transient`](ProviderError::is_transient) drives the retry-once
//!   policy in the adapters.

mod detection;
mod error;
mod event_emitter;
mod recognition;
mod synthesis;

pub use detection::{DetectedLanguage, LanguageDetectionService};
pub use error::ProviderError;
pub use event_emitter::{NoopEmitter, SessionEventEmitter};
pub use recognition::{RecognitionProvider, RecognitionRequest, RecognitionResult};
pub use synthesis::{AudioFormat, SynthesisProvider, SynthesisRequest, SynthesizedAudio};
