//! Speech playback and recognition orchestrator for kidvox.
//!
//! Speaks scripted fragments strictly in order, interleaves one recognition
//! session at the point the script asks a question, picks voice and locale
//! from the detected language of the script, and stops every sound and the
//! microphone at once when the host goes away.
//!
//! Hosts assemble a [`SpeechSession`] with a [`SessionBuilder`], drive it
//! through its caller API and render from its [`SessionEvent`] stream. A
//! [`PlaybackLifecycleGuard`] ties the session to page/navigation signals.
//!
//! Local speaker and microphone support (`rodio` + `cpal`) is behind the
//! `local-audio` feature; WAV-file sinks and sources are always available.
//!
//! [`SessionEvent`]: kidvox_core::SessionEvent

pub mod audio_file;
pub mod audio_io;
pub mod backend;
pub mod detector;
pub mod emitter;
pub mod endpoint;
pub mod error;
pub mod gate;
pub mod generation;
pub mod lifecycle;
pub mod recognition;
pub mod scheduler;
pub mod session;
pub mod state_machine;
pub mod synthesis;
pub mod text_utils;

#[cfg(feature = "local-audio")]
pub mod audio_local;
#[cfg(feature = "local-audio")]
mod audio_thread;
#[cfg(feature = "local-audio")]
pub mod capture;
#[cfg(feature = "local-audio")]
pub mod playback;

// Re-export key types for convenience
pub use audio_file::{WavFileSink, WavFileSource};
pub use audio_io::{AudioSink, AudioSource};
pub use detector::LanguageDetector;
pub use emitter::ChannelEmitter;
pub use error::VoiceError;
pub use gate::{DeviceGate, DeviceOwner};
pub use generation::{GenerationCounter, GenerationTicket};
pub use lifecycle::{
    LifecycleSignal, LifecycleSignals, LifecycleSubscription, PlaybackLifecycleGuard, Stoppable,
};
pub use recognition::SpeechRecognitionController;
pub use scheduler::{AudioQueueScheduler, QueueItem};
pub use session::{
    AnswerContext, AnswerEvaluator, Evaluation, FnEvaluator, ScriptSource, SessionBuilder,
    SilentEvaluator, SpeechSession, StaticScript,
};
pub use state_machine::{SessionStateMachine, SessionTrigger, TransitionError};
pub use synthesis::{PlaybackSession, SpeechSynthesisAdapter};

#[cfg(feature = "local-audio")]
pub use audio_local::{LocalMicrophone, LocalSpeaker, open_local_audio};
