//! Orchestrator error types.

use kidvox_core::{ProviderError, UserNotice};

use crate::state_machine::TransitionError;

/// Errors that can occur while speaking, listening or driving a session.
#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    /// The script's language could not be determined or is not supported.
    #[error("Unsupported or undetermined language")]
    UnsupportedLanguage,

    /// Microphone or audio output access was denied.
    #[error("Audio device permission denied: {0}")]
    PermissionDenied(String),

    /// Recognition finished without hearing any speech.
    #[error("No speech detected")]
    NoSpeech,

    /// A caller tried to use a device that is already owned (e.g. start
    /// recognition during playback, or a second recognition session).
    #[error("Resource conflict: {0}")]
    ResourceConflict(String),

    /// No script has been built for the session.
    #[error("No script built, call build_script first")]
    NoScript,

    /// A requested session transition is not allowed in the current state.
    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    /// A speech provider failed after retry and fallback.
    #[error("Speech provider failed: {0}")]
    Provider(#[from] ProviderError),

    /// Every synthesis engine failed for a fragment.
    #[error("Speech synthesis failed: {0}")]
    SynthesisFailed(String),

    /// No audio input device found.
    #[error("No audio input device found")]
    NoInputDevice,

    /// Failed to open or drive the audio input stream.
    #[error("Audio input error: {0}")]
    InputStreamError(String),

    /// Failed to open or drive the audio output stream.
    #[error("Audio output error: {0}")]
    OutputStreamError(String),

    /// Captured audio could not be resampled.
    #[error("Resampling error: {0}")]
    ResampleError(String),

    /// The dedicated audio I/O thread exited unexpectedly.
    #[error("Audio thread died unexpectedly")]
    AudioThreadDied,

    /// Synthesised audio could not be decoded or encoded.
    #[error("Audio codec error: {0}")]
    Codec(String),

    /// IO error (audio files, fallback engine process).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The session could not be assembled from the given parts.
    #[error("Invalid session configuration: {0}")]
    Configuration(String),

    /// The operation was superseded by a stop, pause or newer playback.
    #[error("Voice operation cancelled")]
    Cancelled,
}

impl VoiceError {
    /// Whether the child can simply try again without the session ending.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::NoSpeech => true,
            Self::Provider(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Whether the error ends the session (device access lost).
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::PermissionDenied(_)
                | Self::NoInputDevice
                | Self::InputStreamError(_)
                | Self::AudioThreadDied
        )
    }

    /// The user-facing notice a host should display, if any.
    #[must_use]
    pub const fn notice(&self) -> Option<UserNotice> {
        match self {
            Self::NoSpeech => Some(UserNotice::NoSpeech),
            Self::PermissionDenied(_) | Self::NoInputDevice | Self::InputStreamError(_) => {
                Some(UserNotice::PermissionDenied)
            }
            Self::UnsupportedLanguage => Some(UserNotice::UnsupportedLanguage),
            Self::Provider(_) | Self::SynthesisFailed(_) => Some(UserNotice::ServiceUnavailable),
            _ => None,
        }
    }

    /// Map a recognition provider failure into the orchestrator taxonomy.
    pub(crate) fn from_recognition(err: ProviderError) -> Self {
        match err {
            ProviderError::NoSpeech => Self::NoSpeech,
            ProviderError::PermissionDenied(msg) => Self::PermissionDenied(msg),
            other => Self::Provider(other),
        }
    }
}
