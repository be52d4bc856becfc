//! Events emitted by a speech session to its hosting screen.
//!
//! Hosts receive these on the channel returned when the session is built and
//! render from them; they never touch playback or recognition handles.

use serde::{Deserialize, Serialize};

use crate::session::{SessionState, Transcript};

/// A user-facing condition the host should display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UserNotice {
    /// Nothing was heard; the child can simply try again.
    NoSpeech,
    /// Microphone or audio output is blocked by the host.
    PermissionDenied,
    /// The script's language could not be determined or is not supported.
    UnsupportedLanguage,
    /// Speech services are unreachable even after retrying.
    ServiceUnavailable,
}

impl UserNotice {
    /// Default English message for hosts without their own copy.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::NoSpeech => "I didn't hear anything. Try again!",
            Self::PermissionDenied => {
                "Please allow microphone and sound access in your browser settings."
            }
            Self::UnsupportedLanguage => "Sorry, this text is in a language I can't read yet.",
            Self::ServiceUnavailable => "Speech is not available right now. Please try later.",
        }
    }
}

/// Events emitted by a speech session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Session state changed.
    StateChanged(SessionState),

    /// A script or response fragment started playing.
    FragmentStarted {
        /// Position in the current script (responses continue the count).
        index: usize,
        /// The fragment text.
        text: String,
    },

    /// A fragment finished playing (or failed and was skipped).
    FragmentFinished {
        /// Position in the current script.
        index: usize,
    },

    /// A transcript (partial or final) was produced.
    Transcript(Transcript),

    /// A user-facing condition occurred.
    Notice(UserNotice),

    /// All audio and microphone activity was stopped.
    HardStopped {
        /// Generation that became current after the stop.
        generation: u64,
    },
}
