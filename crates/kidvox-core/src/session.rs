//! Session state and transcript types observed by hosting screens.

use serde::{Deserialize, Serialize};

/// Current state of a speech session.
///
/// ```text
///   Initial → Reading → Asking → Listening → Analyzing → Asking … → Finished
///               │  ▲
///               ▼  │
///              Paused
/// ```
///
/// Any state returns to `Initial` on a hard-stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    /// Nothing is playing or listening; no script is running.
    #[default]
    Initial,

    /// The script is being spoken fragment by fragment.
    Reading,

    /// Reading is suspended; the current fragment replays on resume.
    Paused,

    /// The script has been spoken; waiting for the child's answer.
    Asking,

    /// The microphone is open and capturing an answer.
    Listening,

    /// An answer was submitted; the response is being produced and spoken.
    Analyzing,

    /// The attempt limit was reached or the evaluator ended the session.
    Finished,
}

impl SessionState {
    /// Stable lowercase label for logs and wire payloads.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Reading => "reading",
            Self::Paused => "paused",
            Self::Asking => "asking",
            Self::Listening => "listening",
            Self::Analyzing => "analyzing",
            Self::Finished => "finished",
        }
    }

    /// States in which playback may proceed.
    #[must_use]
    pub const fn allows_playback(self) -> bool {
        matches!(self, Self::Reading | Self::Analyzing)
    }

    /// States in which recognition may start.
    #[must_use]
    pub const fn allows_recognition(self) -> bool {
        matches!(self, Self::Asking | Self::Listening)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Text recognised from the child's speech.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transcript {
    /// The recognised text.
    pub text: String,
    /// Whether this is the final result or an interim partial.
    pub is_final: bool,
}

impl Transcript {
    /// A final transcript.
    #[must_use]
    pub fn final_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
        }
    }

    /// An interim (partial) transcript.
    #[must_use]
    pub fn partial(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_is_initial() {
        assert_eq!(SessionState::default(), SessionState::Initial);
    }

    #[test]
    fn playback_and_recognition_states_are_disjoint() {
        let all = [
            SessionState::Initial,
            SessionState::Reading,
            SessionState::Paused,
            SessionState::Asking,
            SessionState::Listening,
            SessionState::Analyzing,
            SessionState::Finished,
        ];
        for state in all {
            assert!(
                !(state.allows_playback() && state.allows_recognition()),
                "{state} allows both playback and recognition"
            );
        }
    }

    #[test]
    fn state_serialises_as_camel_case_label() {
        let json = serde_json::to_string(&SessionState::Analyzing).unwrap();
        assert_eq!(json, "\"analyzing\"");
        assert_eq!(SessionState::Analyzing.to_string(), "analyzing");
    }
}
